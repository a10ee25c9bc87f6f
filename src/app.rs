use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::api::{ApiClient, ApiError, ClientConfig, ReqwestTransport, TransportConfig};
use crate::comments::{CommentListView, CommentStream};
use crate::config::{self, Config};
use crate::control::Dispatch;
use crate::csrf::CookieCsrf;
use crate::engagement::{
    ArticleEngagement, Control, EngagementController, ReactionKind, SubscriptionTarget,
};
use crate::events::{Event, EventBus};
use crate::pagination::PaginationMerger;
use crate::search::{Autocomplete, SearchHandle};
use crate::toast::ToastQueue;
use crate::ui::{self, EngagementBar};

#[derive(Debug, Clone, Default)]
pub struct ArticleOptions {
    pub article_id: u64,
    pub category_id: Option<u64>,
    pub team_id: Option<u64>,
    /// The viewer's known subscription state for that category or team.
    pub subscribed: bool,
    pub anonymous: bool,
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct NewsOptions {
    pub url: String,
    pub pages: usize,
    pub config_file: Option<PathBuf>,
}

pub struct Services {
    pub config: Config,
    pub api: Arc<ApiClient>,
    pub toasts: Arc<ToastQueue>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = config::load(config::LoadOptions {
            config_file,
            env_prefix: None,
        })
        .context("load config")?;

        let transport = ReqwestTransport::new(TransportConfig {
            user_agent: config.api.user_agent.clone(),
            timeout: Some(config.api.timeout),
            cookie: Some(config.api.cookie.clone()),
            http_client: None,
        })
        .context("build http transport")?;
        let csrf = CookieCsrf::new(config.api.csrf_cookie.clone(), config.api.cookie.clone());
        let toasts = Arc::new(ToastQueue::new(config.toast.ttl));
        let api = ApiClient::new(
            Arc::new(transport),
            Arc::new(csrf),
            toasts.clone(),
            ClientConfig {
                base_url: config.api.base_url.clone(),
                login_url: Some(config.api.login_url.clone()),
                auth_redirect_delay: config.api.auth_redirect_delay,
            },
        )
        .context("build api client")?;

        Ok(Self {
            config,
            api: Arc::new(api),
            toasts,
            events: Arc::new(EventBus::new()),
        })
    }

    pub fn authenticated(&self) -> bool {
        !self.config.api.cookie.trim().is_empty()
    }
}

pub fn run_news(options: NewsOptions) -> Result<()> {
    let services = Services::load(options.config_file)?;
    let merger = PaginationMerger::new(
        services.api.clone(),
        services.events.clone(),
        services.config.listing.clone(),
        Vec::new(),
        Some(options.url),
    );

    for _ in 0..options.pages.max(1) {
        match merger.load_more() {
            Ok(Dispatch::Applied(report)) => {
                tracing::info!(added = report.added, next = ?report.next_url, "page merged");
            }
            Ok(_) => break,
            Err(err) => bail!("{}", err.toast_message()),
        }
    }

    let view = merger.view();
    for card in &view.cards {
        println!("{}", card.title);
    }
    match view.control.next_url() {
        Some(next) => println!("\nmore: {next}"),
        None => println!("\n({} stories, end of listing)", view.cards.len()),
    }
    Ok(())
}

pub fn run_article(options: ArticleOptions) -> Result<()> {
    let services = Services::load(options.config_file.clone())?;
    let mut app = App::new(services, &options);
    app.start();
    app.run()
}

enum Mode {
    Normal,
    Compose(String),
    Search(String),
}

struct App {
    engagement: Arc<EngagementController>,
    comments: Arc<CommentStream>,
    search: Arc<Autocomplete>,
    search_handle: SearchHandle,
    api: Arc<ApiClient>,
    toasts: Arc<ToastQueue>,
    events: Receiver<Event>,
    status_tx: Sender<String>,
    status_rx: Receiver<String>,
    subscription: Option<SubscriptionTarget>,
    authenticated: bool,
    mode: Mode,
    selected: usize,
    status_message: String,
}

impl App {
    fn new(services: Services, options: &ArticleOptions) -> Self {
        let authenticated = !options.anonymous && services.authenticated();
        let Services {
            config,
            api,
            toasts,
            events,
        } = services;
        let engagement = Arc::new(EngagementController::new(
            api.clone(),
            events.clone(),
            config.endpoints.clone(),
            ArticleEngagement::new(options.article_id),
        ));
        let comments = Arc::new(CommentStream::new(
            api.clone(),
            events.clone(),
            config.endpoints.clone(),
            options.article_id,
            CommentListView::new(Vec::new(), 0),
        ));
        let search = Arc::new(Autocomplete::new(
            api.clone(),
            events.clone(),
            config.endpoints.search.clone(),
            config.search.clone(),
        ));
        let search_handle = SearchHandle::spawn(search.clone());
        let subscription = options
            .category_id
            .map(SubscriptionTarget::Category)
            .or(options.team_id.map(SubscriptionTarget::Team));
        if let Some(target) = subscription {
            engagement.seed_subscription(target, options.subscribed);
        }
        let (status_tx, status_rx) = unbounded();

        Self {
            engagement,
            comments,
            search,
            search_handle,
            api,
            toasts,
            events: events.subscribe(),
            status_tx,
            status_rx,
            subscription,
            authenticated,
            mode: Mode::Normal,
            selected: 0,
            status_message: format!("Article #{}", options.article_id),
        }
    }

    fn start(&self) {
        let engagement = self.engagement.clone();
        let authenticated = self.authenticated;
        self.spawn(move || {
            describe(engagement.load_status(authenticated), |_| "Status loaded.".into())
        });
        let comments = self.comments.clone();
        self.spawn(move || describe(comments.refresh(), |count| format!("{count} comments.")));
    }

    fn spawn<F>(&self, action: F)
    where
        F: FnOnce() -> Option<String> + Send + 'static,
    {
        let tx = self.status_tx.clone();
        thread::spawn(move || {
            if let Some(message) = action() {
                let _ = tx.send(message);
            }
        });
    }

    fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(120);
        loop {
            self.drain_async();
            terminal.draw(|frame| self.draw(frame))?;

            if event::poll(tick_rate)? {
                if let TermEvent::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn drain_async(&mut self) {
        while let Ok(message) = self.status_rx.try_recv() {
            self.status_message = message;
        }
        while let Ok(event) = self.events.try_recv() {
            if let Event::CommentsChanged { count, .. } = event {
                self.selected = self.selected.min(count.saturating_sub(1));
            }
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match &mut self.mode {
            Mode::Compose(draft) => {
                match code {
                    KeyCode::Esc => self.mode = Mode::Normal,
                    KeyCode::Enter => {
                        self.comments.set_draft(draft.clone());
                        self.mode = Mode::Normal;
                        let comments = self.comments.clone();
                        self.spawn(move || {
                            describe(comments.submit(), |_| "Comment posted.".into())
                        });
                    }
                    KeyCode::Backspace => {
                        draft.pop();
                    }
                    KeyCode::Char(ch) => draft.push(ch),
                    _ => {}
                }
                false
            }
            Mode::Search(query) => {
                match code {
                    KeyCode::Esc => {
                        self.search_handle.close();
                        self.mode = Mode::Normal;
                    }
                    KeyCode::Enter => self.open_first_result(),
                    KeyCode::Backspace => {
                        query.pop();
                        self.search_handle.input(query.clone());
                    }
                    KeyCode::Char(ch) => {
                        query.push(ch);
                        self.search_handle.input(query.clone());
                    }
                    _ => {}
                }
                false
            }
            Mode::Normal => self.handle_normal_key(code),
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('l') => self.react(ReactionKind::Like),
            KeyCode::Char('d') => self.react(ReactionKind::Dislike),
            KeyCode::Char('f') => {
                let engagement = self.engagement.clone();
                self.spawn(move || {
                    describe(engagement.toggle_favorite(), |state| {
                        if state.favorited {
                            "Added to favorites.".into()
                        } else {
                            "Removed from favorites.".into()
                        }
                    })
                });
            }
            KeyCode::Char('s') => match self.subscription {
                Some(target) => {
                    let engagement = self.engagement.clone();
                    self.spawn(move || {
                        describe(engagement.toggle_subscription(target), |view| view.label)
                    });
                }
                None => self.status_message = "No category to subscribe to.".into(),
            },
            KeyCode::Char(ch @ '1'..='5') => {
                let value = ch as u8 - b'0';
                let engagement = self.engagement.clone();
                self.spawn(move || {
                    describe(engagement.rate(value), |state| match state.rating.user_value {
                        Some(value) => format!("Rated {value}/5."),
                        None => "Rating removed.".into(),
                    })
                });
            }
            KeyCode::Char('c') => self.mode = Mode::Compose(String::new()),
            KeyCode::Char('r') => {
                let comments = self.comments.clone();
                self.spawn(move || {
                    describe(comments.refresh(), |count| format!("{count} comments."))
                });
            }
            KeyCode::Char('x') => self.delete_selected(),
            KeyCode::Char('/') => self.mode = Mode::Search(String::new()),
            KeyCode::Char('j') | KeyCode::Down => {
                let len = self.comments.view().nodes.len();
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Esc => self.search_handle.close(),
            _ => {}
        }
        false
    }

    fn react(&self, kind: ReactionKind) {
        let engagement = self.engagement.clone();
        self.spawn(move || {
            describe(engagement.toggle_reaction(kind), |state| {
                format!("You {} this article.", ui::reaction_summary(state.reaction))
            })
        });
    }

    fn delete_selected(&mut self) {
        let view = self.comments.view();
        let Some(node) = view.nodes.get(self.selected) else {
            return;
        };
        if !node.owned_by_viewer {
            self.status_message = "You can only delete your own comments.".into();
            return;
        }
        let id = node.id;
        let comments = self.comments.clone();
        self.spawn(move || {
            describe(comments.delete(id), |removed| {
                if removed {
                    "Comment deleted.".into()
                } else {
                    "Comment was already gone.".into()
                }
            })
        });
    }

    fn open_first_result(&mut self) {
        let view = self.search.view();
        let Some(first) = view.results.first() else {
            return;
        };
        match self.api.resolve(&first.url) {
            Ok(url) => {
                if let Err(err) = webbrowser::open(url.as_str()) {
                    self.status_message = format!("Failed to open browser: {err}");
                }
            }
            Err(err) => self.status_message = err.toast_message(),
        }
        self.search_handle.close();
        self.mode = Mode::Normal;
    }

    fn engagement_bar(&self) -> EngagementBar {
        EngagementBar {
            state: self.engagement.state(),
            reaction_busy: self.engagement.is_busy(Control::Reaction),
            favorite_busy: self.engagement.is_busy(Control::Favorite),
            rating_busy: self.engagement.is_busy(Control::Rating),
            subscription: self.subscription.map(|target| {
                (
                    self.engagement.subscription(target),
                    self.engagement.is_busy(Control::Subscription(target)),
                )
            }),
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(ui::COLOR_BG)), full);

        let toasts = self.toasts.visible(Instant::now());
        let bar = self.engagement_bar();
        let bar_lines = ui::engagement_lines(&bar);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(bar_lines.len() as u16 + 2),
                Constraint::Min(3),
                Constraint::Length(toasts.len() as u16),
                Constraint::Length(1),
            ])
            .split(full);

        let status = Paragraph::new(self.status_message.clone()).style(
            Style::default()
                .fg(ui::COLOR_TEXT_PRIMARY)
                .bg(ui::COLOR_PANEL_SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status, layout[0]);

        let engagement = Paragraph::new(bar_lines).block(pane_block("Engagement", false));
        frame.render_widget(engagement, layout[1]);

        self.draw_comments(frame, layout[2]);

        frame.render_widget(Paragraph::new(ui::toast_lines(&toasts)), layout[3]);

        let help = "l like · d dislike · f favorite · s subscribe · 1-5 rate · \
                    c comment · x delete · / search · q quit";
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                help,
                Style::default().fg(ui::COLOR_TEXT_SECONDARY),
            ))),
            layout[4],
        );

        match &self.mode {
            Mode::Compose(draft) => {
                self.draw_popup(frame, "New comment", vec![Line::from(draft.clone())]);
            }
            Mode::Search(query) => {
                let lines = ui::search_lines(query, &self.search.view());
                self.draw_popup(frame, "Search", lines);
            }
            Mode::Normal => {}
        }
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, area: Rect) {
        let view = self.comments.view();
        let title = if self.comments.is_submitting() {
            format!("Comments ({}) · posting…", view.count)
        } else {
            format!("Comments ({})", view.count)
        };
        let block = pane_block(&title, true);
        let width = block.inner(area).width as usize;
        let items = ui::comment_items(&view, Some(self.selected), width);
        frame.render_widget(List::new(items).block(block), area);
    }

    fn draw_popup(&self, frame: &mut Frame<'_>, title: &str, lines: Vec<Line<'static>>) {
        let area = ui::centered_rect(70, 50, frame.size());
        frame.render_widget(Clear, area);
        let popup = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(pane_block(title, true));
        frame.render_widget(popup, area);
    }
}

fn pane_block(title: &str, focused: bool) -> Block<'static> {
    let border = if focused {
        ui::COLOR_BORDER_FOCUSED
    } else {
        ui::COLOR_BORDER_IDLE
    };
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(ui::COLOR_PANEL_BG))
}

/// Status-line text for a finished action. Failures were already toasted.
fn describe<T, F>(result: Result<Dispatch<T>, ApiError>, applied: F) -> Option<String>
where
    F: FnOnce(T) -> String,
{
    match result {
        Ok(Dispatch::Applied(value)) => Some(applied(value)),
        Ok(Dispatch::InFlight) => Some("Still waiting on the previous request…".into()),
        Ok(Dispatch::Skipped) => None,
        Err(_) => None,
    }
}
