use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::ListItem;
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::comments::CommentListView;
use crate::engagement::{ArticleEngagement, Reaction, ReactionKind, SubscriptionView};
use crate::search::SearchView;
use crate::toast::{Toast, ToastKind};

pub const COLOR_BG: Color = Color::Rgb(30, 30, 46);
pub const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
pub const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
pub const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
pub const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
pub const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
pub const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
pub const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
pub const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
pub const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_DISABLED: Color = Color::Rgb(88, 91, 112);

pub const EMPTY_COMMENTS_TEXT: &str = "No comments yet. Be the first!";

/// Everything the engagement bar shows, including which controls are disabled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngagementBar {
    pub state: ArticleEngagement,
    pub reaction_busy: bool,
    pub favorite_busy: bool,
    pub rating_busy: bool,
    pub subscription: Option<(SubscriptionView, bool)>,
}

fn control_style(active: bool, busy: bool) -> Style {
    let style = Style::default().bg(COLOR_PANEL_BG);
    if busy {
        return style.fg(COLOR_DISABLED).add_modifier(Modifier::DIM);
    }
    if active {
        style.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
    } else {
        style.fg(COLOR_TEXT_SECONDARY)
    }
}

pub fn stars(value: Option<u8>) -> String {
    let filled = value.unwrap_or(0).min(5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub fn engagement_lines(bar: &EngagementBar) -> Vec<Line<'static>> {
    let state = &bar.state;
    let separator = Span::styled("  ", Style::default().bg(COLOR_PANEL_BG));
    let reaction_line = Line::from(vec![
        Span::styled(
            format!("▲ {}", state.likes),
            control_style(state.reaction.is(ReactionKind::Like), bar.reaction_busy),
        ),
        separator.clone(),
        Span::styled(
            format!("▼ {}", state.dislikes),
            control_style(state.reaction.is(ReactionKind::Dislike), bar.reaction_busy),
        ),
        separator.clone(),
        Span::styled(
            format!("{} {}", if state.favorited { "♥" } else { "♡" }, state.favorites),
            control_style(state.favorited, bar.favorite_busy),
        ),
    ]);

    let rating = &state.rating;
    let rating_line = Line::from(vec![
        Span::styled(
            stars(rating.user_value),
            control_style(rating.user_value.is_some(), bar.rating_busy),
        ),
        separator.clone(),
        Span::styled(
            format!("{:.2} ({} votes)", rating.average, rating.count),
            Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG),
        ),
    ]);

    let mut lines = vec![reaction_line, rating_line];
    if let Some((subscription, busy)) = &bar.subscription {
        lines.push(Line::from(Span::styled(
            format!("[{}]", subscription.label),
            control_style(subscription.subscribed, *busy),
        )));
    }
    lines
}

pub fn reaction_summary(reaction: Reaction) -> &'static str {
    match reaction {
        Reaction::None => "no reaction",
        Reaction::Like => "liked",
        Reaction::Dislike => "disliked",
    }
}

pub fn comment_items(
    view: &CommentListView,
    selected: Option<usize>,
    width: usize,
) -> Vec<ListItem<'static>> {
    if view.placeholder || view.nodes.is_empty() {
        let style = Style::default()
            .fg(COLOR_TEXT_SECONDARY)
            .bg(COLOR_PANEL_BG)
            .add_modifier(Modifier::ITALIC);
        return vec![ListItem::new(Line::from(Span::styled(EMPTY_COMMENTS_TEXT, style)))];
    }

    let width = width.max(8);
    view.nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            let background = if selected == Some(idx) {
                COLOR_PANEL_SELECTED_BG
            } else {
                COLOR_PANEL_BG
            };
            let meta_style = Style::default()
                .fg(if node.owned_by_viewer { COLOR_SUCCESS } else { COLOR_ACCENT })
                .bg(background)
                .add_modifier(Modifier::BOLD);
            let body_style = Style::default().fg(COLOR_TEXT_PRIMARY).bg(background);

            let owner = if node.owned_by_viewer { " · yours" } else { "" };
            let header = Span::styled(format!("#{}{owner}", node.id), meta_style);
            let mut lines = vec![Line::from(header)];
            for chunk in wrap(&node.text, WrapOptions::new(width)) {
                lines.push(Line::from(Span::styled(chunk.into_owned(), body_style)));
            }
            lines.push(Line::from(Span::styled(String::new(), body_style)));
            pad_lines_to_width(&mut lines, width as u16);
            ListItem::new(lines)
        })
        .collect()
}

pub fn toast_lines(toasts: &[Toast]) -> Vec<Line<'static>> {
    toasts
        .iter()
        .map(|toast| {
            let color = match toast.kind {
                ToastKind::Info => COLOR_ACCENT,
                ToastKind::Success => COLOR_SUCCESS,
                ToastKind::Error => COLOR_ERROR,
            };
            Line::from(Span::styled(
                format!(" {} ", toast.message),
                Style::default()
                    .fg(COLOR_BG)
                    .bg(color)
                    .add_modifier(Modifier::BOLD),
            ))
        })
        .collect()
}

pub fn search_lines(input: &str, view: &SearchView) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled("/ ", Style::default().fg(COLOR_ACCENT)),
        Span::styled(input.to_string(), Style::default().fg(COLOR_TEXT_PRIMARY)),
    ])];
    if !view.open {
        return lines;
    }
    for result in &view.results {
        let mut spans = vec![Span::styled(
            result.title.clone(),
            Style::default().fg(COLOR_TEXT_PRIMARY),
        )];
        if let Some(published) = result.published_at {
            spans.push(Span::styled(
                format!("  {}", published.format("%Y-%m-%d")),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        spans.push(Span::styled(
            format!("  {}", result.url),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        lines.push(Line::from(spans));
    }
    lines
}

pub fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let current_width: usize = line
            .spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum();
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        line.spans
            .push(Span::styled(" ".repeat(width - current_width), pad_style));
    }
}

pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::comments::CommentNode;
    use crate::engagement::RatingSummary;

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn engagement_bar_marks_active_reaction() {
        let bar = EngagementBar {
            state: ArticleEngagement {
                reaction: Reaction::Like,
                likes: 5,
                dislikes: 1,
                rating: RatingSummary {
                    average: 4.25,
                    count: 4,
                    user_value: Some(3),
                },
                ..ArticleEngagement::new(1)
            },
            ..EngagementBar::default()
        };
        let lines = engagement_lines(&bar);
        assert_eq!(text_of(&lines[0]), "▲ 5  ▼ 1  ♡ 0");
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert!(!lines[0].spans[2].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(text_of(&lines[1]), "★★★☆☆  4.25 (4 votes)");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn busy_controls_render_disabled() {
        let bar = EngagementBar {
            reaction_busy: true,
            subscription: Some((SubscriptionView::new(true), false)),
            ..EngagementBar::default()
        };
        let lines = engagement_lines(&bar);
        assert_eq!(lines[0].spans[0].style.fg, Some(COLOR_DISABLED));
        assert_eq!(text_of(&lines[2]), "[Subscribed]");
    }

    #[test]
    fn placeholder_replaces_empty_list() {
        let items = comment_items(&CommentListView::new(vec![], 0), None, 40);
        assert_eq!(items.len(), 1);

        let view = CommentListView::new(
            vec![CommentNode {
                id: 3,
                html: String::new(),
                text: "hello there".into(),
                owned_by_viewer: true,
            }],
            1,
        );
        assert_eq!(comment_items(&view, Some(0), 40).len(), 1);
    }

    #[test]
    fn toasts_render_in_order() {
        let now = Instant::now();
        let toasts = vec![
            Toast {
                id: 1,
                message: "first".into(),
                kind: ToastKind::Error,
                expires_at: now,
            },
            Toast {
                id: 2,
                message: "second".into(),
                kind: ToastKind::Success,
                expires_at: now,
            },
        ];
        let lines = toast_lines(&toasts);
        assert_eq!(text_of(&lines[0]), " first ");
        assert_eq!(lines[1].spans[0].style.bg, Some(COLOR_SUCCESS));
    }

    #[test]
    fn pad_lines_extends_to_width() {
        let mut lines = vec![Line::from(vec![Span::raw("abc")])];
        pad_lines_to_width(&mut lines, 6);
        assert_eq!(lines[0].spans.len(), 2);
        assert_eq!(lines[0].spans[1].content.as_ref(), "   ");
    }
}
