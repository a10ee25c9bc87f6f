use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};

use crate::api::{ApiClient, ApiError};
use crate::config::SearchConfig;
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub published_at: Option<DateTime<FixedOffset>>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok()))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchView {
    pub open: bool,
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub generation: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Scheduled { due: Instant },
    Closed,
}

struct Pending {
    text: String,
    due: Instant,
}

#[derive(Default)]
struct State {
    pending: Option<Pending>,
    generation: u64,
    view: SearchView,
}

/// Debounced search-as-you-type.
///
/// Only the last keystroke inside the debounce window is dispatched, and a
/// response is shown only if it belongs to the newest generation issued.
pub struct Autocomplete {
    api: Arc<ApiClient>,
    events: Arc<EventBus>,
    endpoint: String,
    config: SearchConfig,
    state: Mutex<State>,
}

impl Autocomplete {
    pub fn new(
        api: Arc<ApiClient>,
        events: Arc<EventBus>,
        endpoint: String,
        config: SearchConfig,
    ) -> Self {
        Self {
            api,
            events,
            endpoint,
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn view(&self) -> SearchView {
        self.state.lock().view.clone()
    }

    pub fn input(&self, text: &str, now: Instant) -> InputOutcome {
        let text = text.trim();
        let mut state = self.state.lock();
        if text.chars().count() < self.config.min_chars {
            state.pending = None;
            // Outstanding responses belong to a query the user abandoned.
            state.generation += 1;
            state.view = SearchView::default();
            return InputOutcome::Closed;
        }
        let due = now + self.config.debounce;
        state.pending = Some(Pending {
            text: text.to_string(),
            due,
        });
        InputOutcome::Scheduled { due }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.state.lock().pending.as_ref().map(|pending| pending.due)
    }

    /// Takes the pending query once its quiet period is over.
    pub fn poll(&self, now: Instant) -> Option<Query> {
        let mut state = self.state.lock();
        if state.pending.as_ref()?.due > now {
            return None;
        }
        let pending = state.pending.take()?;
        state.generation += 1;
        Some(Query {
            generation: state.generation,
            text: pending.text,
        })
    }

    pub fn fetch(&self, query: &Query) -> Result<Vec<SearchResult>, ApiError> {
        let resp: SearchResponse = self
            .api
            .get(&self.endpoint, &[("q", query.text.clone())])?;
        Ok(resp.results)
    }

    /// Applies a response. Returns false when it was stale and discarded.
    pub fn deliver(&self, query: &Query, result: Result<Vec<SearchResult>, ApiError>) -> bool {
        let mut state = self.state.lock();
        if query.generation != state.generation {
            tracing::debug!(
                generation = query.generation,
                latest = state.generation,
                "discarding stale search response"
            );
            return false;
        }
        let mut results = result.unwrap_or_default();
        results.truncate(self.config.max_results);
        state.view = SearchView {
            open: !results.is_empty(),
            query: query.text.clone(),
            results,
        };
        let shown = state.view.results.len();
        drop(state);
        self.events.publish(Event::SearchUpdated {
            generation: query.generation,
            results: shown,
        });
        true
    }

    /// Outside click. Drops the pending query and any response still in flight.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.pending = None;
        state.generation += 1;
        state.view.open = false;
    }
}

enum Command {
    Text(String),
    Close,
    Stop,
}

/// Owns the debounce timer thread for an [`Autocomplete`].
pub struct SearchHandle {
    tx: Sender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SearchHandle {
    pub fn spawn(autocomplete: Arc<Autocomplete>) -> Self {
        let (tx, rx) = unbounded();
        let thread = thread::spawn(move || loop {
            let received = match autocomplete.next_due() {
                Some(due) => rx.recv_timeout(due.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Command::Text(text)) => {
                    autocomplete.input(&text, Instant::now());
                }
                Ok(Command::Close) => autocomplete.close(),
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            if let Some(query) = autocomplete.poll(Instant::now()) {
                let worker = autocomplete.clone();
                thread::spawn(move || {
                    let result = worker.fetch(&query);
                    worker.deliver(&query, result);
                });
            }
        });
        Self {
            tx,
            thread: Some(thread),
        }
    }

    pub fn input<S: Into<String>>(&self, text: S) {
        let _ = self.tx.send(Command::Text(text.into()));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
