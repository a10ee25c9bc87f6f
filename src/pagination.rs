use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::api::{ApiClient, ApiError};
use crate::config::ListingConfig;
use crate::control::Dispatch;
use crate::events::{Event, EventBus};
use crate::fragment;

pub const LOAD_MORE_LABEL: &str = "Load more";
pub const LOADING_LABEL: &str = "Loading…";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub key: Option<String>,
    pub title: String,
    pub html: String,
}

impl Card {
    fn from_element(element: &fragment::Element, item_attr: &str) -> Self {
        let key = element
            .attr(item_attr)
            .or_else(|| element.attr("data-id"))
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        let title = element
            .attr("data-title")
            .map(str::to_string)
            .unwrap_or_else(|| element.text());
        Self {
            key,
            title,
            html: element.outer_html.clone(),
        }
    }
}

/// The "load more" control. It carries the continuation cursor itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMoreControl {
    Ready { next_url: String },
    Loading { next_url: String },
    /// Terminal: the listing has no further pages.
    Removed,
}

impl LoadMoreControl {
    fn from_cursor(next_url: Option<String>) -> Self {
        match next_url {
            Some(next_url) => LoadMoreControl::Ready { next_url },
            None => LoadMoreControl::Removed,
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            LoadMoreControl::Ready { .. } => Some(LOAD_MORE_LABEL),
            LoadMoreControl::Loading { .. } => Some(LOADING_LABEL),
            LoadMoreControl::Removed => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LoadMoreControl::Ready { .. })
    }

    pub fn next_url(&self) -> Option<&str> {
        match self {
            LoadMoreControl::Ready { next_url } | LoadMoreControl::Loading { next_url } => {
                Some(next_url)
            }
            LoadMoreControl::Removed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingView {
    pub cards: Vec<Card>,
    pub control: LoadMoreControl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub cards: Vec<Card>,
    pub next_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub next_url: Option<String>,
}

pub fn parse_page(html: &str, listing: &ListingConfig) -> Page {
    let cards = fragment::elements_with_attr(html, &listing.item_attr)
        .iter()
        .map(|element| Card::from_element(element, &listing.item_attr))
        .collect();
    let next_url = fragment::first_with_attr(html, &listing.next_attr).and_then(|element| {
        element
            .attr(&listing.next_attr)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| element.attr("href"))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    });
    Page { cards, next_url }
}

/// Appends "load more" pages to a listing, one page at a time.
pub struct PaginationMerger {
    api: Arc<ApiClient>,
    events: Arc<EventBus>,
    listing: ListingConfig,
    view: RwLock<ListingView>,
    consumed: Mutex<HashSet<String>>,
}

impl PaginationMerger {
    pub fn new(
        api: Arc<ApiClient>,
        events: Arc<EventBus>,
        listing: ListingConfig,
        cards: Vec<Card>,
        next_url: Option<String>,
    ) -> Self {
        Self {
            api,
            events,
            listing,
            view: RwLock::new(ListingView {
                cards,
                control: LoadMoreControl::from_cursor(next_url),
            }),
            consumed: Mutex::new(HashSet::new()),
        }
    }

    pub fn view(&self) -> ListingView {
        self.view.read().clone()
    }

    pub fn load_more(&self) -> Result<Dispatch<MergeReport>, ApiError> {
        let cursor = {
            let mut view = self.view.write();
            let cursor = match &view.control {
                LoadMoreControl::Ready { next_url } => next_url.clone(),
                LoadMoreControl::Loading { .. } => return Ok(Dispatch::InFlight),
                LoadMoreControl::Removed => return Ok(Dispatch::Skipped),
            };
            view.control = LoadMoreControl::Loading {
                next_url: cursor.clone(),
            };
            cursor
        };

        let html = match self.api.fetch_fragment(&cursor) {
            Ok(html) => html,
            Err(err) => {
                self.view.write().control = LoadMoreControl::Ready { next_url: cursor };
                return Err(err);
            }
        };

        let page = parse_page(&html, &self.listing);
        let next_url = {
            let mut consumed = self.consumed.lock();
            consumed.insert(self.cursor_key(&cursor));
            match page.next_url {
                Some(next) if consumed.contains(&self.cursor_key(&next)) => {
                    tracing::warn!(%cursor, %next, "next cursor points backwards; stopping");
                    None
                }
                other => other,
            }
        };
        if next_url.is_none() {
            tracing::info!(%cursor, "listing exhausted");
        }

        let added = page.cards.len();
        {
            let mut view = self.view.write();
            view.cards.extend(page.cards);
            view.control = LoadMoreControl::from_cursor(next_url.clone());
        }
        self.events.publish(Event::ListingMerged {
            added,
            exhausted: next_url.is_none(),
        });
        Ok(Dispatch::Applied(MergeReport { added, next_url }))
    }

    /// Replaces the listing, e.g. after the owner re-rendered it for a new filter.
    pub fn reset(&self, cards: Vec<Card>, next_url: Option<String>) {
        *self.view.write() = ListingView {
            cards,
            control: LoadMoreControl::from_cursor(next_url.clone()),
        };
        self.consumed.lock().clear();
        self.events.publish(Event::ListingReset { next_url });
    }

    fn cursor_key(&self, url: &str) -> String {
        self.api
            .resolve(url)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| url.to_string())
    }
}
