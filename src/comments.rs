use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError};
use crate::config::Endpoints;
use crate::control::{Dispatch, InFlight};
use crate::events::{Event, EventBus};
use crate::fragment;
use crate::toast::ToastKind;

/// Attribute carrying the identifier on a rendered comment's root element.
pub const COMMENT_ID_ATTR: &str = "data-comment-id";
/// Delete control, rendered only inside comments the viewer owns.
pub const DELETE_CONTROL_ATTR: &str = "data-comment-delete";

pub const EMPTY_COMMENT_MESSAGE: &str = "Comment cannot be empty.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub id: u64,
    pub html: String,
    pub text: String,
    pub owned_by_viewer: bool,
}

impl CommentNode {
    fn from_element(element: &fragment::Element) -> Option<Self> {
        let id = element.attr(COMMENT_ID_ATTR)?.trim().parse().ok()?;
        Some(Self {
            id,
            html: element.outer_html.clone(),
            text: element.text(),
            owned_by_viewer: fragment::first_with_attr(&element.inner_html, DELETE_CONTROL_ATTR)
                .is_some(),
        })
    }
}

/// What the comment section currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentListView {
    /// Newest first; the client never re-orders.
    pub nodes: Vec<CommentNode>,
    pub count: usize,
    /// The "no comments yet" placeholder is on screen.
    pub placeholder: bool,
    pub draft: String,
}

impl CommentListView {
    pub fn new(nodes: Vec<CommentNode>, count: usize) -> Self {
        Self {
            placeholder: count == 0,
            nodes,
            count,
            draft: String::new(),
        }
    }

    fn prepend(&mut self, node: CommentNode) {
        self.nodes.insert(0, node);
        self.count += 1;
        self.placeholder = false;
        self.draft.clear();
    }

    fn remove(&mut self, id: u64) -> bool {
        let Some(pos) = self.nodes.iter().position(|node| node.id == id) else {
            return false;
        };
        self.nodes.remove(pos);
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.placeholder = true;
        }
        true
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    html: String,
    #[serde(default)]
    comment: Option<AddedComment>,
}

#[derive(Debug, Deserialize)]
struct AddedComment {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    count: usize,
    #[serde(default)]
    html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CommentControl {
    Add,
    Delete(u64),
    Refresh,
}

pub struct CommentStream {
    api: Arc<ApiClient>,
    events: Arc<EventBus>,
    endpoints: Endpoints,
    article_id: u64,
    view: RwLock<CommentListView>,
    in_flight: InFlight<CommentControl>,
}

impl CommentStream {
    pub fn new(
        api: Arc<ApiClient>,
        events: Arc<EventBus>,
        endpoints: Endpoints,
        article_id: u64,
        initial: CommentListView,
    ) -> Self {
        Self {
            api,
            events,
            endpoints,
            article_id,
            view: RwLock::new(initial),
            in_flight: InFlight::new(),
        }
    }

    /// Builds the initial view from the server-rendered comment markup.
    pub fn from_markup(
        api: Arc<ApiClient>,
        events: Arc<EventBus>,
        endpoints: Endpoints,
        article_id: u64,
        html: &str,
    ) -> Self {
        let nodes = parse_nodes(html);
        let count = nodes.len();
        Self::new(api, events, endpoints, article_id, CommentListView::new(nodes, count))
    }

    pub fn view(&self) -> CommentListView {
        self.view.read().clone()
    }

    pub fn set_draft<S: Into<String>>(&self, text: S) {
        self.view.write().draft = text.into();
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_active(&CommentControl::Add)
    }

    pub fn is_deleting(&self, comment_id: u64) -> bool {
        self.in_flight.is_active(&CommentControl::Delete(comment_id))
    }

    /// Submits the current draft.
    pub fn submit(&self) -> Result<Dispatch<CommentNode>, ApiError> {
        let draft = self.view.read().draft.clone();
        self.add(&draft)
    }

    pub fn add(&self, text: &str) -> Result<Dispatch<CommentNode>, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            self.api.toasts().publish(EMPTY_COMMENT_MESSAGE, ToastKind::Error);
            return Ok(Dispatch::Skipped);
        }
        let Some(_guard) = self.in_flight.try_begin(CommentControl::Add) else {
            return Ok(Dispatch::InFlight);
        };

        let body = json!({ "article_id": self.article_id, "text": text });
        let resp: AddResponse = self.api.post(&self.endpoints.comment_add, &body)?;
        let node = self.node_from_response(resp)?;

        let count = {
            let mut view = self.view.write();
            view.prepend(node.clone());
            view.count
        };
        self.publish_count(count);
        Ok(Dispatch::Applied(node))
    }

    /// Deletes a comment. Returns whether a node was on screen to remove.
    pub fn delete(&self, comment_id: u64) -> Result<Dispatch<bool>, ApiError> {
        let Some(_guard) = self.in_flight.try_begin(CommentControl::Delete(comment_id)) else {
            return Ok(Dispatch::InFlight);
        };
        let body = json!({ "comment_id": comment_id });
        let _: Value = self.api.post(&self.endpoints.comment_delete, &body)?;

        let (removed, count) = {
            let mut view = self.view.write();
            let removed = view.remove(comment_id);
            (removed, view.count)
        };
        if removed {
            self.publish_count(count);
        } else {
            tracing::debug!(comment_id, "deleted comment was not on screen");
        }
        Ok(Dispatch::Applied(removed))
    }

    /// Reloads the whole list from the server.
    pub fn refresh(&self) -> Result<Dispatch<usize>, ApiError> {
        let Some(_guard) = self.in_flight.try_begin(CommentControl::Refresh) else {
            return Ok(Dispatch::InFlight);
        };
        let resp: ListResponse = self.api.get(
            &self.endpoints.comment_list,
            &[("article_id", self.article_id.to_string())],
        )?;
        let nodes = parse_nodes(&resp.html);
        {
            let mut view = self.view.write();
            let draft = std::mem::take(&mut view.draft);
            *view = CommentListView::new(nodes, resp.count);
            view.draft = draft;
        }
        self.publish_count(resp.count);
        Ok(Dispatch::Applied(resp.count))
    }

    fn node_from_response(&self, resp: AddResponse) -> Result<CommentNode, ApiError> {
        let element = fragment::first_with_attr(&resp.html, COMMENT_ID_ATTR);
        let id = resp.comment.map(|comment| comment.id).or_else(|| {
            element
                .as_ref()
                .and_then(|el| el.attr(COMMENT_ID_ATTR)?.trim().parse().ok())
        });
        let Some(id) = id else {
            let err = ApiError::Decode("comment response without identifier".into());
            self.api.toasts().publish(err.toast_message(), ToastKind::Error);
            return Err(err);
        };
        let text = element
            .as_ref()
            .map(fragment::Element::text)
            .unwrap_or_else(|| fragment::plain_text(&resp.html));
        Ok(CommentNode {
            id,
            html: resp.html,
            text,
            owned_by_viewer: true,
        })
    }

    fn publish_count(&self, count: usize) {
        self.events.publish(Event::CommentsChanged {
            article_id: self.article_id,
            count,
        });
    }
}

pub fn parse_nodes(html: &str) -> Vec<CommentNode> {
    fragment::elements_with_attr(html, COMMENT_ID_ATTR)
        .iter()
        .filter_map(CommentNode::from_element)
        .collect()
}
