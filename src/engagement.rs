use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiClient, ApiError};
use crate::config::Endpoints;
use crate::control::{Dispatch, InFlight, InFlightGuard};
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Dislike => "dislike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reaction {
    #[default]
    None,
    Like,
    Dislike,
}

impl Reaction {
    fn from_flags(liked: bool, disliked: bool) -> Self {
        match (liked, disliked) {
            (true, _) => Reaction::Like,
            (false, true) => Reaction::Dislike,
            (false, false) => Reaction::None,
        }
    }

    pub fn is(&self, kind: ReactionKind) -> bool {
        matches!(
            (self, kind),
            (Reaction::Like, ReactionKind::Like) | (Reaction::Dislike, ReactionKind::Dislike)
        )
    }
}

impl From<Option<ReactionKind>> for Reaction {
    fn from(kind: Option<ReactionKind>) -> Self {
        match kind {
            Some(ReactionKind::Like) => Reaction::Like,
            Some(ReactionKind::Dislike) => Reaction::Dislike,
            None => Reaction::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Added,
    Removed,
    Switched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingAction {
    Saved,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ReactionCounts {
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub dislikes: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReactionResponse {
    #[serde(default)]
    pub reaction: Option<ReactionKind>,
    #[serde(default)]
    pub action: Option<ReactionAction>,
    pub counts: ReactionCounts,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FavoriteResponse {
    pub favorited: bool,
    pub favorites_count: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionResponse {
    pub subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RatingStats {
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RatingResponse {
    #[serde(default)]
    pub action: Option<RatingAction>,
    #[serde(default)]
    pub user_rating: Option<i64>,
    pub rating: RatingStats,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub disliked: bool,
    #[serde(default)]
    pub favorited: bool,
    #[serde(default)]
    pub favorites_count: Option<u32>,
    pub counts: ReactionCounts,
    #[serde(default)]
    pub user_rating: Option<i64>,
    #[serde(default)]
    pub rating: RatingStats,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
    /// The viewer's own star value, always within 1..=5.
    pub user_value: Option<u8>,
}

impl RatingSummary {
    fn from_server(stats: &RatingStats, user_rating: Option<i64>) -> Self {
        Self {
            average: stats.average.filter(|avg| avg.is_finite() && *avg > 0.0).unwrap_or(0.0),
            count: stats.count,
            user_value: user_rating
                .filter(|value| (1..=5).contains(value))
                .map(|value| value as u8),
        }
    }
}

/// Engagement state of one article as the viewer sees it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArticleEngagement {
    pub article_id: u64,
    pub reaction: Reaction,
    pub likes: u32,
    pub dislikes: u32,
    pub favorited: bool,
    pub favorites: u32,
    pub rating: RatingSummary,
}

impl ArticleEngagement {
    pub fn new(article_id: u64) -> Self {
        Self {
            article_id,
            ..Self::default()
        }
    }

    pub fn with_reaction(&self, resp: &ReactionResponse) -> Self {
        Self {
            reaction: resp.reaction.into(),
            likes: resp.counts.likes,
            dislikes: resp.counts.dislikes,
            ..self.clone()
        }
    }

    pub fn with_favorite(&self, resp: &FavoriteResponse) -> Self {
        Self {
            favorited: resp.favorited,
            favorites: resp.favorites_count,
            ..self.clone()
        }
    }

    pub fn with_rating(&self, resp: &RatingResponse) -> Self {
        Self {
            rating: RatingSummary::from_server(&resp.rating, resp.user_rating),
            ..self.clone()
        }
    }

    pub fn with_status(&self, resp: &StatusResponse) -> Self {
        Self {
            article_id: self.article_id,
            reaction: Reaction::from_flags(resp.liked, resp.disliked),
            likes: resp.counts.likes,
            dislikes: resp.counts.dislikes,
            favorited: resp.favorited,
            favorites: resp.favorites_count.unwrap_or(self.favorites),
            rating: RatingSummary::from_server(&resp.rating, resp.user_rating),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubscriptionTarget {
    Category(u64),
    Team(u64),
}

impl SubscriptionTarget {
    pub fn id(&self) -> u64 {
        match self {
            SubscriptionTarget::Category(id) | SubscriptionTarget::Team(id) => *id,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            SubscriptionTarget::Category(id) => json!({ "category_id": id }),
            SubscriptionTarget::Team(id) => json!({ "team_id": id }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionView {
    pub subscribed: bool,
    pub label: String,
}

impl SubscriptionView {
    pub fn new(subscribed: bool) -> Self {
        Self {
            subscribed,
            label: subscription_label(subscribed).to_string(),
        }
    }
}

pub fn subscription_label(subscribed: bool) -> &'static str {
    if subscribed {
        "Subscribed"
    } else {
        "Subscribe"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Like and dislike share one control group.
    Reaction,
    Favorite,
    Rating,
    Subscription(SubscriptionTarget),
    Status,
}

impl Control {
    fn mutates_article(&self) -> bool {
        matches!(self, Control::Reaction | Control::Favorite | Control::Rating)
    }

    /// The status snapshot and the article mutations exclude each other.
    fn conflicts_with(&self, other: &Control) -> bool {
        match (self, other) {
            (Control::Status, other) => other.mutates_article(),
            (this, Control::Status) => this.mutates_article(),
            _ => false,
        }
    }
}

/// Owns the engagement state of one article and the viewer's subscriptions.
///
/// Nothing is mutated before the server answers; a failed call leaves the
/// state untouched.
pub struct EngagementController {
    api: Arc<ApiClient>,
    events: Arc<EventBus>,
    endpoints: Endpoints,
    state: RwLock<ArticleEngagement>,
    subscriptions: RwLock<HashMap<SubscriptionTarget, SubscriptionView>>,
    in_flight: InFlight<Control>,
}

impl EngagementController {
    pub fn new(
        api: Arc<ApiClient>,
        events: Arc<EventBus>,
        endpoints: Endpoints,
        initial: ArticleEngagement,
    ) -> Self {
        Self {
            api,
            events,
            endpoints,
            state: RwLock::new(initial),
            subscriptions: RwLock::new(HashMap::new()),
            in_flight: InFlight::new(),
        }
    }

    pub fn state(&self) -> ArticleEngagement {
        self.state.read().clone()
    }

    pub fn article_id(&self) -> u64 {
        self.state.read().article_id
    }

    pub fn is_busy(&self, control: Control) -> bool {
        self.in_flight.is_active(&control)
    }

    pub fn subscription(&self, target: SubscriptionTarget) -> SubscriptionView {
        self.subscriptions
            .read()
            .get(&target)
            .cloned()
            .unwrap_or_else(|| SubscriptionView::new(false))
    }

    /// Records a server-rendered subscription state.
    pub fn seed_subscription(&self, target: SubscriptionTarget, subscribed: bool) {
        self.subscriptions
            .write()
            .insert(target, SubscriptionView::new(subscribed));
    }

    pub fn load_status(
        &self,
        authenticated: bool,
    ) -> Result<Dispatch<ArticleEngagement>, ApiError> {
        if !authenticated {
            return Ok(Dispatch::Skipped);
        }
        let Some(_guard) = self.begin(Control::Status) else {
            return Ok(Dispatch::InFlight);
        };
        let article_id = self.article_id();
        let resp: StatusResponse = self.api.get(
            &self.endpoints.status,
            &[("article_id", article_id.to_string())],
        )?;
        Ok(Dispatch::Applied(self.commit(|state| state.with_status(&resp))))
    }

    pub fn toggle_reaction(
        &self,
        kind: ReactionKind,
    ) -> Result<Dispatch<ArticleEngagement>, ApiError> {
        let Some(_guard) = self.begin(Control::Reaction) else {
            return Ok(Dispatch::InFlight);
        };
        let body = json!({ "article_id": self.article_id(), "type": kind.as_str() });
        let resp: ReactionResponse = self.api.post(&self.endpoints.react, &body)?;
        tracing::debug!(kind = kind.as_str(), action = ?resp.action, "reaction applied");
        Ok(Dispatch::Applied(self.commit(|state| state.with_reaction(&resp))))
    }

    pub fn toggle_favorite(&self) -> Result<Dispatch<ArticleEngagement>, ApiError> {
        let Some(_guard) = self.begin(Control::Favorite) else {
            return Ok(Dispatch::InFlight);
        };
        let body = json!({ "article_id": self.article_id() });
        let resp: FavoriteResponse = self.api.post(&self.endpoints.favorite, &body)?;
        Ok(Dispatch::Applied(self.commit(|state| state.with_favorite(&resp))))
    }

    /// Posts a star value. Re-posting the current value lets the server
    /// clear the rating; the returned `user_rating` is applied as is.
    pub fn rate(&self, value: u8) -> Result<Dispatch<ArticleEngagement>, ApiError> {
        if !(1..=5).contains(&value) {
            return Ok(Dispatch::Skipped);
        }
        let Some(_guard) = self.begin(Control::Rating) else {
            return Ok(Dispatch::InFlight);
        };
        let body = json!({ "article_id": self.article_id(), "value": value });
        let resp: RatingResponse = self.api.post(&self.endpoints.rate, &body)?;
        tracing::debug!(value, action = ?resp.action, "rating applied");
        Ok(Dispatch::Applied(self.commit(|state| state.with_rating(&resp))))
    }

    pub fn toggle_subscription(
        &self,
        target: SubscriptionTarget,
    ) -> Result<Dispatch<SubscriptionView>, ApiError> {
        if target.id() == 0 {
            return Ok(Dispatch::Skipped);
        }
        let Some(_guard) = self.in_flight.try_begin(Control::Subscription(target)) else {
            return Ok(Dispatch::InFlight);
        };
        let resp: SubscriptionResponse = self.api.post(&self.endpoints.subscribe, &target.body())?;
        let view = SubscriptionView::new(resp.subscribed);
        self.subscriptions.write().insert(target, view.clone());
        self.events.publish(Event::SubscriptionChanged {
            target,
            subscribed: resp.subscribed,
        });
        Ok(Dispatch::Applied(view))
    }

    fn begin(&self, control: Control) -> Option<InFlightGuard<'_, Control>> {
        self.in_flight
            .try_begin_unless(control, |active| control.conflicts_with(active))
    }

    fn commit<F>(&self, transition: F) -> ArticleEngagement
    where
        F: FnOnce(&ArticleEngagement) -> ArticleEngagement,
    {
        let next = {
            let mut state = self.state.write();
            let updated = transition(&*state);
            *state = updated.clone();
            updated
        };
        self.events.publish(Event::EngagementChanged {
            article_id: next.article_id,
            state: next.clone(),
        });
        next
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::testing::{harness, GatedTransport, Harness, ScriptedTransport};

    fn controller(
        transport: ScriptedTransport,
        initial: ArticleEngagement,
    ) -> (EngagementController, Harness) {
        let h = harness(transport);
        let ctl = EngagementController::new(
            h.api.clone(),
            Arc::new(EventBus::new()),
            Endpoints::default(),
            initial,
        );
        (ctl, h)
    }

    fn article(likes: u32, dislikes: u32) -> ArticleEngagement {
        ArticleEngagement {
            likes,
            dislikes,
            ..ArticleEngagement::new(42)
        }
    }

    #[test]
    fn like_then_like_again_restores_counts() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {"reaction": "like", "action": "added", "counts": {"likes": 5, "dislikes": 1}}}),
        );
        transport.push_json(
            200,
            json!({"ok": true, "data": {"reaction": null, "action": "removed", "counts": {"likes": 4, "dislikes": 1}}}),
        );
        let (ctl, _h) = controller(transport.clone(), article(4, 1));

        let first = ctl.toggle_reaction(ReactionKind::Like).unwrap().applied().unwrap();
        assert_eq!(first.reaction, Reaction::Like);
        assert_eq!((first.likes, first.dislikes), (5, 1));

        let second = ctl.toggle_reaction(ReactionKind::Like).unwrap().applied().unwrap();
        assert_eq!(second.reaction, Reaction::None);
        assert_eq!((second.likes, second.dislikes), (4, 1));

        let body = transport.requests()[0].json_body().unwrap();
        assert_eq!(body, json!({"article_id": 42, "type": "like"}));
    }

    #[test]
    fn switching_moves_one_vote_across() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {"reaction": "dislike", "action": "switched", "counts": {"likes": 4, "dislikes": 2}}}),
        );
        let initial = ArticleEngagement {
            reaction: Reaction::Like,
            ..article(5, 1)
        };
        let (ctl, _h) = controller(transport, initial);

        let next = ctl.toggle_reaction(ReactionKind::Dislike).unwrap().applied().unwrap();
        assert_eq!(next.reaction, Reaction::Dislike);
        assert_eq!((next.likes, next.dislikes), (4, 2));
    }

    #[test]
    fn failed_call_leaves_state_untouched() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"ok": false, "error": "Too many reactions"}));
        let (ctl, h) = controller(transport, article(4, 1));

        let err = ctl.toggle_reaction(ReactionKind::Like).unwrap_err();
        assert_eq!(err, ApiError::Application("Too many reactions".into()));
        assert_eq!(ctl.state(), article(4, 1));
        assert!(!ctl.is_busy(Control::Reaction));
        assert_eq!(h.toasts.len(), 1);
    }

    #[test]
    fn same_star_twice_clears_the_rating() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {"action": "saved", "user_rating": 4, "rating": {"average": 4.0, "count": 3}}}),
        );
        transport.push_json(
            200,
            json!({"ok": true, "data": {"action": "removed", "user_rating": null, "rating": {"average": 3.5, "count": 2}}}),
        );
        let (ctl, _h) = controller(transport.clone(), article(0, 0));

        let saved = ctl.rate(4).unwrap().applied().unwrap();
        assert_eq!(saved.rating.user_value, Some(4));
        assert_eq!(saved.rating.count, 3);

        let removed = ctl.rate(4).unwrap().applied().unwrap();
        assert_eq!(removed.rating.user_value, None);
        assert_eq!(removed.rating.count, 2);
        assert_eq!(removed.rating.average, 3.5);

        assert_eq!(ctl.rate(0).unwrap(), Dispatch::Skipped);
        assert_eq!(ctl.rate(6).unwrap(), Dispatch::Skipped);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn out_of_range_user_rating_is_dropped() {
        let summary = RatingSummary::from_server(
            &RatingStats {
                average: None,
                count: 0,
            },
            Some(9),
        );
        assert_eq!(summary.user_value, None);
        assert_eq!(summary.average, 0.0);
    }

    #[test]
    fn favorite_applies_server_count() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {"favorited": true, "favorites_count": 12}}),
        );
        let (ctl, _h) = controller(transport, article(0, 0));

        let next = ctl.toggle_favorite().unwrap().applied().unwrap();
        assert!(next.favorited);
        assert_eq!(next.favorites, 12);
    }

    #[test]
    fn subscription_requires_non_zero_target() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {"subscribed": true, "category_id": 3}}),
        );
        let (ctl, _h) = controller(transport.clone(), article(0, 0));

        assert_eq!(
            ctl.toggle_subscription(SubscriptionTarget::Category(0)).unwrap(),
            Dispatch::Skipped
        );
        assert_eq!(transport.request_count(), 0);

        let view = ctl
            .toggle_subscription(SubscriptionTarget::Category(3))
            .unwrap()
            .applied()
            .unwrap();
        assert!(view.subscribed);
        assert_eq!(view.label, "Subscribed");
        assert_eq!(ctl.subscription(SubscriptionTarget::Category(3)), view);
        assert_eq!(
            transport.requests()[0].json_body().unwrap(),
            json!({"category_id": 3})
        );
    }

    #[test]
    fn seeded_subscription_sets_the_label() {
        let (ctl, _h) = controller(ScriptedTransport::new(), article(0, 0));
        let team = SubscriptionTarget::Team(4);
        assert_eq!(ctl.subscription(team).label, "Subscribe");
        ctl.seed_subscription(team, true);
        assert_eq!(ctl.subscription(team), SubscriptionView::new(true));
        assert_eq!(ctl.subscription(team).label, "Subscribed");
    }

    #[test]
    fn status_fetch_only_for_authenticated_viewers() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ok": true, "data": {
                "liked": false, "disliked": true, "favorited": true,
                "counts": {"likes": 2, "dislikes": 7},
                "user_rating": 5, "rating": {"average": 4.25, "count": 4}
            }}),
        );
        let initial = ArticleEngagement {
            favorites: 9,
            ..article(0, 0)
        };
        let (ctl, _h) = controller(transport.clone(), initial);

        assert_eq!(ctl.load_status(false).unwrap(), Dispatch::Skipped);
        assert_eq!(transport.request_count(), 0);

        let seeded = ctl.load_status(true).unwrap().applied().unwrap();
        assert_eq!(seeded.reaction, Reaction::Dislike);
        assert_eq!((seeded.likes, seeded.dislikes), (2, 7));
        assert!(seeded.favorited);
        assert_eq!(seeded.favorites, 9);
        assert_eq!(seeded.rating.user_value, Some(5));
        assert_eq!(
            transport.requests()[0].url.query(),
            Some("article_id=42")
        );
    }

    #[test]
    fn mutations_wait_for_the_status_snapshot() {
        let scripted = ScriptedTransport::new();
        scripted.push_json(
            200,
            json!({"ok": true, "data": {
                "liked": false, "disliked": false, "favorited": false,
                "counts": {"likes": 4, "dislikes": 1},
                "rating": {"average": null, "count": 0}
            }}),
        );
        scripted.push_json(
            200,
            json!({"ok": true, "data": {"reaction": "like", "counts": {"likes": 5, "dislikes": 1}}}),
        );
        let (gated, gate) = GatedTransport::new(scripted.clone());
        let h = harness(gated);
        let ctl = Arc::new(EngagementController::new(
            h.api.clone(),
            Arc::new(EventBus::new()),
            Endpoints::default(),
            article(0, 0),
        ));

        let status = {
            let ctl = ctl.clone();
            thread::spawn(move || ctl.load_status(true))
        };
        gate.entered.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(ctl.is_busy(Control::Status));
        assert_eq!(ctl.toggle_reaction(ReactionKind::Like).unwrap(), Dispatch::InFlight);
        assert_eq!(ctl.toggle_favorite().unwrap(), Dispatch::InFlight);
        assert_eq!(ctl.rate(3).unwrap(), Dispatch::InFlight);
        assert!(!ctl.is_busy(Control::Reaction));

        gate.release.send(()).unwrap();
        assert!(status.join().unwrap().unwrap().is_applied());
        assert_eq!(scripted.request_count(), 1);

        gate.release.send(()).unwrap();
        let liked = ctl.toggle_reaction(ReactionKind::Like).unwrap().applied().unwrap();
        assert_eq!(liked.reaction, Reaction::Like);
        assert_eq!(ctl.state().likes, 5);
    }

    #[test]
    fn status_is_refused_while_a_mutation_is_pending() {
        let scripted = ScriptedTransport::new();
        scripted.push_json(
            200,
            json!({"ok": true, "data": {"favorited": true, "favorites_count": 1}}),
        );
        let (gated, gate) = GatedTransport::new(scripted.clone());
        let h = harness(gated);
        let ctl = Arc::new(EngagementController::new(
            h.api.clone(),
            Arc::new(EventBus::new()),
            Endpoints::default(),
            article(0, 0),
        ));

        let favorite = {
            let ctl = ctl.clone();
            thread::spawn(move || ctl.toggle_favorite())
        };
        gate.entered.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(ctl.load_status(true).unwrap(), Dispatch::InFlight);

        gate.release.send(()).unwrap();
        assert!(favorite.join().unwrap().unwrap().is_applied());
        assert!(ctl.state().favorited);
        assert_eq!(scripted.request_count(), 1);
    }

    #[test]
    fn second_click_while_in_flight_is_refused() {
        let scripted = ScriptedTransport::new();
        scripted.push_json(
            200,
            json!({"ok": true, "data": {"reaction": "like", "counts": {"likes": 1, "dislikes": 0}}}),
        );
        let (gated, gate) = GatedTransport::new(scripted.clone());
        let h = harness(gated);
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let ctl = Arc::new(EngagementController::new(
            h.api.clone(),
            events,
            Endpoints::default(),
            article(0, 0),
        ));

        let worker = {
            let ctl = ctl.clone();
            thread::spawn(move || ctl.toggle_reaction(ReactionKind::Like))
        };
        gate.entered.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(ctl.is_busy(Control::Reaction));
        assert_eq!(
            ctl.toggle_reaction(ReactionKind::Dislike).unwrap(),
            Dispatch::InFlight
        );

        gate.release.send(()).unwrap();
        let result = worker.join().unwrap().unwrap();
        assert!(result.is_applied());
        assert!(!ctl.is_busy(Control::Reaction));
        assert_eq!(scripted.request_count(), 1);
        assert!(matches!(rx.try_recv(), Ok(Event::EngagementChanged { article_id: 42, .. })));
    }
}
