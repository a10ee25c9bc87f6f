use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_TTL: Duration = Duration::from_millis(2800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Info => "info",
            ToastKind::Success => "success",
            ToastKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    pub expires_at: Instant,
}

/// Fixed-position stack of transient notifications.
///
/// Toasts are kept in insertion order, never deduplicated, and disappear
/// once their deadline passes or the user dismisses them.
pub struct ToastQueue {
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: u64,
    toasts: Vec<Toast>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                next_id: 1,
                toasts: Vec::new(),
            }),
        }
    }

    pub fn publish<S: Into<String>>(&self, message: S, kind: ToastKind) -> u64 {
        self.publish_at(message, kind, self.ttl, Instant::now())
    }

    pub fn publish_at<S: Into<String>>(
        &self,
        message: S,
        kind: ToastKind,
        ttl: Duration,
        now: Instant,
    ) -> u64 {
        let message = message.into();
        tracing::debug!(kind = kind.as_str(), %message, "toast");
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.toasts.push(Toast {
            id,
            message,
            kind,
            expires_at: now + ttl,
        });
        id
    }

    /// Removes a toast before its deadline. Returns false if it was already gone.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.toasts.len();
        inner.toasts.retain(|toast| toast.id != id);
        inner.toasts.len() != before
    }

    /// Drops expired toasts and returns the ones still on screen.
    pub fn visible(&self, now: Instant) -> Vec<Toast> {
        let mut inner = self.inner.lock();
        inner.toasts.retain(|toast| toast.expires_at > now);
        inner.toasts.clone()
    }

    /// Every toast published and not yet pruned, expired or not.
    pub fn snapshot(&self) -> Vec<Toast> {
        self.inner.lock().toasts.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_ttl() {
        let queue = ToastQueue::default();
        let now = Instant::now();
        queue.publish_at("saved", ToastKind::Success, DEFAULT_TTL, now);
        assert_eq!(queue.visible(now + Duration::from_millis(2799)).len(), 1);
        assert!(queue.visible(now + DEFAULT_TTL).is_empty());
    }

    #[test]
    fn keeps_insertion_order_without_dedup() {
        let queue = ToastQueue::default();
        let now = Instant::now();
        queue.publish_at("a", ToastKind::Info, DEFAULT_TTL, now);
        queue.publish_at("b", ToastKind::Error, DEFAULT_TTL, now);
        queue.publish_at("a", ToastKind::Info, DEFAULT_TTL, now);
        let messages: Vec<_> = queue
            .visible(now)
            .into_iter()
            .map(|toast| toast.message)
            .collect();
        assert_eq!(messages, vec!["a", "b", "a"]);
    }

    #[test]
    fn dismiss_removes_early() {
        let queue = ToastQueue::default();
        let first = queue.publish("one", ToastKind::Info);
        queue.publish("two", ToastKind::Info);
        assert!(queue.dismiss(first));
        assert!(!queue.dismiss(first));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].message, "two");
    }
}
