use std::collections::HashSet;
use std::hash::Hash;

use parking_lot::Mutex;

/// Outcome of a user action on a control.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    /// The server answered and the new state was applied.
    Applied(T),
    /// The control's previous request is still running; nothing was sent.
    InFlight,
    /// A precondition failed before any network call.
    Skipped,
}

impl<T> Dispatch<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Dispatch::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Dispatch::Applied(_))
    }
}

/// Controls that currently have a request outstanding.
///
/// A control is disabled from `try_begin` until its guard drops, on every
/// exit path.
pub struct InFlight<K> {
    active: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, key: K) -> Option<InFlightGuard<'_, K>> {
        self.try_begin_unless(key, |_| false)
    }

    /// Like [`InFlight::try_begin`], but also refuses while any active key
    /// matches `blocked`. Both checks happen under one lock.
    pub fn try_begin_unless<F>(&self, key: K, blocked: F) -> Option<InFlightGuard<'_, K>>
    where
        F: Fn(&K) -> bool,
    {
        let mut active = self.active.lock();
        if active.iter().any(blocked) || !active.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { owner: self, key })
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.active.lock().contains(key)
    }
}

pub struct InFlightGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a InFlight<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        self.owner.active.lock().remove(&self.key);
    }
}
