use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::engagement::{ArticleEngagement, SubscriptionTarget};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EngagementChanged {
        article_id: u64,
        state: ArticleEngagement,
    },
    SubscriptionChanged {
        target: SubscriptionTarget,
        subscribed: bool,
    },
    CommentsChanged {
        article_id: u64,
        count: usize,
    },
    ListingMerged {
        added: usize,
        exhausted: bool,
    },
    /// The listing was re-rendered from scratch, e.g. after a filter change.
    ListingReset {
        next_url: Option<String>,
    },
    SearchUpdated {
        generation: u64,
        results: usize,
    },
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_and_prunes_dropped_receivers() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        bus.publish(Event::CommentsChanged {
            article_id: 7,
            count: 2,
        });

        assert_eq!(
            first.try_recv().unwrap(),
            Event::CommentsChanged {
                article_id: 7,
                count: 2
            }
        );
        assert_eq!(bus.subscriber_count(), 1);
    }
}
