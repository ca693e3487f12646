//! Save signal published by a persistence handle.
//!
//! # Responsibility
//! - Let any number of observers subscribe to "a session saved" events of
//!   one handle.
//! - Deliver events through per-subscriber channels so the observer decides
//!   on which execution context to react.
//!
//! # Invariants
//! - A save happens-before its own event is enqueued.
//! - Cancelled or dropped subscriptions receive nothing further.

use crate::model::record::PersistentId;
use crate::store::session::SessionId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

/// Summary of one committed save.
///
/// The id lists are informational; observers that re-query on every event
/// do not depend on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveEvent {
    pub session: SessionId,
    pub inserted: Vec<PersistentId>,
    pub updated: Vec<PersistentId>,
    pub deleted: Vec<PersistentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberKind {
    Observer,
    SessionFeed,
}

struct Subscriber {
    id: u64,
    kind: SubscriberKind,
    sender: Sender<SaveEvent>,
}

/// Fan-out point for save events of one handle.
#[derive(Default)]
pub struct SaveNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SaveNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> SaveSubscription {
        self.register(SubscriberKind::Observer)
    }

    /// Feed a session uses to hear about saves of its sibling sessions.
    /// Not counted by `subscriber_count`.
    pub(crate) fn subscribe_session_feed(self: &Arc<Self>) -> SaveSubscription {
        self.register(SubscriberKind::SessionFeed)
    }

    fn register(self: &Arc<Self>, kind: SubscriberKind) -> SaveSubscription {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { id, kind, sender });

        SaveSubscription {
            id,
            receiver,
            notifier: Arc::downgrade(self),
        }
    }

    /// Number of live observer subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscriber| subscriber.kind == SubscriberKind::Observer)
            .count()
    }

    pub(crate) fn publish(&self, event: &SaveEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.sender.send(event.clone()).is_ok());
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.id != id);
    }
}

/// Cancellable registration for save events; dropping it unsubscribes.
pub struct SaveSubscription {
    id: u64,
    receiver: Receiver<SaveEvent>,
    notifier: Weak<SaveNotifier>,
}

impl SaveSubscription {
    /// Returns the next queued event without blocking.
    pub fn try_next(&self) -> Option<SaveEvent> {
        self.receiver.try_recv().ok()
    }

    /// Takes every queued event without blocking.
    pub fn drain(&self) -> Vec<SaveEvent> {
        self.receiver.try_iter().collect()
    }

    /// Blocks up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SaveEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for SaveSubscription {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SaveEvent, SaveNotifier};
    use crate::store::session::SessionId;
    use std::time::Duration;

    fn event() -> SaveEvent {
        SaveEvent {
            session: SessionId::from_raw(1),
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    #[test]
    fn every_subscriber_receives_each_event() {
        let notifier = SaveNotifier::new();
        let first = notifier.subscribe();
        let second = notifier.subscribe();

        notifier.publish(&event());
        notifier.publish(&event());

        assert_eq!(first.drain().len(), 2);
        assert_eq!(second.drain().len(), 2);
        assert!(first.try_next().is_none());
    }

    #[test]
    fn cancel_unsubscribes() {
        let notifier = SaveNotifier::new();
        let subscription = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);

        subscription.cancel();
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.publish(&event());
    }

    #[test]
    fn session_feeds_receive_events_but_are_not_counted() {
        let notifier = SaveNotifier::new();
        let feed = notifier.subscribe_session_feed();
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.publish(&event());
        assert_eq!(feed.drain().len(), 1);
    }

    #[test]
    fn recv_timeout_returns_none_without_events() {
        let notifier = SaveNotifier::new();
        let subscription = notifier.subscribe();
        assert!(subscription
            .recv_timeout(Duration::from_millis(10))
            .is_none());

        notifier.publish(&event());
        assert!(subscription
            .recv_timeout(Duration::from_millis(10))
            .is_some());
    }
}
