//! Inbox change notifications.

use std::sync::{Arc, PoisonError, RwLock};

use msgcenter_api::MessageId;
use tokio::sync::broadcast;

use crate::SyncError;
use crate::store::Message;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// Receives inbox notifications.
///
/// Called from the sync task; implementations must return quickly.
pub trait InboxObserver: Send + Sync {
    /// The inbox view changed; `snapshot` is ordered newest first.
    fn on_inbox_updated(&self, snapshot: &[Message]);

    /// A sync attempt failed. The previous snapshot is still valid.
    fn on_sync_failed(&self, _error: &SyncError) {}

    /// The service permanently refused a mutation for `ids`.
    fn on_mutation_rejected(&self, _ids: &[MessageId], _reason: &str) {}
}

/// Inbox notification, as delivered by [`Inbox::subscribe`](crate::Inbox::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxEvent {
    /// The inbox view changed.
    Updated(Vec<Message>),
    /// A sync attempt failed.
    SyncFailed(SyncError),
    /// The service permanently refused a mutation.
    MutationRejected {
        /// Affected messages.
        ids: Vec<MessageId>,
        /// Why the service refused.
        reason: String,
    },
}

/// Registered observers plus the broadcast channel.
pub(crate) struct Observers {
    observers: RwLock<Vec<Arc<dyn InboxObserver>>>,
    events: broadcast::Sender<InboxEvent>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub(crate) fn add(&self, observer: Arc<dyn InboxObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<InboxEvent> {
        self.events.subscribe()
    }

    fn each(&self, f: impl Fn(&dyn InboxObserver)) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    pub(crate) fn updated(&self, snapshot: &[Message]) {
        self.each(|o| o.on_inbox_updated(snapshot));
        // No subscribers is fine.
        let _ = self.events.send(InboxEvent::Updated(snapshot.to_vec()));
    }

    pub(crate) fn failed(&self, error: &SyncError) {
        self.each(|o| o.on_sync_failed(error));
        let _ = self.events.send(InboxEvent::SyncFailed(error.clone()));
    }

    pub(crate) fn rejected(&self, ids: &[MessageId], reason: &str) {
        self.each(|o| o.on_mutation_rejected(ids, reason));
        let _ = self.events.send(InboxEvent::MutationRejected {
            ids: ids.to_vec(),
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Observers")
            .field("observers", &count)
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<usize>>,
        failures: Mutex<Vec<SyncError>>,
        rejected: Mutex<Vec<MessageId>>,
    }

    impl InboxObserver for Recorder {
        fn on_inbox_updated(&self, snapshot: &[Message]) {
            self.updates.lock().unwrap().push(snapshot.len());
        }

        fn on_sync_failed(&self, error: &SyncError) {
            self.failures.lock().unwrap().push(error.clone());
        }

        fn on_mutation_rejected(&self, ids: &[MessageId], _reason: &str) {
            self.rejected.lock().unwrap().extend_from_slice(ids);
        }
    }

    #[test]
    fn test_fan_out_to_observers_and_subscribers() {
        let observers = Observers::new();
        let recorder = Arc::new(Recorder::default());
        observers.add(recorder.clone());
        let mut rx = observers.subscribe();

        observers.updated(&[]);
        observers.failed(&SyncError::Transient("down".to_string()));
        observers.rejected(&[MessageId::from("m1")], "gone");

        assert_eq!(*recorder.updates.lock().unwrap(), [0]);
        assert_eq!(recorder.failures.lock().unwrap().len(), 1);
        assert_eq!(*recorder.rejected.lock().unwrap(), [MessageId::from("m1")]);

        assert_eq!(rx.try_recv().unwrap(), InboxEvent::Updated(Vec::new()));
        assert!(matches!(rx.try_recv().unwrap(), InboxEvent::SyncFailed(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            InboxEvent::MutationRejected { .. }
        ));
    }

    #[test]
    fn test_send_without_subscribers() {
        let observers = Observers::new();
        observers.updated(&[]);
    }
}
