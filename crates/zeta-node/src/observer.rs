//! Display observer interface.
//!
//! The core calls out on lifecycle transitions, relay membership
//! changes, and for every new or replayed message. Observers are
//! registered before the node starts and invoked synchronously from
//! the event loop task, in registration order.

use std::sync::Arc;

use zeta_types::{MessageRecord, PeerIdentity, SessionStatus};

/// Receives session notifications. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// Coarse connectivity status changed.
    fn on_status(&self, _status: SessionStatus) {}

    /// The active relay set changed.
    fn on_relays(&self, _relays: &[PeerIdentity]) {}

    /// A new or replayed message is ready for display.
    fn on_message(&self, _record: &MessageRecord) {}
}

/// Ordered list of registered observers.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer.
    pub fn register(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns `true` if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn status(&self, status: SessionStatus) {
        for o in &self.observers {
            o.on_status(status);
        }
    }

    pub(crate) fn relays(&self, relays: &[PeerIdentity]) {
        for o in &self.observers {
            o.on_relays(relays);
        }
    }

    pub(crate) fn message(&self, record: &MessageRecord) {
        for o in &self.observers {
            o.on_message(record);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}
