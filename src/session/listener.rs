use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::lock::lock_ignore_poison;
use crate::protocol::SignalEvent;
use crate::CorrelationId;

/// Observer of a session's traffic.
///
/// Every hook has an empty default, so implementors only override what
/// they need. Hooks run on the session's receive loop (or on the calling
/// task for [`on_call_sent`](Self::on_call_sent)) and must not block.
///
/// Each event is delivered to each registered listener exactly once. The
/// reply/error/signal hooks see every inbound event, including ones whose
/// id or subscription is no longer tracked.
pub trait SessionListener: Send + Sync {
    /// A `call` envelope is about to be handed to the transport.
    fn on_call_sent(&self, _envelope: &Value) {}

    /// A `reply` envelope arrived.
    fn on_reply(&self, _id: CorrelationId, _payload: &Value) {}

    /// An `error` envelope arrived.
    fn on_error(&self, _id: CorrelationId, _payload: &Value) {}

    /// A `signal` event arrived.
    fn on_signal(&self, _event: &SignalEvent) {}

    /// The connection was lost.
    fn on_disconnect(&self) {}
}

/// Opaque token returned by [`Session::add_listener`](crate::Session::add_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

pub(crate) struct ListenerRegistry {
    // ---
    listeners: Mutex<Vec<(ListenerHandle, Arc<dyn SessionListener>)>>,
    next: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next: AtomicU64::new(1),
        }
    }

    pub fn add(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        // ---
        let handle = ListenerHandle(self.next.fetch_add(1, Ordering::Relaxed));
        lock_ignore_poison(&self.listeners).push((handle, listener));
        handle
    }

    pub fn remove(&self, handle: ListenerHandle) -> bool {
        // ---
        let mut listeners = lock_ignore_poison(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Run `f` against every listener.
    ///
    /// Works on a snapshot so a hook may add or remove listeners without
    /// deadlocking.
    pub fn notify(&self, f: impl Fn(&dyn SessionListener)) {
        // ---
        let snapshot: Vec<Arc<dyn SessionListener>> = lock_ignore_poison(&self.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in snapshot {
            f(listener.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SessionListener for Counter {
        fn on_disconnect(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        // ---
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter::default());

        let handle = registry.add(counter.clone());
        registry.notify(|l| l.on_disconnect());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        assert!(registry.remove(handle));
        assert!(!registry.remove(handle));

        registry.notify(|l| l.on_disconnect());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handles_are_distinct() {
        // ---
        let registry = ListenerRegistry::new();
        let a = registry.add(Arc::new(Counter::default()));
        let b = registry.add(Arc::new(Counter::default()));
        assert_ne!(a, b);
    }
}
