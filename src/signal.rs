//! Signal demultiplexing.
//!
//! Every `signal` event the server pushes carries the object name, the
//! signal name and the link token the server handed out when the
//! subscription was registered. The [`SignalRegistry`] routes each event to
//! the one subscription whose triple matches exactly; events without a
//! match (typically in flight when an unsubscribe happened) are dropped.
//!
//! Subscribers receive payloads through a [`SignalStream`].

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::lock::lock_ignore_poison;
use crate::protocol::SignalEvent;
use crate::session::WeakSession;
use crate::{log_debug, Result, SessionError};

/// Compound key identifying one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalKey {
    pub object_name: String,
    pub signal_name: String,
    pub link_name: String,
}

impl SignalKey {
    pub fn new(
        object_name: impl Into<String>,
        signal_name: impl Into<String>,
        link_name: impl Into<String>,
    ) -> Self {
        // ---
        Self {
            object_name: object_name.into(),
            signal_name: signal_name.into(),
            link_name: link_name.into(),
        }
    }
}

impl From<&SignalEvent> for SignalKey {
    fn from(event: &SignalEvent) -> Self {
        Self::new(
            event.object_name.as_str(),
            event.signal_name.as_str(),
            event.link_name.as_str(),
        )
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}#{}",
            self.object_name, self.signal_name, self.link_name
        )
    }
}

/// Handle to one registration in a [`SignalRegistry`].
///
/// Carries a registry-local id as well as the key, so a stale handle can
/// never remove a newer registration that happens to reuse the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    key: SignalKey,
    id: u64,
}

impl SubscriptionHandle {
    pub fn key(&self) -> &SignalKey {
        &self.key
    }
}

struct Entry {
    id: u64,
    sink: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Subscriptions {
    entries: HashMap<SignalKey, Entry>,

    /// Set by `clear()`. A closed registry accepts no new subscriptions.
    closed: bool,
}

/// Routes inbound signal events to subscribers by exact key.
///
/// Delivery never blocks the caller: each subscriber has an unbounded
/// queue, so one slow consumer cannot stall replies for everyone else.
///
/// Once [`clear`](Self::clear) has run, the registry refuses new
/// subscriptions. Clearing and subscribing share one lock, so a
/// subscription can never slip in after the teardown and stay open forever.
pub(crate) struct SignalRegistry {
    // ---
    subscriptions: Mutex<Subscriptions>,
    next_id: AtomicU64,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Subscriptions::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register interest in `key`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Disconnected`] if the registry has been cleared
    /// - [`SessionError::DuplicateSubscription`] if `key` is already live
    pub fn subscribe(
        &self,
        key: SignalKey,
    ) -> Result<(SubscriptionHandle, mpsc::UnboundedReceiver<Value>)> {
        // ---
        let mut subs = lock_ignore_poison(&self.subscriptions);

        if subs.closed {
            return Err(SessionError::Disconnected);
        }

        if subs.entries.contains_key(&key) {
            return Err(SessionError::DuplicateSubscription {
                object_name: key.object_name,
                signal_name: key.signal_name,
                link_name: key.link_name,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sink, rx) = mpsc::unbounded_channel();
        subs.entries.insert(key.clone(), Entry { id, sink });

        Ok((SubscriptionHandle { key, id }, rx))
    }

    /// Deliver `event` to the matching subscription.
    ///
    /// Returns true if a live subscriber received it. A subscription whose
    /// receiver has gone away is pruned on the way.
    pub fn dispatch(&self, event: SignalEvent) -> bool {
        // ---
        let key = SignalKey::from(&event);
        let mut subs = lock_ignore_poison(&self.subscriptions);

        let Some(entry) = subs.entries.get(&key) else {
            log_debug!("no subscription for signal {key}, dropped");
            return false;
        };

        if entry.sink.send(event.data).is_ok() {
            return true;
        }

        log_debug!("subscriber for {key} went away, pruning");
        subs.entries.remove(&key);
        false
    }

    /// Remove the registration behind `handle`.
    ///
    /// Returns false if it was already gone. Payloads already queued for the
    /// subscriber are not retracted.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        // ---
        let mut subs = lock_ignore_poison(&self.subscriptions);
        match subs.entries.get(&handle.key) {
            Some(entry) if entry.id == handle.id => {
                subs.entries.remove(&handle.key);
                true
            }
            _ => false,
        }
    }

    /// Drop every registration and refuse new ones; every stream then ends
    /// after draining.
    ///
    /// Returns the number of registrations dropped. A second call returns 0.
    pub fn clear(&self) -> usize {
        // ---
        let mut subs = lock_ignore_poison(&self.subscriptions);
        subs.closed = true;

        let count = subs.entries.len();
        subs.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.subscriptions).entries.len()
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    inbox: mpsc::UnboundedReceiver<Value>,
    session: WeakSession,
}

/// Payloads of one signal subscription, in arrival order.
///
/// The stream is lazy and unbounded: it yields until the subscription is
/// removed by [`unsubscribe`](Self::unsubscribe), by session disposal, or by
/// connection loss. Once it has ended it cannot be restarted; subscribe
/// again to get a new link.
///
/// Dropping the stream removes the local registration but does not tell
/// the server; use [`unsubscribe`](Self::unsubscribe) for that.
pub struct SignalStream {
    active: Option<ActiveSubscription>,
}

impl SignalStream {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        inbox: mpsc::UnboundedReceiver<Value>,
        session: WeakSession,
    ) -> Self {
        // ---
        Self {
            active: Some(ActiveSubscription {
                handle,
                inbox,
                session,
            }),
        }
    }

    /// A stream that is already finished.
    pub fn empty() -> Self {
        Self { active: None }
    }

    /// The subscription key, or `None` for an empty stream.
    pub fn key(&self) -> Option<&SignalKey> {
        self.active.as_ref().map(|a| a.handle.key())
    }

    /// The server-issued link token, or `None` for an empty stream.
    pub fn link(&self) -> Option<&str> {
        self.key().map(|k| k.link_name.as_str())
    }

    /// Wait for the next payload. `None` means the stream has ended.
    pub async fn next_payload(&mut self) -> Option<Value> {
        // ---
        match self.active.as_mut() {
            Some(active) => active.inbox.recv().await,
            None => None,
        }
    }

    /// End the subscription locally and on the server.
    ///
    /// The local registration is removed first, so no further payloads are
    /// queued even if the server keeps sending until it processes the
    /// request. An empty stream returns `Ok(())` without any I/O.
    ///
    /// # Errors
    ///
    /// Whatever the `unregisterEvent` call fails with, including
    /// [`SessionError::SessionClosed`] when the session is gone.
    pub async fn unsubscribe(mut self) -> Result<()> {
        // ---
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        let session = active.session.upgrade().ok_or(SessionError::SessionClosed)?;
        session.signals().unsubscribe(&active.handle);

        let key = active.handle.key();
        session
            .unregister_event(&key.object_name, &key.signal_name, &key.link_name)
            .await
    }
}

impl Stream for SignalStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.active.as_mut() {
            Some(active) => active.inbox.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for SignalStream {
    fn drop(&mut self) {
        // ---
        if let Some(active) = self.active.take() {
            if let Some(session) = active.session.upgrade() {
                session.signals().unsubscribe(&active.handle);
            }
        }
    }
}

impl fmt::Debug for SignalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStream")
            .field("key", &self.key())
            .finish()
    }
}
