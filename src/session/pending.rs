use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::{CorrelationId, Result, SessionError};

/// How an outstanding call was resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    /// A `reply` envelope arrived for this id.
    Reply(Value),
    /// An `error` envelope arrived for this id.
    Error(Value),
    /// The connection was lost before either arrived.
    Disconnected,
}

/// Tracks calls waiting for their resolution.
///
/// Maps correlation ids to oneshot channels. Whichever of reply, error or
/// disconnect reaches an id first removes the entry and fires the channel;
/// anything arriving later for the same id finds nothing and is dropped.
///
/// Once [`abort_all`](Self::abort_all) has run, the table refuses new
/// registrations. Because registration and the disconnect broadcast both go
/// through the same lock, a call can never be registered after the
/// broadcast and left waiting forever.
pub(crate) struct PendingRequests {
    // ---
    requests: HashMap<CorrelationId, oneshot::Sender<Outcome>>,
    disconnected: bool,
}

impl PendingRequests {
    // ---

    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
            disconnected: false,
        }
    }

    /// Register a new pending call.
    ///
    /// Returns a receiver that fires exactly once with the call's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] if the connection is already gone.
    pub fn register(&mut self, id: CorrelationId) -> Result<oneshot::Receiver<Outcome>> {
        // ---
        if self.disconnected {
            return Err(SessionError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        self.requests.insert(id, tx);
        Ok(rx)
    }

    /// Resolve a pending call.
    ///
    /// Returns true if the id was outstanding. The caller may already have
    /// given up waiting (timeout, cancelled future); the outcome is then
    /// discarded, but the entry is still consumed.
    pub fn resolve(&mut self, id: CorrelationId, outcome: Outcome) -> bool {
        // ---
        match self.requests.remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove a pending call without resolving it.
    pub fn remove(&mut self, id: &CorrelationId) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Resolve every outstanding call as [`Outcome::Disconnected`] and refuse
    /// further registrations.
    ///
    /// Returns the number of calls aborted. A second call returns 0.
    pub fn abort_all(&mut self) -> usize {
        // ---
        self.disconnected = true;

        let aborted = self.requests.len();
        for (_, tx) in self.requests.drain() {
            let _ = tx.send(Outcome::Disconnected);
        }
        aborted
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
