// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the interface the session layer expects from the
//! connection underneath it: a bidirectional channel of *named events*, each
//! carrying a JSON payload. Establishing the socket, framing, and encoding
//! bytes on the wire are the transport's business; correlation, signal
//! demultiplexing and failure semantics live in the session layer.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use serde_json::Value;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::events;

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` and returns
/// it from [`Transport::base`], so default trait methods can read common
/// fields without each transport repeating them.
pub struct TransportBase {
    /// Endpoint this transport talks to (e.g. `"memory://robot"`).
    pub host: String,
    /// Capacity of the inbound event channel.
    pub inbox_capacity: usize,
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            host: config.host.clone(),
            inbox_capacity: config.inbox_capacity,
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Passed to transport factory functions (`create_*_transport()`).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Endpoint to connect to.
    pub host: String,
    /// Optional transport type override (e.g. `"memory"`).
    /// If `None`, the transport is chosen from the host scheme.
    pub transport_type: Option<String>,
    /// Capacity of the inbound event channel.
    pub inbox_capacity: usize,
}

/// A named event with a JSON payload.
///
/// This is the unit exchanged with the transport in both directions. The
/// session emits `call` events and consumes `reply`, `error`, `signal` and
/// `disconnect` events; any other name is ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportEvent {
    // ---
    /// Event name (see [`crate::protocol::events`]).
    pub name: Arc<str>,

    /// Event payload; `Value::Null` for events without one.
    pub payload: Value,
}

impl TransportEvent {
    pub fn new(name: impl Into<Arc<str>>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// An outbound `call` event.
    pub fn call(payload: Value) -> Self {
        Self::new(events::CALL, payload)
    }

    /// An inbound `disconnect` notification.
    pub fn disconnect() -> Self {
        Self::new(events::DISCONNECT, Value::Null)
    }
}

/// Inbound side of a connected transport.
///
/// The transport pushes every received event into `inbox`. The channel
/// closing means the transport will deliver nothing further.
pub struct EventInbox {
    // ---
    /// Receiver for inbound events, in arrival order.
    pub inbox: mpsc::Receiver<TransportEvent>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - `connect()` hands out the inbound stream exactly once; a second call fails.
/// - Events are delivered to the inbox in the order the transport received them.
/// - `emit()` after `close()` fails with [`SessionError::Transport`](crate::SessionError::Transport).
/// - `close()` is idempotent and, when the connection was live, is followed by
///   a `disconnect` event on the inbox.
///
/// The in-memory transport is the reference implementation of these semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Endpoint this transport talks to.
    fn host(&self) -> &str {
        &self.base().host
    }

    /// Issue the connection attempt and return the inbound event stream.
    ///
    /// Returns once the attempt has been issued, not necessarily completed.
    async fn connect(&self) -> Result<EventInbox>;

    /// Send one named event.
    async fn emit(&self, event: TransportEvent) -> Result<()>;

    /// Close the connection and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// An `Arc<dyn Transport>`: cheap to clone, every clone shares the same
/// connection.
pub type TransportPtr = Arc<dyn Transport>;
