//! Correlated RPC calls and signal subscriptions over a single event socket
//!
//! This library turns a bidirectional, event-oriented connection into a
//! call/response and subscribe/unsubscribe programming model. Every call is
//! tagged with a correlation id; replies, errors and disconnects are matched
//! back to the waiting caller, and server-pushed signal events are routed to
//! the subscription they belong to.
//!
//! The transport underneath is a collaborator behind the [`Transport`]
//! trait. An in-memory transport with a scriptable remote peer ships with
//! the crate for tests and demos.
//!

mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

mod domain;
mod lock;
mod transport;

mod correlation;
mod error;
mod protocol;
mod service;
mod session;
mod session_builder;
mod session_config;
mod signal;

pub use correlation::CorrelationId;
pub use error::{Result, SessionError};

pub use protocol::{events, CallEnvelope, CallParams, SignalEvent};

pub use service::{ServiceModule, SERVICE_DIRECTORY};
pub use session::{ListenerHandle, Session, SessionApi, SessionListener};
pub use session_builder::SessionBuilder;
pub use session_config::{SessionConfig, DEFAULT_INBOX_CAPACITY};
pub use signal::{SignalKey, SignalStream, SubscriptionHandle};

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    create_transport,
    global_hub,
    MemoryHub,
    MemoryPeer,
};

// --- public re-exports
pub use domain::{
    //
    EventInbox,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};
