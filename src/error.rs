use serde_json::Value;
use thiserror::Error;

use crate::CorrelationId;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation attempted after `dispose()`. Nothing was sent.
    #[error("session is closed")]
    SessionClosed,

    /// The transport reported connection loss while the call was outstanding,
    /// or before it could be issued.
    #[error("session disconnected")]
    Disconnected,

    /// The directory lookup for a service came back as an error envelope.
    #[error("failed to load service '{service_name}' (id {id})")]
    LoadServiceFailed {
        id: CorrelationId,
        service_name: String,
        error_payload: Value,
    },

    /// A general call came back as an error envelope.
    #[error("failed to call {object_name}.{method_name}({args:?}) (id {id})")]
    CallFailed {
        id: CorrelationId,
        object_name: String,
        method_name: String,
        args: Vec<Value>,
        error_payload: Value,
    },

    /// No resolution arrived within the configured timeout.
    #[error("request {id} timed out")]
    Timeout { id: CorrelationId },

    /// Transport collaborator failure
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound payload did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A subscription with the same (object, signal, link) triple is already live
    #[error("duplicate subscription {object_name}.{signal_name} (link {link_name})")]
    DuplicateSubscription {
        object_name: String,
        signal_name: String,
        link_name: String,
    },

    /// Required configuration value was not provided
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
