use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CorrelationId, Result, SessionError};

/// Event names used on the socket.
pub mod events {
    /// Outbound: a correlated call.
    pub const CALL: &str = "call";
    /// Inbound: successful resolution of a call.
    pub const REPLY: &str = "reply";
    /// Inbound: failed resolution of a call.
    pub const ERROR: &str = "error";
    /// Inbound: one occurrence of a subscribed signal.
    pub const SIGNAL: &str = "signal";
    /// Inbound: the connection is gone.
    pub const DISCONNECT: &str = "disconnect";
}

/// Outbound call envelope.
///
/// ```text
/// { "idm": 7, "params": { "obj": "ALTextToSpeech", "method": "say", "args": ["Hello"] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub idm: CorrelationId,
    pub params: CallParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    pub obj: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallEnvelope {
    pub fn new(
        id: CorrelationId,
        object_name: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        // ---
        Self {
            idm: id,
            params: CallParams {
                obj: object_name.into(),
                method: method_name.into(),
                args,
            },
        }
    }
}

/// One occurrence of a remote signal.
///
/// Inbound shape:
///
/// ```text
/// { "result": { "obj": "ALMemory", "signal": "FrontTactilTouched", "link": "12", "data": 1.0 } }
/// ```
///
/// `link` is the token handed out by `registerEvent`; it tells apart two
/// subscriptions to the same object/signal pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    #[serde(rename = "obj")]
    pub object_name: String,
    #[serde(rename = "signal")]
    pub signal_name: String,
    #[serde(rename = "link", deserialize_with = "link_as_string")]
    pub link_name: String,
    #[serde(default)]
    pub data: Value,
}

impl SignalEvent {
    /// Parse the full inbound `signal` payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        // ---
        let result = payload
            .get("result")
            .ok_or_else(|| SessionError::InvalidResponse("signal without `result`".into()))?;

        Ok(Self::deserialize(result)?)
    }
}

// Servers are not consistent about sending the link as a string or a number.
fn link_as_string<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "link must be a string or number, got {other}"
        ))),
    }
}

/// Extract the correlation id of an inbound reply or error envelope.
pub(crate) fn reply_id(payload: &Value) -> Result<CorrelationId> {
    // ---
    payload
        .get("idm")
        .and_then(Value::as_u64)
        .map(CorrelationId::from)
        .ok_or_else(|| SessionError::InvalidResponse("envelope without integer `idm`".into()))
}

/// The `result` member of a reply envelope.
pub(crate) fn reply_result(payload: &Value) -> Result<&Value> {
    payload
        .get("result")
        .ok_or_else(|| SessionError::InvalidResponse("reply without `result`".into()))
}
