/// Wire format for the event socket
///
/// This module defines the JSON shapes exchanged with the remote side:
/// outbound `call` envelopes, inbound `reply`/`error` envelopes and inbound
/// `signal` events, along with the event names that carry them.
mod message;

pub use message::{events, CallEnvelope, CallParams, SignalEvent};
pub(crate) use message::{reply_id, reply_result};
