//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait, exposed only through constructor functions.
//!
//! Session code must not depend on transport-specific types.

mod memory;

pub use memory::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    global_hub,
    MemoryHub,
    MemoryPeer,
};

use crate::{Result, SessionError, TransportConfig, TransportPtr};

/// Create a transport for `config`.
///
/// When `transport_type` is set it is used directly; otherwise the scheme
/// of `host` decides. Only the in-memory transport ships with this crate;
/// other transports are injected via
/// [`SessionBuilder::transport`](crate::SessionBuilder::transport).
///
/// # Errors
///
/// Returns [`SessionError::Transport`] for an unrecognized transport type or
/// scheme, or if the selected transport fails to connect.
pub async fn create_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    match config.transport_type.as_deref() {
        Some("memory") => create_memory_transport(config).await,
        Some(other) => Err(SessionError::Transport(format!(
            "unrecognized transport_type: {other}, valid values: memory"
        ))),
        None if config.host.starts_with("memory://") => create_memory_transport(config).await,
        None => Err(SessionError::Transport(format!(
            "no transport for host {}; inject one with SessionBuilder::transport()",
            config.host
        ))),
    }
}
