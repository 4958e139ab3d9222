//! Domain layer public interface.
//!
//! This module defines abstractions that are independent of any concrete
//! socket library or wire encoding.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    EventInbox,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};
