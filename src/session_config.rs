//! Public, transport-agnostic session configuration.
//!
//! Transport layers interpret the relevant subset of this config through
//! [`SessionConfig::transport_config`].

use std::time::Duration;

use crate::TransportConfig;

/// Default capacity of the inbound event channel.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Session configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // ---
    /// Endpoint to connect to (e.g. `"http://192.168.1.10"`, `"memory://robot"`).
    pub host: String,

    /// Optional transport type override. If `None`, the host scheme decides.
    pub transport_type: Option<String>,

    /// How long a call may wait for its reply.
    ///
    /// `None` (the default) waits until a reply, an error, or a disconnect
    /// arrives, however long that takes.
    pub request_timeout: Option<Duration>,

    /// Capacity of the inbound event channel between transport and session.
    ///
    /// Default: 64
    pub inbox_capacity: usize,
}

impl SessionConfig {
    /// Create a config for `host` with no timeout and default capacities.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            transport_type: None,
            request_timeout: None,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Force a specific transport type.
    pub fn with_transport_type(mut self, transport_type: impl Into<String>) -> Self {
        self.transport_type = Some(transport_type.into());
        self
    }

    /// Bound every call by `timeout`.
    ///
    /// A call that is still pending when the timeout expires is removed from
    /// the pending table and fails with
    /// [`SessionError::Timeout`](crate::SessionError::Timeout). A reply that
    /// arrives later is discarded.
    ///
    /// # Example
    ///
    /// ```
    /// use mom_session::SessionConfig;
    /// use std::time::Duration;
    ///
    /// let config = SessionConfig::new("memory://robot")
    ///     .with_request_timeout(Duration::from_secs(10));
    /// assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
    /// ```
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the inbound event channel capacity.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// The subset of this config a transport factory needs.
    pub fn transport_config(&self) -> TransportConfig {
        // ---
        TransportConfig {
            host: self.host.clone(),
            transport_type: self.transport_type.clone(),
            inbox_capacity: self.inbox_capacity,
        }
    }
}
