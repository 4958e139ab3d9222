//! Session builder.
//!
//! Provides a fluent builder API for opening a [`Session`], either over a
//! transport selected from the host, or over a transport the caller already
//! has.

use std::time::Duration;

use crate::{Result, Session, SessionConfig, SessionError, TransportPtr};

/// Builder for opening sessions.
///
/// # Examples
///
/// ## From a host
/// ```no_run
/// use mom_session::SessionBuilder;
///
/// # async fn example() -> mom_session::Result<()> {
/// let session = SessionBuilder::new()
///     .host("memory://robot")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Over an injected transport, with a timeout
/// ```no_run
/// use mom_session::{SessionBuilder, TransportPtr};
/// use std::time::Duration;
///
/// # async fn example(transport: TransportPtr) -> mom_session::Result<()> {
/// let session = SessionBuilder::new()
///     .transport(transport)
///     .request_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    // ---
    host: Option<String>,
    transport_type: Option<String>,
    transport: Option<TransportPtr>,
    request_timeout: Option<Duration>,
    inbox_capacity: Option<usize>,
}

impl SessionBuilder {
    /// Create a new session builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint to connect to.
    ///
    /// Required unless a transport is injected with [`.transport()`](Self::transport).
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set explicit transport type.
    ///
    /// Valid values: `"memory"`. If not specified, the host scheme decides.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Use an existing transport instead of creating one.
    ///
    /// The host defaults to the transport's own host.
    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Bound every call by `timeout`.
    ///
    /// Default: no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the inbound event channel capacity.
    ///
    /// Default: 64.
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = Some(capacity);
        self
    }

    /// Open the session (consumes self).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - neither a host nor a transport was provided (`MissingConfig`)
    /// - the transport cannot be created or connected (`Transport`)
    pub async fn build(self) -> Result<Session> {
        // ---
        let host = match (self.host, &self.transport) {
            (Some(host), _) => host,
            (None, Some(transport)) => transport.host().to_string(),
            (None, None) => return Err(SessionError::MissingConfig("host".into())),
        };

        let mut config = SessionConfig::new(host);
        config.transport_type = self.transport_type;
        config.request_timeout = self.request_timeout;
        if let Some(capacity) = self.inbox_capacity {
            config.inbox_capacity = capacity;
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => crate::create_transport(config.transport_config()).await?,
        };

        Session::with_transport(transport, config).await
    }
}
