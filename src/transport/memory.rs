//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait, paired with a [`MemoryPeer`] that plays the remote
//! side of the socket. It is intended for testing, local execution, and as
//! the reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - Events emitted by the session reach the peer in emission order.
//! - Events sent by the peer reach the session inbox in send order.
//! - `close()` on the session side delivers a `disconnect` event to the
//!   session before the inbox closes, the way an event-socket client reports
//!   its own disconnect. A second `close()` is a no-op.
//! - [`MemoryPeer::disconnect`] delivers a `disconnect` event and then closes
//!   the inbox, simulating the server dropping the connection.
//!
//! ## Non-Goals
//!
//! No reconnection, no backpressure beyond the bounded inbox, no framing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::lock::lock_ignore_poison;
use crate::protocol::{events, CallEnvelope};
use crate::{
    // ---
    log_debug,
    log_warn,
    CorrelationId,
    EventInbox,
    Result,
    SessionError,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};

/// State shared by the two ends of one in-memory connection.
struct Link {
    // ---
    /// Sender into the session inbox. Installed by `connect()`, taken on
    /// either side's disconnect.
    inbound: Mutex<Option<mpsc::Sender<TransportEvent>>>,

    /// Set once either side has torn the connection down.
    dropped: AtomicBool,

    /// Number of events the session side has emitted.
    emitted: AtomicUsize,
}

impl Link {
    fn inbound_sender(&self) -> Option<mpsc::Sender<TransportEvent>> {
        lock_ignore_poison(&self.inbound).clone()
    }

    /// Deliver a final `disconnect` and close the inbox.
    async fn tear_down(&self) {
        // ---
        self.dropped.store(true, Ordering::SeqCst);

        let sender = lock_ignore_poison(&self.inbound).take();
        if let Some(sender) = sender {
            // The receiver may already be gone if the session was dropped.
            let _ = sender.send(TransportEvent::disconnect()).await;
        }
    }
}

/// A bound endpoint waiting for a transport to connect to it.
struct Listener {
    link: Arc<Link>,
    calls: mpsc::UnboundedSender<TransportEvent>,
}

/// Shared registry of bound in-memory endpoints.
///
/// A [`MemoryPeer`] is bound to a host name; a transport created for the
/// same host name is connected to it. Each binding accepts exactly one
/// connection.
///
/// # Testing Only
///
/// Integration tests should construct their own hub so parallel tests
/// cannot see each other's endpoints:
///
/// ```
/// use mom_session::{create_memory_transport_with_hub, MemoryHub, Session, SessionConfig};
///
/// # async fn example() -> mom_session::Result<()> {
/// let hub = MemoryHub::new();
/// let _peer = hub.bind("memory://robot")?;
///
/// let config = SessionConfig::new("memory://robot");
/// let transport = create_memory_transport_with_hub(config.transport_config(), hub.clone()).await?;
/// let session = Session::with_transport(transport, config).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    listeners: Mutex<HashMap<String, Listener>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind a peer to `host`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if something is already bound to
    /// `host` and has not been connected yet.
    pub fn bind(&self, host: impl Into<String>) -> Result<MemoryPeer> {
        // ---
        let host = host.into();
        let mut listeners = lock_ignore_poison(&self.listeners);

        if listeners.contains_key(&host) {
            return Err(SessionError::Transport(format!("address in use: {host}")));
        }

        let link = Arc::new(Link {
            inbound: Mutex::new(None),
            dropped: AtomicBool::new(false),
            emitted: AtomicUsize::new(0),
        });
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();

        listeners.insert(
            host.clone(),
            Listener {
                link: link.clone(),
                calls: calls_tx,
            },
        );

        log_debug!("memory peer bound at {host}");

        Ok(MemoryPeer {
            host,
            calls: calls_rx,
            link,
        })
    }

    fn accept(&self, host: &str) -> Option<Listener> {
        lock_ignore_poison(&self.listeners).remove(host)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

/// The process-global hub that `memory://` hosts resolve against.
pub fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Idle,
    Connected,
    Closed,
}

/// Session-side end of an in-memory connection.
struct MemoryTransport {
    // ---
    base: TransportBase,
    link: Arc<Link>,
    calls: mpsc::UnboundedSender<TransportEvent>,
    state: Mutex<ConnState>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn connect(&self) -> Result<EventInbox> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if *state != ConnState::Idle {
            return Err(SessionError::Transport(format!(
                "{}: connect() called twice",
                self.host()
            )));
        }

        let (tx, rx) = mpsc::channel(self.base.inbox_capacity.max(1));
        *lock_ignore_poison(&self.link.inbound) = Some(tx);
        *state = ConnState::Connected;

        log_debug!("{}: memory transport connected", self.host());
        Ok(EventInbox { inbox: rx })
    }

    async fn emit(&self, event: TransportEvent) -> Result<()> {
        // ---
        let connected = *lock_ignore_poison(&self.state) == ConnState::Connected;
        if !connected || self.link.dropped.load(Ordering::SeqCst) {
            return Err(SessionError::Transport(format!(
                "{}: not connected",
                self.host()
            )));
        }

        self.calls
            .send(event)
            .map_err(|_| SessionError::Transport(format!("{}: peer gone", self.host())))?;
        self.link.emitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        let previous = {
            let mut state = lock_ignore_poison(&self.state);
            std::mem::replace(&mut *state, ConnState::Closed)
        };

        if previous == ConnState::Connected {
            log_debug!("{}: closing memory transport", self.host());
            self.link.tear_down().await;
        }
        Ok(())
    }
}

/// Remote end of an in-memory connection.
///
/// Plays the server: reads the calls a session emits and answers them with
/// `reply`/`error` envelopes, pushes `signal` events, or drops the
/// connection.
///
/// # Testing Only
///
/// Exposed for tests and demos. Production code connects to a real endpoint.
pub struct MemoryPeer {
    // ---
    host: String,
    calls: mpsc::UnboundedReceiver<TransportEvent>,
    link: Arc<Link>,
}

impl MemoryPeer {
    /// Host name this peer is bound to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether a transport has connected and neither side has hung up.
    pub fn is_connected(&self) -> bool {
        !self.link.dropped.load(Ordering::SeqCst) && self.link.inbound_sender().is_some()
    }

    /// Total number of events the session side has emitted so far.
    pub fn calls_emitted(&self) -> usize {
        self.link.emitted.load(Ordering::SeqCst)
    }

    /// Wait for the next call envelope.
    ///
    /// Returns `None` once the session side has closed. Events that are not
    /// well-formed calls are skipped.
    pub async fn next_call(&mut self) -> Option<CallEnvelope> {
        // ---
        while let Some(event) = self.calls.recv().await {
            if let Some(call) = Self::parse_call(event) {
                return Some(call);
            }
        }
        None
    }

    /// Take the next call envelope if one is already queued.
    pub fn try_next_call(&mut self) -> Option<CallEnvelope> {
        // ---
        while let Ok(event) = self.calls.try_recv() {
            if let Some(call) = Self::parse_call(event) {
                return Some(call);
            }
        }
        None
    }

    fn parse_call(event: TransportEvent) -> Option<CallEnvelope> {
        // ---
        if &*event.name != events::CALL {
            log_warn!("memory peer: ignoring outbound event `{}`", event.name);
            return None;
        }

        match serde_json::from_value(event.payload) {
            Ok(call) => Some(call),
            Err(_err) => {
                log_warn!("memory peer: malformed call envelope: {_err}");
                None
            }
        }
    }

    /// Send any named event to the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if no session is connected.
    pub async fn send_event(&self, event: TransportEvent) -> Result<()> {
        // ---
        let sender = self
            .link
            .inbound_sender()
            .filter(|_| !self.link.dropped.load(Ordering::SeqCst))
            .ok_or_else(|| SessionError::Transport(format!("{}: not connected", self.host)))?;

        sender
            .send(event)
            .await
            .map_err(|_| SessionError::Transport(format!("{}: session gone", self.host)))
    }

    /// Resolve call `id` successfully.
    pub async fn reply(&self, id: CorrelationId, result: Value) -> Result<()> {
        self.send_event(TransportEvent::new(
            events::REPLY,
            json!({ "idm": id, "result": result }),
        ))
        .await
    }

    /// Resolve call `id` as failed.
    pub async fn error(&self, id: CorrelationId, error: Value) -> Result<()> {
        self.send_event(TransportEvent::new(
            events::ERROR,
            json!({ "idm": id, "result": error }),
        ))
        .await
    }

    /// Publish one occurrence of a signal.
    pub async fn signal(
        &self,
        object_name: &str,
        signal_name: &str,
        link_name: &str,
        data: Value,
    ) -> Result<()> {
        // ---
        self.send_event(TransportEvent::new(
            events::SIGNAL,
            json!({
                "result": { "obj": object_name, "signal": signal_name, "link": link_name, "data": data }
            }),
        ))
        .await
    }

    /// Drop the connection from the remote side.
    pub async fn disconnect(&self) {
        self.link.tear_down().await;
    }
}

/// Create an in-memory transport connected through the process-global hub.
///
/// # Errors
///
/// Returns [`SessionError::Transport`] if no peer is bound at `config.host`.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create an in-memory transport connected through `hub`.
///
/// # Errors
///
/// Returns [`SessionError::Transport`] if no peer is bound at `config.host`.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport", config.host);

    let listener = hub.accept(&config.host).ok_or_else(|| {
        SessionError::Transport(format!("connection refused: nothing bound at {}", config.host))
    })?;

    let transport = MemoryTransport {
        base: TransportBase::from(&config),
        link: listener.link,
        calls: listener.calls,
        state: Mutex::new(ConnState::Idle),
    };

    Ok(Arc::new(transport))
}
