// src/session/mod.rs
//! Session: the correlation hub.
//!
//! A [`Session`] owns one transport connection and turns its event stream
//! into call/response and subscribe/unsubscribe semantics.
//!
//! # Architecture
//!
//! On open, the session connects the transport and spawns a receive loop
//! over its inbox. Every outbound call gets a fresh correlation id and a
//! oneshot channel in the pending table; the loop resolves that channel
//! when the matching `reply` or `error` arrives, or aborts every
//! outstanding channel when the connection is lost. `signal` events bypass
//! the pending table and go to the [`SignalRegistry`].
//!
//! # Concurrency
//!
//! Any number of calls may be outstanding at once, from any number of
//! tasks. Each waits on its own channel; the receive loop never blocks on
//! a caller. The pending table and signal registry are each behind a
//! short-lived mutex that is never held across an `.await`.
//!
//! # Ordering
//!
//! Inbound events are handled strictly in arrival order by a single loop.
//! If a reply and a disconnect race, whichever the transport delivered
//! first decides the outcome: a reply already in the inbox ahead of the
//! disconnect resolves its call successfully.

mod api;
mod listener;
mod pending;

pub use api::SessionApi;
pub use listener::{ListenerHandle, SessionListener};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time;

use crate::correlation::IdGenerator;
use crate::lock::lock_ignore_poison;
use crate::protocol::{events, reply_id, reply_result, CallEnvelope, SignalEvent};
use crate::service::{ServiceModule, SERVICE_DIRECTORY};
use crate::signal::{SignalKey, SignalRegistry, SignalStream};
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    CorrelationId,
    EventInbox,
    Result,
    SessionBuilder,
    SessionConfig,
    SessionError,
    TransportEvent,
    TransportPtr,
};
use listener::ListenerRegistry;
use pending::{Outcome, PendingRequests};

/// An open session.
///
/// Cheap to clone (internally `Arc`-backed); every clone is the same
/// session. Service modules and signal streams hold only a weak reference,
/// so the connection lives as long as some `Session` handle does.
///
/// Dropping the last handle without [`dispose`](Self::dispose) stops the
/// receive loop and closes the transport in the background, provided a
/// Tokio runtime is still running.
///
/// # Example
///
/// ```no_run
/// use mom_session::Session;
/// use serde_json::json;
///
/// # async fn example() -> mom_session::Result<()> {
/// let session = Session::open("memory://robot").await?;
///
/// let tts = session.load_service("ALTextToSpeech").await?;
/// tts.invoke("say", vec![json!("Hello.")]).await?;
///
/// session.dispose().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host())
            .field("disposed", &self.is_disposed())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Non-owning reference to a session.
#[derive(Clone)]
pub(crate) struct WeakSession(Weak<Inner>);

impl WeakSession {
    pub fn upgrade(&self) -> Option<Session> {
        self.0.upgrade().map(|inner| Session { inner })
    }
}

pub(crate) struct Inner {
    // ---
    config: SessionConfig,
    transport: TransportPtr,
    ids: IdGenerator,
    pending: Mutex<PendingRequests>,
    signals: SignalRegistry,
    listeners: ListenerRegistry,
    disposed: AtomicBool,

    /// Receive loop. Aborted when the last handle goes away.
    rx_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        if let Some(task) = lock_ignore_poison(&self.rx_task).take() {
            task.abort();
        }

        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        // Best effort: closing needs a runtime to run on.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let transport = self.transport.clone();
                let _host = self.config.host.clone();
                runtime.spawn(async move {
                    if let Err(_err) = transport.close().await {
                        log_warn!("{_host}: transport close on drop failed: {_err}");
                    }
                });
            }
            Err(_) => {
                log_warn!(
                    "{}: session dropped outside a runtime, transport left open",
                    self.config.host
                );
            }
        }
    }
}

/// Removes a pending entry when the waiting call goes away, whatever the
/// reason: resolution, timeout, send failure, or a dropped future.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingRequests>,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_ignore_poison(self.pending).remove(&self.id);
    }
}

impl Session {
    // ---

    /// Open a session to `host` with default settings.
    ///
    /// Sugar for `SessionBuilder::new().host(host).build()`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if no transport can be created
    /// for `host`.
    pub async fn open(host: impl Into<String>) -> Result<Self> {
        SessionBuilder::new().host(host).build().await
    }

    /// Open a session over an explicitly provided transport.
    ///
    /// Connects the transport and starts the receive loop. Returns once the
    /// connection attempt has been issued.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the transport refuses to connect.
    pub async fn with_transport(transport: TransportPtr, config: SessionConfig) -> Result<Self> {
        // ---
        let EventInbox { mut inbox } = transport.connect().await?;

        log_info!("{}: session opened", config.host);

        let inner = Arc::new(Inner {
            config,
            transport,
            ids: IdGenerator::new(),
            pending: Mutex::new(PendingRequests::new()),
            signals: SignalRegistry::new(),
            listeners: ListenerRegistry::new(),
            disposed: AtomicBool::new(false),
            rx_task: Mutex::new(None),
        });

        // Weak: the loop must never keep the session alive.
        let weak = Arc::downgrade(&inner);
        let rx_task = tokio::spawn(async move {
            // ---
            loop {
                match inbox.recv().await {
                    Some(event) => match weak.upgrade() {
                        Some(inner) => inner.handle_event(event),
                        None => break,
                    },
                    None => {
                        log_debug!("transport inbox closed");
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_disconnect();
                        }
                        break;
                    }
                }
            }
        });
        *lock_ignore_poison(&inner.rx_task) = Some(rx_task);

        Ok(Self { inner })
    }

    /// Endpoint this session talks to.
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Whether the transport has reported connection loss.
    pub fn is_disconnected(&self) -> bool {
        lock_ignore_poison(&self.inner.pending).is_disconnected()
    }

    /// Number of calls currently waiting for a reply.
    pub fn pending_count(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Call `method_name` on the remote object `object_name`.
    ///
    /// Waits until the call is resolved. With no timeout configured that
    /// wait is unbounded: it ends only on a reply, an error, or a disconnect.
    ///
    /// Returns the full reply envelope (`{"idm": .., "result": ..}`).
    ///
    /// # Errors
    ///
    /// - `SessionClosed` - the session was disposed; nothing was sent
    /// - `Disconnected` - the connection was lost before or while waiting
    /// - `CallFailed` - the server answered with an error envelope
    /// - `Timeout` - a configured timeout expired
    /// - `Transport` - the transport refused the outbound event
    pub async fn call_function(
        &self,
        object_name: &str,
        method_name: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        // ---
        self.inner
            .call(object_name, method_name, args, self.inner.config.request_timeout)
            .await
    }

    /// Like [`call_function`](Self::call_function), bounded by `timeout`
    /// regardless of the session-wide setting.
    pub async fn call_function_with_timeout(
        &self,
        object_name: &str,
        method_name: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.inner
            .call(object_name, method_name, args, Some(timeout))
            .await
    }

    /// Look up `service_name` in the service directory and wrap the
    /// result in a [`ServiceModule`] bound to this session.
    ///
    /// # Errors
    ///
    /// As [`call_function`](Self::call_function), except that an error
    /// envelope surfaces as `LoadServiceFailed`. Malformed metadata is
    /// `InvalidResponse`.
    pub async fn load_service(&self, service_name: &str) -> Result<ServiceModule> {
        // ---
        let reply = self
            .call_function(SERVICE_DIRECTORY, "service", vec![json!(service_name)])
            .await
            .map_err(|err| match err {
                SessionError::CallFailed {
                    id, error_payload, ..
                } => SessionError::LoadServiceFailed {
                    id,
                    service_name: service_name.to_string(),
                    error_payload,
                },
                other => other,
            })?;

        ServiceModule::from_metadata(self, &reply)
    }

    /// Ask the server to start sending `signal_name` events of
    /// `object_name`. Returns the link token it assigned.
    pub async fn register_event(&self, object_name: &str, signal_name: &str) -> Result<String> {
        // ---
        let reply = self
            .call_function(object_name, "registerEvent", vec![json!(signal_name)])
            .await?;

        match reply_result(&reply)? {
            Value::String(link) => Ok(link.clone()),
            Value::Number(link) => Ok(link.to_string()),
            other => Err(SessionError::InvalidResponse(format!(
                "registerEvent returned {other}, expected a link name"
            ))),
        }
    }

    /// Ask the server to stop sending events for `link_name`.
    pub async fn unregister_event(
        &self,
        object_name: &str,
        signal_name: &str,
        link_name: &str,
    ) -> Result<()> {
        // ---
        self.call_function(
            object_name,
            "unregisterEvent",
            vec![json!(signal_name), json!(link_name)],
        )
        .await?;
        Ok(())
    }

    /// Register for `signal_name` on `object_name` and stream its payloads.
    ///
    /// The stream is keyed by the link the server returns, so it only sees
    /// signals processed after the `registerEvent` reply. A signal the server
    /// pushes for the new link before that point is dropped.
    ///
    /// # Errors
    ///
    /// As [`register_event`](Self::register_event), plus:
    /// - `DuplicateSubscription` if the server handed out a link that is
    ///   already live locally
    /// - `Disconnected` / `SessionClosed` if the connection was lost or the
    ///   session disposed while waiting for the link
    pub async fn observe_signal(
        &self,
        object_name: &str,
        signal_name: &str,
    ) -> Result<SignalStream> {
        // ---
        let link_name = self.register_event(object_name, signal_name).await?;
        let key = SignalKey::new(object_name, signal_name, link_name);

        let (handle, inbox) = self
            .inner
            .signals
            .subscribe(key)
            .map_err(|err| self.inner.closed_or(err))?;
        log_debug!("{}: subscribed to {}", self.host(), handle.key());

        Ok(SignalStream::new(handle, inbox, self.downgrade()))
    }

    /// Close the transport.
    ///
    /// Idempotent: later calls return `Ok(())` without doing anything.
    /// Calls issued afterwards fail with `SessionClosed`. Calls already
    /// waiting are not aborted here; they resolve as `Disconnected` when
    /// the transport reports the connection loss, or normally if their
    /// reply was already delivered.
    pub async fn dispose(&self) -> Result<()> {
        // ---
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        log_info!("{}: disposing session", self.host());

        self.inner.signals.clear();
        self.inner.transport.close().await.map_err(|err| {
            log_error!("{}: transport close failed: {err}", self.host());
            err
        })
    }

    /// Register an observer for this session's traffic.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        self.inner.listeners.add(listener)
    }

    /// Unregister an observer. Returns false if the handle was unknown.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.listeners.remove(handle)
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    pub(crate) fn signals(&self) -> &SignalRegistry {
        &self.inner.signals
    }
}

impl Inner {
    // ---

    async fn call(
        &self,
        object_name: &str,
        method_name: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        // ---
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SessionError::SessionClosed);
        }

        let id = self.ids.next_id();
        let rx = lock_ignore_poison(&self.pending).register(id)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let envelope = CallEnvelope::new(id, object_name, method_name, args);
        let payload = serde_json::to_value(&envelope)?;

        log_debug!(
            "{}: call {id} {object_name}.{method_name}",
            self.config.host
        );
        self.listeners.notify(|l| l.on_call_sent(&payload));
        self.transport
            .emit(TransportEvent::call(payload))
            .await
            .map_err(|err| self.closed_or(err))?;

        let outcome = match timeout {
            Some(duration) => time::timeout(duration, rx)
                .await
                .map_err(|_| SessionError::Timeout { id })?,
            None => rx.await,
        };

        match outcome {
            Ok(Outcome::Reply(payload)) => Ok(payload),
            Ok(Outcome::Error(error_payload)) => Err(SessionError::CallFailed {
                id,
                object_name: envelope.params.obj,
                method_name: envelope.params.method,
                args: envelope.params.args,
                error_payload,
            }),
            // A dropped sender means the table was torn down with the session.
            Ok(Outcome::Disconnected) | Err(_) => Err(SessionError::Disconnected),
        }
    }

    /// `SessionClosed` if the session was disposed in the meantime,
    /// otherwise `err`.
    fn closed_or(&self, err: SessionError) -> SessionError {
        if self.disposed.load(Ordering::SeqCst) {
            SessionError::SessionClosed
        } else {
            err
        }
    }

    fn handle_event(&self, event: TransportEvent) {
        // ---
        let result = match &*event.name {
            events::REPLY => self.handle_resolution(event.payload, false),
            events::ERROR => self.handle_resolution(event.payload, true),
            events::SIGNAL => self.handle_signal(&event.payload),
            events::DISCONNECT => {
                self.handle_disconnect();
                Ok(())
            }
            _other => {
                log_debug!("{}: ignoring inbound event `{_other}`", self.config.host);
                Ok(())
            }
        };

        if let Err(_err) = result {
            log_warn!(
                "{}: malformed `{}` event: {_err}",
                self.config.host,
                event.name
            );
        }
    }

    fn handle_resolution(&self, payload: Value, failed: bool) -> Result<()> {
        // ---
        let id = reply_id(&payload)?;

        let outcome = if failed {
            self.listeners.notify(|l| l.on_error(id, &payload));
            Outcome::Error(payload)
        } else {
            self.listeners.notify(|l| l.on_reply(id, &payload));
            Outcome::Reply(payload)
        };

        if !lock_ignore_poison(&self.pending).resolve(id, outcome) {
            log_debug!("{}: no pending request for id {id}", self.config.host);
        }
        Ok(())
    }

    fn handle_signal(&self, payload: &Value) -> Result<()> {
        // ---
        let event = SignalEvent::from_payload(payload)?;
        self.listeners.notify(|l| l.on_signal(&event));
        self.signals.dispatch(event);
        Ok(())
    }

    fn handle_disconnect(&self) {
        // ---
        let _aborted = {
            let mut pending = lock_ignore_poison(&self.pending);
            if pending.is_disconnected() {
                return;
            }
            pending.abort_all()
        };

        let _dropped = self.signals.clear();
        log_info!(
            "{}: disconnected, {_aborted} pending call(s) aborted, {_dropped} subscription(s) dropped",
            self.config.host
        );

        self.listeners.notify(|l| l.on_disconnect());
    }
}
