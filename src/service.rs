//! Service modules.
//!
//! A [`ServiceModule`] is a handle to one remote module, built from the
//! metadata the service directory returns for it. It knows the module's
//! invocable method names and subscribable signal names, and forwards
//! calls and subscriptions to the session that loaded it.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::protocol::reply_result;
use crate::session::WeakSession;
use crate::{Result, Session, SessionError, SignalStream};

/// Well-known object that resolves service names to module metadata.
pub const SERVICE_DIRECTORY: &str = "ServiceDirectory";

/// Handle to a remote module.
///
/// Holds only a weak reference to its session: once every [`Session`]
/// handle is dropped, operations fail with `SessionClosed`. Immutable after
/// construction.
#[derive(Clone)]
pub struct ServiceModule {
    // ---
    name: String,
    session: WeakSession,
    method_names: BTreeSet<String>,
    signal_names: BTreeSet<String>,
}

impl ServiceModule {
    /// Build a module from a directory lookup reply.
    ///
    /// Expects:
    ///
    /// ```text
    /// result.pyobject             -> module name
    /// result.metaobject.methods   -> { <id>: <method name>, .. }
    /// result.metaobject.signals   -> { <id>: <signal name>, .. }
    /// ```
    ///
    /// The numeric keys are server-internal and discarded. A value may also
    /// be an object with a `name` member.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidResponse`] if any of these is missing
    /// or has the wrong type.
    pub fn from_metadata(session: &Session, reply: &Value) -> Result<Self> {
        // ---
        let result = reply_result(reply)?;

        let name = result
            .get("pyobject")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::InvalidResponse("metadata without `pyobject`".into()))?;

        let meta = result
            .get("metaobject")
            .ok_or_else(|| SessionError::InvalidResponse("metadata without `metaobject`".into()))?;

        Ok(Self {
            name: name.to_string(),
            session: session.downgrade(),
            method_names: member_names(meta, "methods")?,
            signal_names: member_names(meta, "signals")?,
        })
    }

    /// Name the server assigned to this module.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_names(&self) -> &BTreeSet<String> {
        &self.method_names
    }

    pub fn signal_names(&self) -> &BTreeSet<String> {
        &self.signal_names
    }

    pub fn has_method(&self, method_name: &str) -> bool {
        self.method_names.contains(method_name)
    }

    pub fn has_signal(&self, signal_name: &str) -> bool {
        self.signal_names.contains(signal_name)
    }

    /// The session this module was loaded from.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the session has been dropped.
    pub fn session(&self) -> Result<Session> {
        self.session.upgrade().ok_or(SessionError::SessionClosed)
    }

    /// Call `method_name` on this module. The method set is not consulted.
    pub async fn invoke(&self, method_name: &str, args: Vec<Value>) -> Result<Value> {
        self.session()?
            .call_function(&self.name, method_name, args)
            .await
    }

    /// Call `method_name` if this module advertises it.
    ///
    /// For an unknown method, returns an empty JSON object without touching
    /// the transport.
    pub async fn try_invoke(&self, method_name: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        if !self.has_method(method_name) {
            return Ok(Value::Object(Map::new()));
        }
        self.invoke(method_name, args).await
    }

    /// Subscribe to `signal_name` on this module. The signal set is not
    /// consulted.
    ///
    /// Signals pushed before the server's `registerEvent` reply has been
    /// processed are not seen; see [`Session::observe_signal`].
    pub async fn observe_signal(&self, signal_name: &str) -> Result<SignalStream> {
        self.session()?
            .observe_signal(&self.name, signal_name)
            .await
    }

    /// Subscribe to `signal_name` if this module advertises it.
    ///
    /// For an unknown signal, returns an already-finished stream without
    /// contacting the server.
    pub async fn try_observe_signal(&self, signal_name: &str) -> Result<SignalStream> {
        // ---
        if !self.has_signal(signal_name) {
            return Ok(SignalStream::empty());
        }
        self.observe_signal(signal_name).await
    }
}

impl fmt::Debug for ServiceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceModule")
            .field("name", &self.name)
            .field("methods", &self.method_names)
            .field("signals", &self.signal_names)
            .finish()
    }
}

fn member_names(meta: &Value, field: &str) -> Result<BTreeSet<String>> {
    // ---
    let map = meta.get(field).and_then(Value::as_object).ok_or_else(|| {
        SessionError::InvalidResponse(format!("metaobject without `{field}` map"))
    })?;

    map.values()
        .map(|v| {
            let name = match v {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("name").and_then(Value::as_str),
                _ => None,
            };
            name.map(str::to_string).ok_or_else(|| {
                SessionError::InvalidResponse(format!("`{field}` entry is not a name: {v}"))
            })
        })
        .collect()
}
