use std::sync::Arc;

use serde_json::Value;

use super::{ListenerHandle, Session, SessionListener};
use crate::{Result, ServiceModule};

/// The capability set of a session.
///
/// Anything that wraps a [`Session`] (logging, metrics, fault injection)
/// implements this trait by delegation. A wrapper must forward every
/// operation unchanged, must forward listener registration rather than
/// re-broadcasting events itself, and must keep `dispose` idempotent
/// across the whole composition.
///
/// Opening is not part of the capability set; wrappers are built around a
/// session that is already open.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    // ---
    /// Endpoint the session talks to.
    fn host(&self) -> &str;

    /// Whether `dispose` has been called.
    fn is_disposed(&self) -> bool;

    async fn call_function(
        &self,
        object_name: &str,
        method_name: &str,
        args: Vec<Value>,
    ) -> Result<Value>;

    async fn load_service(&self, service_name: &str) -> Result<ServiceModule>;

    async fn register_event(&self, object_name: &str, signal_name: &str) -> Result<String>;

    async fn unregister_event(
        &self,
        object_name: &str,
        signal_name: &str,
        link_name: &str,
    ) -> Result<()>;

    async fn dispose(&self) -> Result<()>;

    fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle;

    fn remove_listener(&self, handle: ListenerHandle) -> bool;
}

#[async_trait::async_trait]
impl SessionApi for Session {
    // ---
    fn host(&self) -> &str {
        Session::host(self)
    }

    fn is_disposed(&self) -> bool {
        Session::is_disposed(self)
    }

    async fn call_function(
        &self,
        object_name: &str,
        method_name: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        Session::call_function(self, object_name, method_name, args).await
    }

    async fn load_service(&self, service_name: &str) -> Result<ServiceModule> {
        Session::load_service(self, service_name).await
    }

    async fn register_event(&self, object_name: &str, signal_name: &str) -> Result<String> {
        Session::register_event(self, object_name, signal_name).await
    }

    async fn unregister_event(
        &self,
        object_name: &str,
        signal_name: &str,
        link_name: &str,
    ) -> Result<()> {
        Session::unregister_event(self, object_name, signal_name, link_name).await
    }

    async fn dispose(&self) -> Result<()> {
        Session::dispose(self).await
    }

    fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        Session::add_listener(self, listener)
    }

    fn remove_listener(&self, handle: ListenerHandle) -> bool {
        Session::remove_listener(self, handle)
    }
}
