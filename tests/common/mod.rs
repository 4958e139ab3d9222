// tests/common/mod.rs
//
// Shared helpers for integration tests. Each test gets its own hub so
// parallel tests never see each other's endpoints.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

use mom_session::{
    // ---
    create_memory_transport_with_hub,
    CallEnvelope,
    MemoryHub,
    MemoryPeer,
    Session,
    SessionConfig,
};

/// Upper bound for anything a test expects to happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Await `fut`, failing the test if it takes longer than [`PATIENCE`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(PATIENCE, fut)
        .await
        .expect("timed out waiting for result")
}

/// Open a session on a fresh hub and return it with its remote peer.
pub async fn connect(host: &str) -> (Session, MemoryPeer) {
    connect_with(SessionConfig::new(host)).await
}

pub async fn connect_with(config: SessionConfig) -> (Session, MemoryPeer) {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let peer = hub.bind(config.host.clone()).expect("bind failed");
    let transport = create_memory_transport_with_hub(config.transport_config(), hub)
        .await
        .expect("failed to create memory transport");

    let session = Session::with_transport(transport, config)
        .await
        .expect("failed to open session");

    (session, peer)
}

/// Wait for the next call, failing the test if none arrives.
pub async fn expect_call(peer: &mut MemoryPeer) -> CallEnvelope {
    within(peer.next_call())
        .await
        .expect("session closed before sending a call")
}

/// Poll `cond` until it holds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    within(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// A directory lookup result for a module.
pub fn module_metadata(name: &str, methods: &[&str], signals: &[&str]) -> Value {
    // ---
    let index = |names: &[&str]| -> Value {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ((i + 100).to_string(), json!(n)))
            .collect::<serde_json::Map<_, _>>()
            .into()
    };

    json!({
        "pyobject": name,
        "metaobject": { "methods": index(methods), "signals": index(signals) }
    })
}

/// Answer the directory lookup the session is about to send.
pub async fn serve_load(peer: &mut MemoryPeer, name: &str, methods: &[&str], signals: &[&str]) {
    // ---
    let call = expect_call(peer).await;
    assert_eq!(call.params.obj, "ServiceDirectory");
    assert_eq!(call.params.method, "service");
    assert_eq!(call.params.args, vec![json!(name)]);

    peer.reply(call.idm, module_metadata(name, methods, signals))
        .await
        .expect("reply failed");
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
