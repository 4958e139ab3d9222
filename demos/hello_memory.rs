use futures::StreamExt;
use serde_json::{json, Value};

use mom_session::{global_hub, MemoryPeer, Result, Session, SERVICE_DIRECTORY};

/// A toy robot: one text-to-speech module that announces when it is done.
async fn serve(mut peer: MemoryPeer) {
    // ---
    while let Some(call) = peer.next_call().await {
        let params = &call.params;

        let result = match (params.obj.as_str(), params.method.as_str()) {
            (SERVICE_DIRECTORY, "service") => json!({
                "pyobject": "ALTextToSpeech",
                "metaobject": {
                    "methods": { "100": "say" },
                    "signals": { "200": "TextDone" }
                }
            }),
            ("ALTextToSpeech", "registerEvent") => json!("1"),
            ("ALTextToSpeech", "unregisterEvent") => Value::Null,
            ("ALTextToSpeech", "say") => {
                let text = params.args.first().cloned().unwrap_or(Value::Null);
                println!("robot says: {text}");
                let _ = peer.reply(call.idm, json!(true)).await;
                let _ = peer.signal("ALTextToSpeech", "TextDone", "1", text).await;
                continue;
            }
            (obj, method) => {
                let _ = peer
                    .error(call.idm, json!(format!("{obj}.{method}: no such method")))
                    .await;
                continue;
            }
        };

        let _ = peer.reply(call.idm, result).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let peer = global_hub().bind("memory://robot")?;
    tokio::spawn(serve(peer));

    let session = Session::open("memory://robot").await?;

    let tts = session.load_service("ALTextToSpeech").await?;
    println!("loaded {} with methods {:?}", tts.name(), tts.method_names());

    let mut done = tts.observe_signal("TextDone").await?;

    tts.invoke("say", vec![json!("Hello.")]).await?;
    if let Some(text) = done.next().await {
        println!("TextDone: {text}");
    }

    // Not advertised, so nothing is sent.
    let skipped = tts.try_invoke("dance", vec![]).await?;
    println!("dance -> {skipped}");

    done.unsubscribe().await?;
    session.dispose().await?;
    Ok(())
}
