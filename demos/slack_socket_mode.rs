//! Sketches how Timpani's Slack Socket Mode listener uses the `Client`
//! wrapper: a URL-producer that mints a fresh `wss://` Socket Mode URL
//! (normally via `apps.connections.open`, stubbed here to keep this demo
//! self-contained), a `refresh_in` call scheduled well before Slack's
//! documented connection lifetime, and a loop that acknowledges every
//! inbound envelope by its `envelope_id`.
//!
//! ```text
//! SLACK_APP_TOKEN=xapp-... cargo run --example slack_socket_mode
//! ```

use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use futures::future::BoxFuture;

use rfc6455_ws::client::{Client, UrlProducer};
use rfc6455_ws::config::DialOptions;
use rfc6455_ws::message::Message;

/// How long before Slack's ~1-hour Socket Mode connection timeout we
/// preemptively refresh, so the handoff always lands on a healthy primary.
const REFRESH_BEFORE_TIMEOUT: Duration = Duration::from_secs(50 * 60);

#[derive(Debug, Deserialize)]
struct SocketModeEnvelope {
    envelope_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct Ack<'a> {
    envelope_id: &'a str,
}

/// Would normally call Slack's `apps.connections.open` REST endpoint with
/// `SLACK_APP_TOKEN` and return the single-use `wss://` URL it hands back;
/// that REST call is out of this crate's scope (§1), so this demo reads the
/// URL straight out of an env var instead.
async fn mint_socket_mode_url() -> rfc6455_ws::error::Result<String> {
    match std::env::var("SLACK_SOCKET_MODE_URL") {
        Ok(url) => Ok(url),
        Err(_) => {
            warn!("SLACK_SOCKET_MODE_URL not set; no app token wiring in this demo");
            Err(rfc6455_ws::error::Error::URLNoHost)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let url_fn: UrlProducer = std::sync::Arc::new(|| -> BoxFuture<'static, rfc6455_ws::error::Result<String>> {
        Box::pin(mint_socket_mode_url())
    });
    let client = match Client::new_or_cached("slack-socket-mode", url_fn, DialOptions::default()).await {
        Ok(client) => client,
        Err(e) => {
            error!("failed to open Socket Mode connection: {e}");
            return;
        }
    };

    client.refresh_in(REFRESH_BEFORE_TIMEOUT);

    while let Some(message) = client.recv().await {
        let Message::Text(text) = message else {
            warn!("ignoring unexpected binary Socket Mode frame");
            continue;
        };

        let envelope: SocketModeEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("ignoring malformed Socket Mode envelope: {e}");
                continue;
            }
        };

        info!("dispatching envelope {}", envelope.envelope_id);
        let ack = Ack {
            envelope_id: &envelope.envelope_id,
        };
        if let Err(e) = client.send_json(&ack).await {
            error!("failed to ack envelope {}: {e}", envelope.envelope_id);
        }
    }
}
