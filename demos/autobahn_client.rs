//! Drives this crate against the Autobahn|Testsuite fuzzing server
//! (`wstest -m fuzzingserver`), the same conformance harness §8 of this
//! crate's specification is validated against. Every case is a plain
//! echo: read a message, send it back unchanged, until the server closes.
//!
//! Permessage-deflate and the other Autobahn extension cases are out of
//! scope (this client never negotiates extensions), so only the base
//! framing/fragmentation/UTF-8/close-handshake cases are expected to pass.
//!
//! ```text
//! cargo run --example autobahn_client
//! ```

use log::{error, info};

use rfc6455_ws::config::DialOptions;
use rfc6455_ws::dial::dial;
use rfc6455_ws::error::Result;
use rfc6455_ws::message::Message;
use rfc6455_ws::status::StatusCode;

const AGENT: &str = "rfc6455-ws";
const SERVER: &str = "ws://127.0.0.1:9001";

async fn run_case(case: u32) -> Result<()> {
    info!("running case {case}");
    let url = format!("{SERVER}/runCase?case={case}&agent={AGENT}");
    let mut connection = dial(&url, &DialOptions::default()).await?;

    while let Some(message) = connection.recv().await {
        let reply = match message {
            Message::Text(text) => connection.send_text(text).await?,
            Message::Binary(data) => connection.send_binary(data).await?,
        };
        reply.await.map_err(|_| rfc6455_ws::error::Error::ConnectionClosed)??;
    }

    Ok(())
}

async fn get_case_count() -> Result<u32> {
    let url = format!("{SERVER}/getCaseCount");
    let mut connection = dial(&url, &DialOptions::default()).await?;

    let count = match connection.recv().await {
        Some(Message::Text(text)) => text.parse::<u32>().expect("case count wasn't a number"),
        _ => panic!("server didn't report a case count"),
    };

    connection.close(StatusCode::NORMAL_CLOSURE, "").await?;
    Ok(count)
}

async fn update_reports() -> Result<()> {
    info!("requesting report generation");
    let url = format!("{SERVER}/updateReports?agent={AGENT}");
    let connection = dial(&url, &DialOptions::default()).await?;
    connection.close(StatusCode::NORMAL_CLOSURE, "").await
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let total = get_case_count().await.expect("couldn't reach fuzzing server");
    info!("{total} cases to run");

    for case in 1..=total {
        if let Err(e) = run_case(case).await {
            error!("case {case} failed: {e}");
        }
    }

    update_reports().await.expect("failed to request report generation");
}
