//! Dials a plain echo server and exchanges a handful of messages, printing
//! whatever comes back. Point this at the `tests/` fake echo server, or at
//! any RFC 6455-conforming echo endpoint.
//!
//! ```text
//! cargo run --example echo_client -- ws://127.0.0.1:9002/
//! ```

use rfc6455_ws::config::DialOptions;
use rfc6455_ws::dial::dial;
use rfc6455_ws::message::Message;
use rfc6455_ws::status::StatusCode;

#[tokio::main]
async fn main() {
    env_logger::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:9002/".into());

    let mut connection = match dial(&url, &DialOptions::default()).await {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("handshake failed: {e}");
            return;
        }
    };

    for i in 0..3 {
        let text = format!("hello #{i}");
        match connection.send_text(text.clone()).await {
            Ok(reply) => {
                if let Err(e) = reply.await.unwrap_or(Ok(())) {
                    eprintln!("send failed: {e}");
                    break;
                }
            }
            Err(e) => {
                eprintln!("connection closed before send: {e}");
                break;
            }
        }

        match connection.recv().await {
            Some(Message::Text(text)) => println!("received: {text}"),
            Some(Message::Binary(data)) => println!("received {} binary bytes", data.len()),
            None => {
                println!("connection closed by peer");
                return;
            }
        }
    }

    if let Err(e) = connection.close(StatusCode::NORMAL_CLOSURE, "done").await {
        eprintln!("error while closing: {e}");
    }
}
