//! A client-only, RFC 6455 WebSocket implementation on top of Tokio.
//!
//! This crate implements the parts of [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455)
//! a conforming client needs: the opening handshake, base framing, fragmentation
//! and defragmentation, control-frame handling, masking, and the closing
//! handshake. On top of that single-connection [`connection::Connection`] sits
//! [`client::Client`], a long-lived, self-healing wrapper that multiplexes a
//! single logical message stream over one *or momentarily two* connections,
//! so a caller like a Slack Socket Mode listener can be preemptively migrated
//! off a connection nearing its server-side timeout without dropping a
//! message.
//!
//! It does not implement the server role, permessage-deflate or any other
//! extension, subprotocol negotiation, or fragmented outbound messages - see
//! the crate's `SPEC_FULL.md` for the full scope.
//!
//! ```no_run
//! use rfc6455_ws::config::DialOptions;
//! use rfc6455_ws::dial::dial;
//!
//! # async fn run() -> rfc6455_ws::error::Result<()> {
//! let mut connection = dial("ws://127.0.0.1:9001/", &DialOptions::default()).await?;
//! while let Some(message) = connection.recv().await {
//!     println!("{message:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod dial;
pub mod error;
pub mod frame;
pub mod message;
pub mod request;
pub mod status;
pub mod stream;
pub(crate) mod utils;
