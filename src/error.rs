use std::io;
use std::string::FromUtf8Error;

use httparse::Error as HttpParseError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::time::error::Elapsed;
use url::ParseError;

use crate::connection::WriteRequest;

#[derive(Error, Debug)]
pub enum Error {
    // Sender / Receiver errors
    #[error("{source}")]
    SendError {
        #[from]
        source: SendError<WriteRequest>,
    },

    // General errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("TLS error: {0}")]
    TlsError(String),

    // Handshake / dial errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("Invalid scheme in WebSocket URL: `{0}` (expected ws/wss/http/https)")]
    InvalidSchemeURL(String),

    #[error("URL has no host")]
    URLNoHost,

    #[error("too many redirects while dialing")]
    TooManyRedirects,

    #[error("server didn't upgrade the connection (status {0})")]
    NoUpgrade(u16),

    #[error("Upgrade header missing or not equal to \"websocket\"")]
    NoUpgradeHeaderPresent,

    #[error("Connection header missing or not equal to \"Upgrade\"")]
    NoConnectionHeaderPresent,

    #[error("server didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: HttpParseError,
    },

    #[error("malformed HTTP response during handshake: {0}")]
    MalformedResponse(String),

    // Framing errors
    #[error("RSV not zero")]
    RSVNotZero,

    #[error("unknown opcode: {0}")]
    InvalidOpcode(u8),

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame with invalid payload size, can't be greater than 125")]
    ControlFramePayloadSize,

    // Fragmentation errors
    #[error("invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    #[error("connection is already closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
