//! A bare-bones RFC 6455 server, just enough to script the scenarios in
//! this crate's specification §8 without depending on the real Autobahn
//! suite being installed. Lives under `tests/support/` (a module, not its
//! own test binary) so every integration test file can share it.

use base64::prelude::*;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Binds an ephemeral local port and returns its `ws://` URL plus the
/// listener, so callers can `tokio::spawn` their own accept-and-script loop
/// around `accept_handshake`.
pub async fn listen() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("ws://{addr}/"), listener)
}

/// Accepts one connection and completes the server side of the opening
/// handshake, returning the now-upgraded socket.
pub async fn accept_one(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_handshake(&mut stream).await;
    stream
}

async fn accept_handshake(stream: &mut TcpStream) {
    let request = read_until_blank_line(stream).await;

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Request::new(&mut headers);
    parsed.parse(&request).unwrap();

    let key = parsed
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|h| String::from_utf8_lossy(h.value).into_owned())
        .expect("client request carried no Sec-WebSocket-Key");

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let accept = BASE64_STANDARD.encode(hasher.finalize());

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

async fn read_until_blank_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.unwrap();
        assert_ne!(n, 0, "client closed before completing the handshake request");
        buf.push(byte[0]);
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            return buf;
        }
    }
}

/// Writes one unmasked server->client frame with the given FIN bit.
pub async fn write_frame(stream: &mut TcpStream, fin: bool, opcode: u8, payload: &[u8]) {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(if fin { 0x80 } else { 0x00 } | opcode);

    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);

    stream.write_all(&out).await.unwrap();
    stream.flush().await.unwrap();
}

/// Writes a masked frame, as if a (misbehaving) server had set MASK=1 -
/// used only to drive scenario S5, which asserts a client rejects this.
pub async fn write_masked_frame(stream: &mut TcpStream, opcode: u8, payload: &[u8]) {
    let key = [0x11u8, 0x22, 0x33, 0x44];
    let mut masked = payload.to_vec();
    for (i, byte) in masked.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }

    let mut out = vec![0x80 | opcode];
    let len = payload.len();
    assert!(len <= 125, "test helper only handles small masked payloads");
    out.push(0x80 | len as u8);
    out.extend_from_slice(&key);
    out.extend_from_slice(&masked);

    stream.write_all(&out).await.unwrap();
    stream.flush().await.unwrap();
}

/// Reads one client->server frame (always masked) and returns
/// `(fin, opcode, unmasked payload)`.
pub async fn read_frame(stream: &mut TcpStream) -> (bool, u8, Vec<u8>) {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();

    let fin = header[0] & 0x80 != 0;
    let opcode = header[0] & 0x0F;
    let masked = header[1] & 0x80 != 0;
    assert!(masked, "every client frame must be masked");

    let mut len = (header[1] & 0x7F) as u64;
    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext).await.unwrap();
        len = u16::from_be_bytes(ext) as u64;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext).await.unwrap();
        len = u64::from_be_bytes(ext);
    }

    let mut key = [0u8; 4];
    stream.read_exact(&mut key).await.unwrap();

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.unwrap();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }

    (fin, opcode, payload)
}

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;
