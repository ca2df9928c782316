use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::config::NonceSource;

/// The GUID RFC 6455 §1.3 has the server concatenate with the client's nonce
/// before hashing, to prove the peer actually understood the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` value a conforming server must echo
/// back for a given `Sec-WebSocket-Key`.
pub(crate) fn expected_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Generates a fresh 16-byte nonce for `Sec-WebSocket-Key`, base64-encoded.
/// Uses the OS CSPRNG directly (rather than `rand::thread_rng`) since this
/// only runs once per dial, not on every frame. `source`, when given,
/// overrides the CSPRNG so tests can assert on a deterministic
/// `Sec-WebSocket-Accept`.
pub(crate) fn generate_websocket_key(source: Option<&NonceSource>) -> String {
    let bytes = match source {
        Some(source) => source(),
        None => {
            let mut bytes = [0u8; 16];
            OsRng.fill_bytes(&mut bytes);
            bytes
        }
    };
    BASE64_STANDARD.encode(bytes)
}

/// Hashes a caller-supplied cache identifier down to a stable, fixed-width
/// key for the process-wide `Client` map (§4.6). SHA-256 rather than SHA-1
/// since this has nothing to do with the handshake accept computation and
/// deserves its own, unrelated hash function.
pub(crate) fn sha256_hex(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hex_encode(hasher.finalize().as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}
