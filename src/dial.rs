//! The handshake entry point (§4.1): scheme-normalize, generate a nonce,
//! issue the HTTP/1.1 Upgrade request, validate the response, and hand the
//! now-upgraded transport off to a `Connection`. Grounded on the teacher's
//! `handshake::perform_handshake`, turned around from the server's accept
//! side to the client's connect side, and composed with `request.rs` (URL
//! parsing, request building, response validation) and `stream.rs` (the
//! plain/TLS transport).

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::config::DialOptions;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::request::{build_request, parse_response, parse_ws_url, redirect_location, validate_handshake, DialTarget};
use crate::stream::SocketStream;
use crate::utils::{expected_accept, generate_websocket_key};

/// Diagnostic bodies attached to a failed handshake are capped at 1 KiB
/// (§4.1 step 5), so a chatty or malicious server can't balloon an error.
const MAX_DIAGNOSTIC_BODY: usize = 1024;

/// Opens a WebSocket `Connection` to `url`, following redirects and
/// performing the RFC 6455 opening handshake. `ws`/`http` dial a plain TCP
/// socket; `wss`/`https` additionally negotiate TLS (§4.1a).
pub async fn dial(url: &str, opts: &DialOptions) -> Result<Connection> {
    let mut target = parse_ws_url(url)?;

    for _ in 0..=opts.max_redirects {
        let key = generate_websocket_key(opts.nonce_source.as_ref());
        let request = build_request(&target, &key, &opts.headers);

        let stream = connect_transport(&target, opts).await?;
        let mut reader = BufReader::new(stream);

        timeout(opts.connect_timeout, reader.write_all(&request))
            .await
            .map_err(Error::from)??;
        reader.flush().await?;

        let header_bytes = timeout(opts.connect_timeout, read_http_headers(&mut reader))
            .await
            .map_err(Error::from)??;
        let (response, _consumed) = parse_response(&header_bytes)?;

        if let Some(location) = redirect_location(&response) {
            let next_url = translate_redirect(location, opts)?;
            log::debug!("handshake redirected to {next_url}");
            target = parse_ws_url(&next_url)?;
            continue;
        }

        let accept = expected_accept(&key);
        if let Err(e) = validate_handshake(&response, &accept) {
            return Err(augment_with_body(e, &header_bytes));
        }

        log::info!("websocket handshake completed ({}:{})", target.host, target.port);
        let (read_half, write_half) = tokio::io::split(reader);
        return Ok(Connection::spawn(read_half, write_half, opts.limits.clone()));
    }

    Err(Error::TooManyRedirects)
}

/// Connects the underlying transport for one hop: the caller-supplied
/// `HttpClient` if one was configured, otherwise this crate's own
/// TCP/TLS dial.
async fn connect_transport(target: &DialTarget, opts: &DialOptions) -> Result<SocketStream> {
    let connect = async {
        match &opts.http_client {
            Some(client) => client.connect(&target.host, target.port, target.use_tls).await,
            None => SocketStream::connect(&target.host, target.port, target.use_tls).await,
        }
    };
    timeout(opts.connect_timeout, connect).await.map_err(Error::from)?
}

/// Reads from `reader` until the blank line that ends an HTTP header block,
/// returning everything read so far (headers plus, if the server pipelined
/// more, a little bit of what follows - `parse_response` only consumes the
/// header portion and the rest stays buffered in `reader` for frame I/O).
async fn read_http_headers<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::MalformedResponse("connection closed during handshake".into()));
        }
        buf.push(byte[0]);
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            return Ok(buf);
        }
        if buf.len() > 64 * 1024 {
            return Err(Error::MalformedResponse("handshake response headers too large".into()));
        }
    }
}

/// Applies the built-in `ws`/`wss` -> `http`/`https` scheme translation to a
/// `Location` header value, then composes with the caller's redirect hook if
/// one was supplied (§4.1 step 4).
fn translate_redirect(location: &str, opts: &DialOptions) -> Result<String> {
    let translated = if let Some(rest) = location.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = location.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        location.to_string()
    };

    match &opts.redirect_hook {
        Some(hook) => hook(&translated),
        None => Ok(translated),
    }
}

fn augment_with_body(error: Error, header_bytes: &[u8]) -> Error {
    let body_preview = String::from_utf8_lossy(&header_bytes[..header_bytes.len().min(MAX_DIAGNOSTIC_BODY)]);
    Error::MalformedResponse(format!("{error}; response: {body_preview}"))
}
