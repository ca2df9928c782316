//! Translates a `ws`/`wss` URL into an HTTP/1.1 upgrade request, and parses
//! the server's response back into a handshake verdict. Turned around to
//! face the client side of the handshake: we build the request and parse
//! the *response*, not the other way around.

use url::Url;

use crate::error::{Error, Result};

/// Everything needed to open the transport and address the handshake request
/// at a single `ws`/`wss` endpoint, already resolved from one hop of a
/// possibly-redirected dial.
#[derive(Debug, Clone)]
pub struct DialTarget {
    pub host: String,
    pub port: u16,
    /// The `Host:` header value: omits the port when it's the scheme default,
    /// matching what most servers expect.
    pub request_host_field: String,
    pub path: String,
    pub use_tls: bool,
}

/// Parses a `ws://`/`wss://` (or `http(s)://`, treated identically) URL into
/// a `DialTarget`.
pub fn parse_ws_url(url: &str) -> Result<DialTarget> {
    let parsed = Url::parse(url)?;

    let (default_port, use_tls) = match parsed.scheme() {
        "ws" | "http" => (80, false),
        "wss" | "https" => (443, true),
        other => return Err(Error::InvalidSchemeURL(other.to_string())),
    };

    let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
    let port = parsed.port().unwrap_or(default_port);

    let request_host_field = match parsed.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.clone(),
    };

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok(DialTarget {
        host,
        port,
        request_host_field,
        path,
        use_tls,
    })
}

/// Builds the raw HTTP/1.1 GET upgrade request for `target`, with `key` as
/// the `Sec-WebSocket-Key` nonce and any caller-supplied extra headers
/// appended last.
pub fn build_request(target: &DialTarget, key: &str, extra_headers: &[(String, String)]) -> Vec<u8> {
    let mut request = format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n",
        target.path, target.request_host_field, key,
    );

    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");

    request.into_bytes()
}

#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses an HTTP response out of `buf`. Returns the parsed response and how
/// many bytes of `buf` the headers occupied, so the caller can treat
/// whatever follows as the start of the WebSocket byte stream.
pub fn parse_response(buf: &[u8]) -> Result<(HandshakeResponse, usize)> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);

    let consumed = match response.parse(buf)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            return Err(Error::MalformedResponse("incomplete HTTP response".into()))
        }
    };

    let status = response
        .code
        .ok_or_else(|| Error::MalformedResponse("missing status code".into()))?;

    let headers = response
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok((HandshakeResponse { status, headers }, consumed))
}

/// Validates a parsed handshake response against RFC 6455 §4.1: status 101,
/// case-insensitive `Upgrade: websocket` and `Connection: Upgrade`, and a
/// `Sec-WebSocket-Accept` matching what we expect from our nonce.
pub fn validate_handshake(response: &HandshakeResponse, expected_accept: &str) -> Result<()> {
    if response.status != 101 {
        return Err(Error::NoUpgrade(response.status));
    }

    let upgrade_ok = response
        .header("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        return Err(Error::NoUpgradeHeaderPresent);
    }

    let connection_ok = response
        .header("connection")
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    if !connection_ok {
        return Err(Error::NoConnectionHeaderPresent);
    }

    let accept_ok = response
        .header("sec-websocket-accept")
        .map(|v| v == expected_accept)
        .unwrap_or(false);
    if !accept_ok {
        return Err(Error::InvalidAcceptKey);
    }

    Ok(())
}

/// Is this a redirect we should follow? 3xx with a `Location` header.
pub fn redirect_location(response: &HandshakeResponse) -> Option<&str> {
    if (300..400).contains(&response.status) {
        response.header("location")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ws_url_with_default_port() {
        let target = parse_ws_url("ws://example.com/socket?a=1").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
        assert_eq!(target.request_host_field, "example.com");
        assert_eq!(target.path, "/socket?a=1");
        assert!(!target.use_tls);
    }

    #[test]
    fn parses_wss_url_with_explicit_port() {
        let target = parse_ws_url("wss://example.com:9443/socket").unwrap();
        assert_eq!(target.port, 9443);
        assert_eq!(target.request_host_field, "example.com:9443");
        assert!(target.use_tls);
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        assert!(matches!(
            parse_ws_url("ftp://example.com/"),
            Err(Error::InvalidSchemeURL(_))
        ));
    }

    #[test]
    fn builds_request_with_required_headers() {
        let target = parse_ws_url("ws://example.com/chat").unwrap();
        let request = build_request(&target, "dGhlIHNhbXBsZSBub25jZQ==", &[]);
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn validates_successful_handshake() {
        let response = HandshakeResponse {
            status: 101,
            headers: vec![
                ("Upgrade".into(), "websocket".into()),
                ("Connection".into(), "Upgrade".into()),
                (
                    "Sec-WebSocket-Accept".into(),
                    "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".into(),
                ),
            ],
        };
        assert!(validate_handshake(&response, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").is_ok());
    }

    #[test]
    fn rejects_wrong_accept_key() {
        let response = HandshakeResponse {
            status: 101,
            headers: vec![
                ("Upgrade".into(), "websocket".into()),
                ("Connection".into(), "Upgrade".into()),
                ("Sec-WebSocket-Accept".into(), "wrong".into()),
            ],
        };
        assert!(matches!(
            validate_handshake(&response, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            Err(Error::InvalidAcceptKey)
        ));
    }

    #[test]
    fn detects_redirect() {
        let response = HandshakeResponse {
            status: 302,
            headers: vec![("Location".into(), "wss://other.example.com/chat".into())],
        };
        assert_eq!(
            redirect_location(&response),
            Some("wss://other.example.com/chat")
        );
    }
}
