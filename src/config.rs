//! Client-side dial configuration. The teacher's `ServerConfig`/`ClientConfig`
//! split collapses into a single `DialOptions` here, since this crate never
//! plays the server role.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::stream::SocketStream;

/// Frame/message size ceilings, enforced before any payload-length-driven
/// allocation happens. Defaults mirror the teacher's: generous enough for
/// Socket Mode's JSON payloads, small enough to bound a misbehaving peer.
#[derive(Debug, Clone)]
pub struct WebSocketLimits {
    pub max_frame_size: usize,
    pub max_message_size: usize,
}

impl Default for WebSocketLimits {
    fn default() -> Self {
        WebSocketLimits {
            max_frame_size: 16 << 20,
            max_message_size: 64 << 20,
        }
    }
}

/// A pluggable transport for the initial HTTP upgrade request, so callers can
/// route the handshake through a proxy or an instrumented client instead of
/// this crate's own bare TCP/TLS dial. Most dials never need one; the default
/// is the crate's own `SocketStream::connect_plain`/`connect_tls`.
///
/// The connected stream is handed back rather than response bytes, since the
/// same transport keeps carrying WebSocket frames once the upgrade completes
/// - there is no hand-off the way a one-shot HTTP client would do it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn connect(&self, host: &str, port: u16, tls: bool) -> Result<SocketStream>;
}

/// Called after a 3xx response during the handshake, with the `Location`
/// header value, before the next hop is dialed. Returns the (possibly
/// rewritten) URL to follow; runs after the built-in ws->http/wss->https
/// scheme translation, so it only needs to handle anything beyond that.
/// Returning `Err` aborts the redirect chain.
pub type RedirectHook = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Produces the 16 raw bytes behind `Sec-WebSocket-Key`. The default dial
/// path draws these from the OS CSPRNG; tests inject a fixed source so the
/// expected `Sec-WebSocket-Accept` is deterministic.
pub type NonceSource = Arc<dyn Fn() -> [u8; 16] + Send + Sync>;

#[derive(Clone)]
pub struct DialOptions {
    /// Extra headers sent with the initial upgrade request, e.g. `Authorization`.
    pub headers: Vec<(String, String)>,
    pub limits: WebSocketLimits,
    /// Overrides the bare TCP/TLS connect this crate otherwise performs for
    /// the handshake.
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub redirect_hook: Option<RedirectHook>,
    pub max_redirects: u8,
    pub connect_timeout: Duration,
    pub nonce_source: Option<NonceSource>,
}

impl Default for DialOptions {
    fn default() -> Self {
        DialOptions {
            headers: Vec::new(),
            limits: WebSocketLimits::default(),
            http_client: None,
            redirect_hook: None,
            max_redirects: 5,
            connect_timeout: Duration::from_secs(10),
            nonce_source: None,
        }
    }
}

impl std::fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialOptions")
            .field("headers", &self.headers)
            .field("limits", &self.limits)
            .field("http_client", &self.http_client.is_some())
            .field("redirect_hook", &self.redirect_hook.is_some())
            .field("max_redirects", &self.max_redirects)
            .field("connect_timeout", &self.connect_timeout)
            .field("nonce_source", &self.nonce_source.is_some())
            .finish()
    }
}
