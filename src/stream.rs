//! Unifies a plain `TcpStream` and a `rustls`-backed TLS stream behind a
//! single `AsyncRead + AsyncWrite` type, so the rest of the dial path never
//! has to branch on scheme again once the transport is established:
//! `ws://` dials `Plain`, `wss://` dials `Tls`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pki_types::ServerName;
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::error::Error;

pub enum SocketStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// `rustls` 0.23 requires a process-wide default `CryptoProvider` before any
/// `ClientConfig` can be built. Installs the `ring` backend once; later calls
/// (or a provider installed independently by the embedding application) are
/// both fine since `install_default` simply fails quietly if one is already set.
fn ensure_crypto_provider_installed() {
    static INSTALLED: std::sync::Once = std::sync::Once::new();
    INSTALLED.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl SocketStream {
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(SocketStream::Plain(stream))
    }

    pub async fn connect_tls(host: &str, port: u16) -> Result<Self, Error> {
        ensure_crypto_provider_installed();

        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::TlsError(format!("invalid DNS name: {host}")))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::TlsError(e.to_string()))?;

        Ok(SocketStream::Tls(Box::new(tls_stream)))
    }

    /// Dispatches to `connect_plain`/`connect_tls` based on the scheme bit
    /// resolved from the dialed URL.
    pub async fn connect(host: &str, port: u16, use_tls: bool) -> Result<Self, Error> {
        if use_tls {
            Self::connect_tls(host, port).await
        } else {
            Self::connect_plain(host, port).await
        }
    }
}

impl AsyncRead for SocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
