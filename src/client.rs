//! The self-healing, process-wide cached client wrapper (§4.6). Where
//! `Connection` is a single live channel with no opinions about reconnecting,
//! `Client` is the long-lived handle a consumer actually keeps: it owns a
//! relay task that drains whichever `Connection` is current, redials with
//! retry on an unexpected loss, and supports a zero-gap handoff to a fresh
//! `Connection` via `refresh_in`. Grounded on the teacher's long-lived
//! connection wrapper, generalized with the process-wide cache and
//! URL-producer indirection Slack Socket Mode needs (a Socket Mode URL
//! embeds a single-use token and must be re-minted on every redial).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::DialOptions;
use crate::connection::ConnectionHandle;
use crate::dial::dial;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::status::StatusCode;
use crate::utils::sha256_hex;

/// Re-invoked on every dial attempt (initial, redial, and refresh), since a
/// Socket Mode URL carries a single-use token that must be re-minted each
/// time. Boxed rather than `async-trait`'d: this is a bare closure type, not
/// an object with multiple methods.
pub type UrlProducer = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Starting delay for the redial backoff; doubled on each consecutive
/// failure up to `REDIAL_BACKOFF_CAP`. Not prescribed by the base
/// specification - see DESIGN.md's Open Question decision.
const REDIAL_BACKOFF_BASE: Duration = Duration::from_millis(250);
const REDIAL_BACKOFF_CAP: Duration = Duration::from_secs(30);

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const STANDBY_CHANNEL_CAPACITY: usize = 1;

static CLIENTS: Lazy<DashMap<String, Arc<Client>>> = Lazy::new(DashMap::new);

/// A long-lived, self-healing WebSocket handle. Looked up by an
/// application-chosen `id` (hashed into the process-wide cache key), so
/// repeated calls for "the same logical connection" - e.g. the same Slack
/// team's Socket Mode session - share one relay and one transport.
pub struct Client {
    primary: Mutex<ConnectionHandle>,
    standby_tx: mpsc::Sender<(ConnectionHandle, mpsc::Receiver<Message>)>,
    outbound_rx: Mutex<mpsc::Receiver<Message>>,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
    url_fn: UrlProducer,
    opts: DialOptions,
}

impl Client {
    /// Returns the `Client` cached under `id`, dialing and inserting one if
    /// none exists yet. On a lost compare-and-swap race the loser's fresh
    /// connection is closed with GoingAway and the winner already in the map
    /// is returned instead (§4.6 Cache).
    pub async fn new_or_cached(id: &str, url_fn: UrlProducer, opts: DialOptions) -> Result<Arc<Client>> {
        let key = sha256_hex(id);

        if let Some(existing) = CLIENTS.get(&key) {
            return Ok(existing.clone());
        }

        let url = url_fn().await?;
        let connection = dial(&url, &opts).await?;
        let (inbound_rx, handle) = connection.into_parts();

        let (standby_tx, standby_rx) = mpsc::channel(STANDBY_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let client = Arc::new(Client {
            primary: Mutex::new(handle),
            standby_tx,
            outbound_rx: Mutex::new(outbound_rx),
            refresh_handle: Mutex::new(None),
            url_fn: url_fn.clone(),
            opts: opts.clone(),
        });

        match CLIENTS.entry(key) {
            Entry::Occupied(occupied) => {
                log::info!("lost Client cache race for id hash; closing duplicate connection");
                let handle = client.primary.lock().await;
                let _ = handle.close(StatusCode::GOING_AWAY, "duplicate client").await;
                Ok(occupied.get().clone())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(client.clone());
                tokio::spawn(relay_loop(client.clone(), inbound_rx, standby_rx, outbound_tx));
                Ok(client)
            }
        }
    }

    /// The next inbound data message relayed from whichever Connection is
    /// currently live. `None` once the Client has been permanently torn down
    /// (never under normal redial/refresh operation).
    pub async fn recv(&self) -> Option<Message> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Serializes `value` to JSON and sends it as a Text frame on the
    /// primary connection, awaiting the per-call write result.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let text = String::from_utf8(bytes).expect("serde_json always emits valid UTF-8");
        let reply = self.primary.lock().await.send_text(text).await?;
        reply.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends `data` as a Binary frame on the primary connection; mirrors
    /// `send_json`.
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let reply = self.primary.lock().await.send_binary(data).await?;
        reply.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Starts (or resets) a single timer. On fire, dials a secondary
    /// Connection, stores it as standby, then closes the primary with
    /// GoingAway so the relay task promotes standby with no observable gap
    /// (§4.6 Refresh).
    pub fn refresh_in(self: &Arc<Self>, delay: Duration) {
        let client = self.clone();
        let new_handle = tokio::spawn(async move {
            sleep(delay).await;
            client.fire_refresh().await;
        });

        let client = self.clone();
        tokio::spawn(async move {
            let mut guard = client.refresh_handle.lock().await;
            if let Some(previous) = guard.take() {
                previous.abort();
            }
            *guard = Some(new_handle);
        });
    }

    async fn fire_refresh(self: Arc<Self>) {
        log::info!("connection refresh starting");
        let url = match (self.url_fn)().await {
            Ok(url) => url,
            Err(e) => {
                log::error!("refresh dial aborted: url producer failed: {e}");
                return;
            }
        };

        let standby = match dial(&url, &self.opts).await {
            Ok(connection) => connection,
            Err(e) => {
                log::error!("refresh dial failed: {e}");
                return;
            }
        };

        let (standby_rx, standby_handle) = standby.into_parts();
        if self.standby_tx.send((standby_handle, standby_rx)).await.is_err() {
            log::error!("refresh dial succeeded but relay task is gone");
            return;
        }

        let primary = self.primary.lock().await;
        if let Err(e) = primary.close(StatusCode::GOING_AWAY, "refreshing connection").await {
            log::error!("failed to close primary during refresh: {e}");
        }
        log::info!("connection refresh fired; primary closing, standby queued");
    }
}

/// Drains `current_rx` onto `outbound_tx` for as long as the Client lives.
/// When `current_rx` closes, promotes a queued standby if one is already
/// waiting, otherwise redials with endless retry and bounded exponential
/// backoff (§4.6 Relay).
async fn relay_loop(
    client: Arc<Client>,
    mut current_rx: mpsc::Receiver<Message>,
    mut standby_rx: mpsc::Receiver<(ConnectionHandle, mpsc::Receiver<Message>)>,
    outbound_tx: mpsc::Sender<Message>,
) {
    loop {
        match current_rx.recv().await {
            Some(message) => {
                if outbound_tx.send(message).await.is_err() {
                    return;
                }
            }
            None => {
                if let Ok((handle, rx)) = standby_rx.try_recv() {
                    log::info!("connection replacement succeeded: promoted standby");
                    *client.primary.lock().await = handle;
                    current_rx = rx;
                    continue;
                }

                let (handle, rx) = redial_with_retry(&client).await;
                *client.primary.lock().await = handle;
                current_rx = rx;
            }
        }
    }
}

/// Redials forever, doubling the backoff delay on each failed attempt up to
/// `REDIAL_BACKOFF_CAP`, until a connection succeeds.
async fn redial_with_retry(client: &Arc<Client>) -> (ConnectionHandle, mpsc::Receiver<Message>) {
    let mut attempt: u32 = 0;
    let mut delay = REDIAL_BACKOFF_BASE;

    loop {
        attempt += 1;
        let url = match (client.url_fn)().await {
            Ok(url) => url,
            Err(e) => {
                log::error!("redial attempt {attempt} aborted: url producer failed: {e}");
                sleep(delay).await;
                delay = (delay * 2).min(REDIAL_BACKOFF_CAP);
                continue;
            }
        };

        match dial(&url, &client.opts).await {
            Ok(connection) => {
                log::info!("redial attempt {attempt} succeeded");
                return connection.into_parts();
            }
            Err(e) => {
                log::error!("redial attempt {attempt} failed: {e}");
                sleep(delay).await;
                delay = (delay * 2).min(REDIAL_BACKOFF_CAP);
            }
        }
    }
}
