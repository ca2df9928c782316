//! The live RFC 6455 channel: frame I/O, masking, defragmentation, the
//! control-frame responder and the closing handshake. Grounded on the
//! teacher's `read.rs`/`write.rs` split (one task owns the read half and
//! assembles messages, another owns the write half and is the single writer
//! of the transport) but generalized from the server's accept path to the
//! client's dial path, and from the teacher's direct socket access to the
//! channel-mediated design this crate's spec calls for (§4.3, §4.4, §4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::sleep;

use crate::config::WebSocketLimits;
use crate::error::{Error, Result};
use crate::frame::{encode_masked_length, validate_header, OpCode};
use crate::message::Message;
use crate::status::{sanitize_close, StatusCode};

/// A single request enqueued on the write serializer (§4.4): either a data
/// or control frame, or a directive to tear down the transport once the
/// closing handshake has completed in both directions.
pub(crate) enum WriteRequest {
    Frame {
        opcode: OpCode,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// The send/close half of a `Connection`, independent of the inbound message
/// channel and cheap to clone. The `Client` cache (§4.6) hands this around on
/// its own so a relay task can own a connection's `Receiver<Message>`
/// exclusively while `send_json`/`refresh_in` still reach the same transport.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    write_tx: mpsc::Sender<WriteRequest>,
    close_sent: Arc<Mutex<bool>>,
    close_received: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Sends a Text data frame, returning a channel the caller can await for
    /// the per-call write result (§4.4, §4.7).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<oneshot::Receiver<Result<()>>> {
        enqueue_frame(&self.write_tx, OpCode::Text, text.into().into_bytes()).await
    }

    /// Sends a Binary data frame; mirrors `send_text`.
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<oneshot::Receiver<Result<()>>> {
        enqueue_frame(&self.write_tx, OpCode::Binary, data.into()).await
    }

    /// Initiates (or no-ops on a repeat of) the closing handshake, per §4.5.
    pub async fn close(&self, status: StatusCode, reason: &str) -> Result<()> {
        send_close(
            &self.write_tx,
            &self.close_sent,
            &self.close_received,
            &self.torn_down,
            status,
            reason,
        )
        .await
    }

    /// `close_received ∧ close_sent`.
    pub fn is_closed(&self) -> bool {
        self.close_received.load(Ordering::SeqCst) && self.close_sent_snapshot()
    }

    /// `close_received ∨ close_sent`.
    pub fn is_closing(&self) -> bool {
        self.close_received.load(Ordering::SeqCst) || self.close_sent_snapshot()
    }

    fn close_sent_snapshot(&self) -> bool {
        self.close_sent.try_lock().map(|guard| *guard).unwrap_or(true)
    }
}

/// One live WebSocket channel. Owns the inbound message channel and a handle
/// to the write serializer; the read loop and write serializer themselves
/// run as detached tasks for as long as the transport stays open.
pub struct Connection {
    inbound: mpsc::Receiver<Message>,
    handle: ConnectionHandle,
}

const INBOUND_CHANNEL_CAPACITY: usize = 64;
const WRITE_CHANNEL_CAPACITY: usize = 64;

impl Connection {
    /// Wires a freshly upgraded transport (already split into its read and
    /// write halves) into a live `Connection`, spawning the read loop and
    /// write serializer. Generic over the half types so tests can drive a
    /// `tokio::io::duplex` pair instead of a real socket.
    pub(crate) fn spawn<R, W>(read_half: R, write_half: W, limits: WebSocketLimits) -> Connection
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
        let close_sent = Arc::new(Mutex::new(false));
        let close_received = Arc::new(AtomicBool::new(false));
        let torn_down = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(write_half, write_rx));
        tokio::spawn(read_loop(
            read_half,
            inbound_tx,
            write_tx.clone(),
            close_sent.clone(),
            close_received.clone(),
            torn_down.clone(),
            limits,
        ));

        Connection {
            inbound: inbound_rx,
            handle: ConnectionHandle {
                write_tx,
                close_sent,
                close_received,
                torn_down,
            },
        }
    }

    /// Waits for the next defragmented, validated inbound `Message`. Returns
    /// `None` once the connection has closed - cleanly or otherwise.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Sends a Text data frame, returning a channel the caller can await for
    /// the per-call write result (§4.4, §4.7).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<oneshot::Receiver<Result<()>>> {
        self.handle.send_text(text).await
    }

    /// Sends a Binary data frame; mirrors `send_text`.
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<oneshot::Receiver<Result<()>>> {
        self.handle.send_binary(data).await
    }

    /// Initiates (or no-ops on a repeat of) the closing handshake, per §4.5.
    pub async fn close(&self, status: StatusCode, reason: &str) -> Result<()> {
        self.handle.close(status, reason).await
    }

    /// `close_received ∧ close_sent`.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// `close_received ∨ close_sent`.
    pub fn is_closing(&self) -> bool {
        self.handle.is_closing()
    }

    /// Splits this connection into its inbound message stream and a cheaply
    /// cloneable send/close handle, so the two can be owned by different
    /// tasks (§4.6's relay task keeps the receiver; the `Client` keeps the
    /// handle for `send_json`/`refresh_in`).
    pub(crate) fn into_parts(self) -> (mpsc::Receiver<Message>, ConnectionHandle) {
        (self.inbound, self.handle)
    }
}

async fn enqueue_frame(
    write_tx: &mpsc::Sender<WriteRequest>,
    opcode: OpCode,
    payload: Vec<u8>,
) -> Result<oneshot::Receiver<Result<()>>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    write_tx
        .send(WriteRequest::Frame {
            opcode,
            payload,
            reply: reply_tx,
        })
        .await
        .map_err(|_| Error::ConnectionClosed)?;
    Ok(reply_rx)
}

/// Shared by the public `Connection::close` and the read loop's reaction to
/// a received Close frame or a protocol/I/O fault (§4.5 entry points a/b/c).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn send_close(
    write_tx: &mpsc::Sender<WriteRequest>,
    close_sent: &Arc<Mutex<bool>>,
    close_received: &Arc<AtomicBool>,
    torn_down: &Arc<AtomicBool>,
    status: StatusCode,
    reason: &str,
) -> Result<()> {
    let mut sent = close_sent.lock().await;
    if *sent {
        return Ok(());
    }

    // Gives any frame already in flight time to land at the peer before we
    // close - a concession to deterministic conformance testing (§9).
    sleep(std::time::Duration::from_millis(1)).await;

    let (status, reason) = sanitize_close(status, reason);
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&status.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());

    log::debug!("sending close frame: {} ({})", status.as_u16(), status.name());
    let (reply_tx, reply_rx) = oneshot::channel();
    write_tx
        .send(WriteRequest::Frame {
            opcode: OpCode::Close,
            payload,
            reply: reply_tx,
        })
        .await
        .map_err(|_| Error::ConnectionClosed)?;
    let _ = reply_rx.await;

    *sent = true;
    if close_received.load(Ordering::SeqCst) {
        maybe_shutdown(write_tx, torn_down).await;
    }
    Ok(())
}

/// Sends the one-time `WriteRequest::Shutdown` once both close bits are set,
/// whichever side observes the second transition first.
async fn maybe_shutdown(write_tx: &mpsc::Sender<WriteRequest>, torn_down: &Arc<AtomicBool>) {
    if torn_down
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        let _ = write_tx.send(WriteRequest::Shutdown).await;
    }
}

/// One in-progress fragmented message: the opcode of its first frame and the
/// payload accumulated across continuations so far.
struct Accumulator {
    opcode: OpCode,
    data: Vec<u8>,
}

#[allow(clippy::too_many_arguments)]
async fn read_loop<R>(
    read_half: R,
    inbound_tx: mpsc::Sender<Message>,
    write_tx: mpsc::Sender<WriteRequest>,
    close_sent: Arc<Mutex<bool>>,
    close_received: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
    limits: WebSocketLimits,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(read_half);
    let mut accumulator: Option<Accumulator> = None;

    loop {
        let header = match read_header(&mut reader).await {
            Ok(Some(header)) => header,
            Ok(None) => {
                // EOF: the peer dropped the transport without (or after) a
                // close frame. Not an error - just end of stream (§4.3 step 1).
                close_received.store(true, Ordering::SeqCst);
                *close_sent.lock().await = true;
                return;
            }
            Err(_) => {
                let _ = send_close(
                    &write_tx,
                    &close_sent,
                    &close_received,
                    &torn_down,
                    StatusCode::INTERNAL_ERROR,
                    "frame header reading error",
                )
                .await;
                return;
            }
        };

        if header.payload_len as usize > limits.max_frame_size {
            let _ = send_close(
                &write_tx,
                &close_sent,
                &close_received,
                &torn_down,
                StatusCode::MESSAGE_TOO_BIG,
                "frame payload too big",
            )
            .await;
            return;
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        if reader.read_exact(&mut payload).await.is_err() {
            let _ = send_close(
                &write_tx,
                &close_sent,
                &close_received,
                &torn_down,
                StatusCode::INTERNAL_ERROR,
                "frame payload reading error",
            )
            .await;
            return;
        }

        let fragment_in_progress = accumulator.is_some();
        if let Err(e) = validate_header(
            header.rsv1,
            header.rsv2,
            header.rsv3,
            header.opcode,
            header.fin,
            payload.len(),
            fragment_in_progress,
        ) {
            let _ = send_close(
                &write_tx,
                &close_sent,
                &close_received,
                &torn_down,
                StatusCode::PROTOCOL_ERROR,
                &e.to_string(),
            )
            .await;
            return;
        }
        if header.masked {
            let _ = send_close(
                &write_tx,
                &close_sent,
                &close_received,
                &torn_down,
                StatusCode::PROTOCOL_ERROR,
                "server payloads must not be masked",
            )
            .await;
            return;
        }

        match header.opcode {
            OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                match accumulator.as_mut() {
                    Some(acc) => acc.data.extend_from_slice(&payload),
                    None => {
                        accumulator = Some(Accumulator {
                            opcode: header.opcode,
                            data: payload,
                        })
                    }
                }

                let size = accumulator.as_ref().map(|a| a.data.len()).unwrap_or(0);
                if size > limits.max_message_size {
                    let _ = send_close(
                        &write_tx,
                        &close_sent,
                        &close_received,
                        &torn_down,
                        StatusCode::MESSAGE_TOO_BIG,
                        "message payload too big",
                    )
                    .await;
                    return;
                }

                if header.fin {
                    let acc = accumulator.take().expect("just inserted above");
                    match Message::from_parts(acc.opcode, acc.data) {
                        Ok(message) => {
                            if inbound_tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => {
                            let _ = send_close(
                                &write_tx,
                                &close_sent,
                                &close_received,
                                &torn_down,
                                StatusCode::INVALID_DATA,
                                "invalid UTF-8 text",
                            )
                            .await;
                            return;
                        }
                    }
                }
            }
            OpCode::Close => {
                close_received.store(true, Ordering::SeqCst);
                let (status, reason) = parse_close_payload(&payload);
                log::info!("received close frame: {} ({})", status.as_u16(), status.name());
                let _ = send_close(&write_tx, &close_sent, &close_received, &torn_down, status, &reason).await;
                return;
            }
            OpCode::Ping => {
                log::debug!("responding to ping with {} byte payload", payload.len());
                let (reply_tx, _reply_rx) = oneshot::channel();
                if write_tx
                    .send(WriteRequest::Frame {
                        opcode: OpCode::Pong,
                        payload,
                        reply: reply_tx,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            OpCode::Pong => {
                // This client never sends unsolicited Pings, so an inbound
                // Pong carries nothing actionable; ignore it (§4.3 step 4).
            }
        }
    }
}

/// `{status, reason}` per the Close-payload parsing rules of §4.3 step 4:
/// empty -> NormalClosure/""; length 1 -> ProtocolError; length >= 2 -> first
/// two bytes big-endian plus a UTF-8 reason, forced to InvalidData if the
/// reason bytes are not valid UTF-8.
fn parse_close_payload(payload: &[u8]) -> (StatusCode, String) {
    match payload.len() {
        0 => (StatusCode::NORMAL_CLOSURE, String::new()),
        1 => (StatusCode::PROTOCOL_ERROR, String::new()),
        _ => {
            let status = StatusCode::from(u16::from_be_bytes([payload[0], payload[1]]));
            match String::from_utf8(payload[2..].to_vec()) {
                Ok(reason) => (status, reason),
                Err(_) => (StatusCode::INVALID_DATA, String::new()),
            }
        }
    }
}

struct RawHeader {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    masked: bool,
    payload_len: u64,
}

/// Reads one frame header (§4.2). Returns `Ok(None)` on a clean EOF at the
/// very first byte (the only place we treat EOF as "no more frames" rather
/// than a broken read).
async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<RawHeader>> {
    let mut first = [0u8; 1];
    let n = reader.read(&mut first).await?;
    if n == 0 {
        return Ok(None);
    }

    let mut second_byte = [0u8; 1];
    reader.read_exact(&mut second_byte).await?;
    let second = second_byte[0];

    let fin = first[0] & 0b1000_0000 != 0;
    let rsv1 = first[0] & 0b0100_0000 != 0;
    let rsv2 = first[0] & 0b0010_0000 != 0;
    let rsv3 = first[0] & 0b0001_0000 != 0;
    let opcode = OpCode::from_byte(first[0] & 0b0000_1111).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown opcode: {}", first[0] & 0b0000_1111),
        )
    })?;

    let masked = second & 0b1000_0000 != 0;
    let mut payload_len = (second & 0b0111_1111) as u64;

    if payload_len == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext).await?;
        payload_len = u16::from_be_bytes(ext) as u64;
    } else if payload_len == 127 {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext).await?;
        payload_len = u64::from_be_bytes(ext);
    }

    Ok(Some(RawHeader {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        masked,
        payload_len,
    }))
}

async fn write_loop<W>(write_half: W, mut write_rx: mpsc::Receiver<WriteRequest>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut writer = BufWriter::new(write_half);

    while let Some(command) = write_rx.recv().await {
        match command {
            WriteRequest::Frame { opcode, payload, reply } => {
                let result = write_frame(&mut writer, opcode, payload).await;
                let _ = reply.send(result);
            }
            WriteRequest::Shutdown => {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
}

/// Writes one unfragmented, always-masked client frame (§4.2). The payload
/// handed in is masked in place and un-masked again afterward (Invariant 6);
/// since the write channel moved it here by value there is no caller buffer
/// left to corrupt, but the round trip is still the cheapest way to avoid a
/// second allocation for the masked bytes.
async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut BufWriter<W>,
    opcode: OpCode,
    mut payload: Vec<u8>,
) -> Result<()> {
    let mut key = [0u8; 4];
    OsRng.fill_bytes(&mut key);

    writer.write_u8(0x80 | opcode.as_u8()).await?;
    writer
        .write_all(&encode_masked_length(payload.len() as u64))
        .await?;
    writer.write_all(&key).await?;

    crate::frame::apply_mask(&mut payload, key);
    writer.write_all(&payload).await?;
    crate::frame::apply_mask(&mut payload, key);

    writer.flush().await?;
    Ok(())
}
