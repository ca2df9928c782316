use crate::error::Error;

/// The six opcodes a conforming client needs to understand. Values 3-7 and
/// 11-15 are reserved by RFC 6455 and are rejected on receipt rather than
/// represented as a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    /// A human-readable name, mostly useful in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Continuation => "continuation",
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

/// A single frame as read off (or about to be written to) the wire. Unlike a
/// `Message`, a `Frame` may be one piece of a larger fragmented message.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { fin, opcode, payload }
    }
}

/// The maximum control-frame payload allowed by the RFC.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Validates a just-read frame header against the rules in RFC 6455 §5.2 and
/// §5.4, given whether a fragmented message is currently in progress.
///
/// This is deliberately a pure function (no I/O) so the header-validity table
/// can be exercised directly by unit tests instead of only through a live
/// socket.
pub fn validate_header(
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    fin: bool,
    payload_len: usize,
    fragment_in_progress: bool,
) -> Result<(), Error> {
    if rsv1 || rsv2 || rsv3 {
        return Err(Error::RSVNotZero);
    }

    if opcode.is_control() {
        if !fin {
            return Err(Error::ControlFramesFragmented);
        }
        if payload_len > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFramePayloadSize);
        }
        return Ok(());
    }

    match opcode {
        OpCode::Continuation if !fragment_in_progress => Err(Error::InvalidContinuationFrame),
        OpCode::Text | OpCode::Binary if fragment_in_progress => {
            Err(Error::InvalidFrameFragmentation)
        }
        _ => Ok(()),
    }
}

/// Encodes the minimal payload-length prefix for `len`, with the MASK bit
/// (0x80) already set in the leading length byte — every frame this crate
/// writes is a masked client frame.
pub fn encode_masked_length(len: u64) -> Vec<u8> {
    if len <= 125 {
        vec![0x80 | len as u8]
    } else if len <= u16::MAX as u64 {
        let mut out = vec![0x80 | 126u8];
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out
    } else {
        let mut out = vec![0x80 | 127u8];
        out.extend_from_slice(&len.to_be_bytes());
        out
    }
}

/// XORs `payload` in place with `key`, cycling the key every 4 bytes. Calling
/// this twice with the same key restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Builds the complete wire representation of a single, unfragmented,
/// masked client frame. `key` is taken as a parameter (rather than generated
/// here) so tests can assert on deterministic output; production call sites
/// draw it from a CSPRNG.
pub fn encode_client_frame(opcode: OpCode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | opcode.as_u8());
    out.extend_from_slice(&encode_masked_length(payload.len() as u64));
    out.extend_from_slice(&key);

    let mut masked = payload.to_vec();
    apply_mask(&mut masked, key);
    out.extend_from_slice(&masked);
    out
}
