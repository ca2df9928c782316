//! Close status codes, as assigned by RFC 6455 §7.4.

/// A close status code. Library-defined codes occupy 1000-1015;
/// 3000-3999 is reserved for registered applications/frameworks;
/// 4000-4999 is open for private use between cooperating applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const NORMAL_CLOSURE: StatusCode = StatusCode(1000);
    pub const GOING_AWAY: StatusCode = StatusCode(1001);
    pub const PROTOCOL_ERROR: StatusCode = StatusCode(1002);
    pub const UNSUPPORTED_DATA: StatusCode = StatusCode(1003);
    /// Never sent on the wire; reserved for local use when no close frame
    /// was actually received.
    pub const NOT_RECEIVED: StatusCode = StatusCode(1005);
    /// Never sent on the wire; reserved for local use when the transport
    /// dropped without a close handshake.
    pub const CLOSED_ABNORMALLY: StatusCode = StatusCode(1006);
    pub const INVALID_DATA: StatusCode = StatusCode(1007);
    pub const POLICY_VIOLATION: StatusCode = StatusCode(1008);
    pub const MESSAGE_TOO_BIG: StatusCode = StatusCode(1009);
    pub const MANDATORY_EXTENSION: StatusCode = StatusCode(1010);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(1011);
    pub const SERVICE_RESTART: StatusCode = StatusCode(1012);
    pub const TRY_AGAIN_LATER: StatusCode = StatusCode(1013);
    pub const BAD_GATEWAY: StatusCode = StatusCode(1014);
    /// Never sent on the wire; reserved for local use on TLS failures.
    pub const TLS_HANDSHAKE: StatusCode = StatusCode(1015);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// A short, log-friendly name for the known codes; falls back to the
    /// raw numeric value for application/private ranges.
    pub fn name(&self) -> String {
        match self.0 {
            1000 => "normal closure".into(),
            1001 => "going away".into(),
            1002 => "protocol error".into(),
            1003 => "unsupported data".into(),
            1005 => "not received".into(),
            1006 => "closed abnormally".into(),
            1007 => "invalid data".into(),
            1008 => "policy violation".into(),
            1009 => "message too big".into(),
            1010 => "mandatory extension".into(),
            1011 => "internal error".into(),
            1012 => "service restart".into(),
            1013 => "try again later".into(),
            1014 => "bad gateway".into(),
            1015 => "TLS handshake".into(),
            other => format!("status {other}"),
        }
    }
}

impl From<u16> for StatusCode {
    fn from(value: u16) -> Self {
        StatusCode(value)
    }
}

/// Codes that §4.5 forbids from appearing on the wire: either local-only
/// sentinels (1005, 1006, 1015), the reserved-but-unassigned 1004, or
/// anything outside the assigned ranges.
fn must_not_appear_on_wire(code: u16) -> bool {
    code < 1000
        || code == 1004
        || code == 1005
        || code == 1006
        || code == 1015
        || (code > 1015 && code < 3000)
}

/// Normalizes a close status/reason pair before it is sent: invalid codes
/// are rewritten to 1002 (Protocol Error) and the reason is truncated to
/// 123 bytes (125 minus the 2-byte status code, the RFC's control-frame
/// payload ceiling).
pub fn sanitize_close(status: StatusCode, reason: &str) -> (StatusCode, String) {
    let status = if must_not_appear_on_wire(status.0) {
        StatusCode::PROTOCOL_ERROR
    } else {
        status
    };

    let mut reason = reason.to_string();
    const MAX_REASON_BYTES: usize = 123;
    if reason.len() > MAX_REASON_BYTES {
        // Truncate on a char boundary so we never emit a partial UTF-8
        // sequence in the close payload.
        let mut cut = MAX_REASON_BYTES;
        while cut > 0 && !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }

    (status, reason)
}
