//! NetState datagram framing.
//!
//! One datagram carries one advertisement (or a goodbye for one). The
//! fixed header is a packed zerocopy struct; the variable-length service
//! type, service name and record follow it back to back. Every byte of the
//! header is part of the wire format.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Service identity ──────────────────────────────────────────────────────────

/// Service type under which every registration is advertised.
pub const SERVICE_TYPE: &str = "_netstate._udp";

/// Advertisement domain. Multicast announcements are link-local only.
pub const SERVICE_DOMAIN: &str = "local.";

/// Longest service name a peer will accept — one DNS label.
pub const MAX_SERVICE_NAME_LEN: usize = 63;

/// Largest record a frame may carry. Keeps a full frame inside one
/// Ethernet-sized datagram.
pub const MAX_RECORD_LEN: usize = 1300;

// ── Transport constants ───────────────────────────────────────────────────────

/// IPv6 link-local multicast address announcements are sent to.
pub const MULTICAST_ADDR: &str = "ff02::1";

/// Default UDP port for announcements.
pub const ANNOUNCE_PORT: u16 = 9300;

/// Default re-announcement interval in seconds.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 2;

/// Default peer TTL in seconds.
/// Advertisements not refreshed within this window are treated as removed.
pub const PEER_TTL_SECS: u64 = 10;

// ── Frame header ──────────────────────────────────────────────────────────────

/// Leading bytes of every NetState datagram.
pub const FRAME_MAGIC: [u8; 4] = *b"NSTA";

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Fixed header preceding every datagram body.
///
/// Wire size: 10 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Always `FRAME_MAGIC`. Anything else on the port is ignored.
    pub magic: [u8; 4],

    /// Frame format version. Unknown versions are dropped.
    pub version: u8,

    /// 0x01 = announce, 0x02 = goodbye.
    pub kind: u8,

    /// Length of the service type that follows the header.
    pub type_len: u8,

    /// Length of the service name that follows the service type.
    pub name_len: u8,

    /// Length of the record that follows the service name, little-endian.
    /// Zero for goodbyes.
    pub record_len: [u8; 2],
}

assert_eq_size!(FrameHeader, [u8; 10]);

/// Size of [`FrameHeader`] on the wire.
pub const FRAME_HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

/// What a frame announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// The advertisement is live; the record is its current content.
    Announce = 0x01,
    /// The advertisement has been withdrawn.
    Goodbye = 0x02,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Announce),
            0x02 => Ok(FrameKind::Goodbye),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(k: FrameKind) -> u8 {
        k as u8
    }
}

/// A decoded datagram, borrowing from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub service_type: &'a str,
    pub service_name: &'a str,
    pub record: &'a [u8],
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Build a datagram.
pub fn encode_frame(
    kind: FrameKind,
    service_type: &str,
    service_name: &str,
    record: &[u8],
) -> Result<Vec<u8>, FrameError> {
    if service_type.len() > u8::MAX as usize {
        return Err(FrameError::ServiceTypeTooLong(service_type.len()));
    }
    if service_name.len() > MAX_SERVICE_NAME_LEN {
        return Err(FrameError::NameTooLong(service_name.len()));
    }
    if record.len() > MAX_RECORD_LEN {
        return Err(FrameError::RecordTooLarge(record.len()));
    }

    let header = FrameHeader {
        magic: FRAME_MAGIC,
        version: FRAME_VERSION,
        kind: kind.into(),
        type_len: service_type.len() as u8,
        name_len: service_name.len() as u8,
        record_len: (record.len() as u16).to_le_bytes(),
    };

    let mut out =
        Vec::with_capacity(FRAME_HEADER_LEN + service_type.len() + service_name.len() + record.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(service_type.as_bytes());
    out.extend_from_slice(service_name.as_bytes());
    out.extend_from_slice(record);
    Ok(out)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Parse a datagram. The buffer must hold exactly one frame.
pub fn decode_frame(buf: &[u8]) -> Result<Frame<'_>, FrameError> {
    let header = FrameHeader::read_from_prefix(buf).ok_or(FrameError::Truncated {
        needed: FRAME_HEADER_LEN,
        available: buf.len(),
    })?;

    if header.magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic);
    }
    if header.version != FRAME_VERSION {
        return Err(FrameError::UnknownVersion(header.version));
    }
    let kind = FrameKind::try_from(header.kind)?;

    let type_len = header.type_len as usize;
    let name_len = header.name_len as usize;
    let record_len = u16::from_le_bytes(header.record_len) as usize;

    if name_len > MAX_SERVICE_NAME_LEN {
        return Err(FrameError::NameTooLong(name_len));
    }
    if record_len > MAX_RECORD_LEN {
        return Err(FrameError::RecordTooLarge(record_len));
    }

    let body = &buf[FRAME_HEADER_LEN..];
    let needed = type_len + name_len + record_len;
    if body.len() < needed {
        return Err(FrameError::Truncated {
            needed: FRAME_HEADER_LEN + needed,
            available: buf.len(),
        });
    }
    if body.len() > needed {
        return Err(FrameError::TrailingBytes(body.len() - needed));
    }

    let (service_type, rest) = body.split_at(type_len);
    let (service_name, record) = rest.split_at(name_len);

    Ok(Frame {
        kind,
        service_type: std::str::from_utf8(service_type).map_err(|_| FrameError::InvalidUtf8)?,
        service_name: std::str::from_utf8(service_name).map_err(|_| FrameError::InvalidUtf8)?,
        record,
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("not a netstate frame")]
    BadMagic,

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("service type is {0} bytes, maximum is 255")]
    ServiceTypeTooLong(usize),

    #[error("service name is {0} bytes, maximum is {}", MAX_SERVICE_NAME_LEN)]
    NameTooLong(usize),

    #[error("record is {0} bytes, maximum is {}", MAX_RECORD_LEN)]
    RecordTooLarge(usize),

    #[error("service type or name is not valid UTF-8")]
    InvalidUtf8,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
