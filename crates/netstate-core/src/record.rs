//! NetState record format — the key/value metadata carried by every
//! advertisement.
//!
//! A record is a flat run of entries terminated by the end of the buffer:
//!
//! ```text
//!   [tag?] [key_len: u8] [key bytes] [value_len: u8] [value bytes]
//! ```
//!
//! The optional one-byte type tag is present on every entry or on none,
//! depending on how the record was encoded. Peers must agree on the mode;
//! advertisements always use the untagged form. Lengths are single bytes,
//! so no key or value may exceed 255 bytes.

use std::borrow::Cow;
use std::collections::BTreeMap;

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Group identifier of the publishing registration.
pub const GROUP_IDENTIFIER_KEY: &str = "g";

/// Member identifier of the publisher. Listeners compare this against
/// their own to drop echoes of their own changes.
pub const MEMBER_IDENTIFIER_KEY: &str = "m";

/// State blob, or its SHA-1 digest once the blob is too large.
pub const STATE_KEY: &str = "s";

/// Per-registration change counter, ASCII decimal.
pub const VERSION_KEY: &str = "v";

/// Longest key a record can carry.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// Longest value a record can carry.
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

const TAG_STRING: u8 = b's';
const TAG_DATA: u8 = b'd';
const TAG_INTEGER: u8 = b'i';

// ── Values ────────────────────────────────────────────────────────────────────

/// A single record value.
///
/// The variant only survives a round trip when the record is encoded with
/// type prefixes. Untagged records decode every value as `Data`; use
/// [`TxtValue::as_str`] and [`TxtValue::as_u64`] to read them.
///
/// Values compare by their wire bytes, so `String("7")`, `Data(b"7")` and
/// `Integer(7)` are equal. Match on the variant to tell them apart.
#[derive(Debug, Clone)]
pub enum TxtValue {
    String(String),
    Data(Vec<u8>),
    /// Written as ASCII decimal.
    Integer(u64),
}

impl TxtValue {
    fn type_tag(&self) -> u8 {
        match self {
            TxtValue::String(_) => TAG_STRING,
            TxtValue::Data(_) => TAG_DATA,
            TxtValue::Integer(_) => TAG_INTEGER,
        }
    }

    /// The value bytes as they appear on the wire.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            TxtValue::String(s) => Cow::Borrowed(s.as_bytes()),
            TxtValue::Data(d) => Cow::Borrowed(d.as_slice()),
            TxtValue::Integer(n) => Cow::Owned(n.to_string().into_bytes()),
        }
    }

    /// Read the value as text. Data values are accepted if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TxtValue::String(s) => Some(s),
            TxtValue::Data(d) => std::str::from_utf8(d).ok(),
            TxtValue::Integer(_) => None,
        }
    }

    /// Read the value as an unsigned integer. Text and data values are
    /// parsed as ASCII decimal.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TxtValue::Integer(n) => Some(*n),
            TxtValue::String(s) => parse_decimal(s.as_bytes()),
            TxtValue::Data(d) => parse_decimal(d),
        }
    }
}

impl PartialEq for TxtValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for TxtValue {}

impl From<&str> for TxtValue {
    fn from(s: &str) -> Self {
        TxtValue::String(s.to_owned())
    }
}

impl From<String> for TxtValue {
    fn from(s: String) -> Self {
        TxtValue::String(s)
    }
}

impl From<&[u8]> for TxtValue {
    fn from(d: &[u8]) -> Self {
        TxtValue::Data(d.to_vec())
    }
}

impl From<Vec<u8>> for TxtValue {
    fn from(d: Vec<u8>) -> Self {
        TxtValue::Data(d)
    }
}

impl From<u64> for TxtValue {
    fn from(n: u64) -> Self {
        TxtValue::Integer(n)
    }
}

/// A decoded record. Ordered so encoding is deterministic.
pub type TxtRecord = BTreeMap<String, TxtValue>;

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Serialize a record into the flat wire format.
pub fn encode_record(record: &TxtRecord, add_type_prefixes: bool) -> Result<Vec<u8>, TxtError> {
    let mut out = Vec::new();

    for (key, value) in record {
        if key.is_empty() {
            return Err(TxtError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(TxtError::KeyTooLong(key.len()));
        }
        let bytes = value.as_bytes();
        if bytes.len() > MAX_VALUE_LEN {
            return Err(TxtError::ValueTooLong {
                key: key.clone(),
                len: bytes.len(),
            });
        }

        if add_type_prefixes {
            out.push(value.type_tag());
        }
        out.push(key.len() as u8);
        out.extend_from_slice(key.as_bytes());
        out.push(bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }

    Ok(out)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Parse a record from the flat wire format.
///
/// Decoding is all-or-nothing: any malformed entry fails the whole record.
pub fn decode_record(data: &[u8], expect_type_prefixes: bool) -> Result<TxtRecord, TxtError> {
    let mut record = TxtRecord::new();
    let mut offset = 0;

    while offset < data.len() {
        let entry_start = offset;

        let tag = if expect_type_prefixes {
            let tag = data[offset];
            if !matches!(tag, TAG_STRING | TAG_DATA | TAG_INTEGER) {
                return Err(TxtError::UnknownTypePrefix {
                    offset: entry_start,
                    tag,
                });
            }
            offset += 1;
            Some(tag)
        } else {
            None
        };

        let key_len = read_len(data, &mut offset)?;
        if key_len == 0 {
            return Err(TxtError::EmptyKey);
        }
        let key_offset = offset;
        let key = take(data, &mut offset, key_len)?;
        let key = std::str::from_utf8(key).map_err(|_| TxtError::InvalidUtf8 { offset: key_offset })?;

        let value_len = read_len(data, &mut offset)?;
        let value_offset = offset;
        let value = take(data, &mut offset, value_len)?;

        let value = match tag {
            None | Some(TAG_DATA) => TxtValue::Data(value.to_vec()),
            Some(TAG_STRING) => TxtValue::String(
                std::str::from_utf8(value)
                    .map_err(|_| TxtError::InvalidUtf8 { offset: value_offset })?
                    .to_owned(),
            ),
            Some(_) => TxtValue::Integer(
                parse_decimal(value).ok_or_else(|| TxtError::InvalidInteger(key.to_owned()))?,
            ),
        };

        if record.insert(key.to_owned(), value).is_some() {
            return Err(TxtError::DuplicateKey(key.to_owned()));
        }
    }

    Ok(record)
}

fn read_len(data: &[u8], offset: &mut usize) -> Result<usize, TxtError> {
    let len = *data.get(*offset).ok_or(TxtError::Truncated { offset: *offset })?;
    *offset += 1;
    Ok(len as usize)
}

fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], TxtError> {
    let remaining = data.len() - *offset;
    if len > remaining {
        return Err(TxtError::MalformedLength {
            offset: *offset,
            declared: len,
            remaining,
        });
    }
    let slice = &data[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}

fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors from encoding or decoding a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxtError {
    #[error("record key is empty")]
    EmptyKey,

    #[error("record key is {0} bytes, maximum is {}", MAX_KEY_LEN)]
    KeyTooLong(usize),

    #[error("value for key {key:?} is {len} bytes, maximum is {}", MAX_VALUE_LEN)]
    ValueTooLong { key: String, len: usize },

    #[error("record truncated at offset {offset}: expected a length byte")]
    Truncated { offset: usize },

    #[error("length {declared} at offset {offset} runs past end of record ({remaining} bytes left)")]
    MalformedLength {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("unknown type prefix 0x{tag:02x} at offset {offset}")]
    UnknownTypePrefix { offset: usize, tag: u8 },

    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("value for key {0:?} is not a decimal integer")]
    InvalidInteger(String),

    #[error("duplicate key {0:?}")]
    DuplicateKey(String),

    #[error("value for key {0:?} is not UTF-8 text")]
    NotText(&'static str),

    #[error("record is missing required key {0:?}")]
    MissingKey(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
