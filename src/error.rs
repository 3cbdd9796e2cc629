//! Error types for the gateway.
//!
//! One crate-wide [`Error`] enum with kind sub-enums for the two wire
//! codecs. The taxonomy follows the gateway's failure policy:
//!
//! - [`Error::Config`] is the only fatal error; everything else is logged
//!   and retried or dropped by the component that hit it.
//! - [`Error::Io`] / [`Error::Timeout`] / [`Error::WebSocket`] are transient
//!   network failures.
//! - [`Error::Decode`] / [`Error::Wire`] are per-packet / per-frame protocol
//!   violations; the offending datagram or frame is discarded.
//!
//! A rejected hub signature is not an error value at all: the session logs
//! it, stays unverified, and sends no response.

use std::net::SocketAddr;
use std::time::Duration;

use crate::oid::Oid;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Unexpected end of input.
    Truncated,
    /// Tag byte differs from the expected one.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Indefinite length form (rejected, per net-snmp behavior).
    IndefiniteLength,
    /// Length field malformed or wider than supported.
    InvalidLength,
    /// Length exceeds the decoder's sanity cap.
    LengthExceedsMax { length: usize, max: usize },
    /// Zero-length integer body.
    ZeroLengthInteger,
    /// NULL with a non-zero length.
    InvalidNull,
    /// OID body malformed (arc overflow, trailing continuation bit).
    InvalidOid,
    /// Unknown SNMP version number.
    UnknownVersion(i32),
    /// Unknown PDU tag.
    UnknownPduType(u8),
    /// IpAddress body is not 4 bytes.
    InvalidIpAddress { length: usize },
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated data"),
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "unexpected tag: expected 0x{expected:02x}, got 0x{actual:02x}")
            }
            Self::IndefiniteLength => write!(f, "indefinite length not supported"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {length} exceeds maximum {max}")
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidOid => write!(f, "malformed OID encoding"),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version {v}"),
            Self::UnknownPduType(t) => write!(f, "unknown PDU tag 0x{t:02x}"),
            Self::InvalidIpAddress { length } => {
                write!(f, "IpAddress with length {length}, expected 4")
            }
        }
    }
}

/// Hub wire (CBOR) error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorKind {
    /// Unexpected end of input.
    Truncated,
    /// Item has a different major type than required.
    UnexpectedType { expected: &'static str, actual: u8 },
    /// Indefinite-length item (rejected; the hub writes definite lengths).
    IndefiniteLength,
    /// Additional-info value reserved or unsupported.
    InvalidHeader(u8),
    /// Length does not fit in usize or exceeds the sanity cap.
    LengthExceedsMax { length: u64, max: usize },
    /// Nesting deeper than the skip limit.
    NestingTooDeep,
    /// Text item is not valid UTF-8.
    InvalidUtf8,
    /// Missing a required map key.
    MissingField(&'static str),
}

impl std::fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated item"),
            Self::UnexpectedType { expected, actual } => {
                write!(f, "expected {expected}, got major type {actual}")
            }
            Self::IndefiniteLength => write!(f, "indefinite length not supported"),
            Self::InvalidHeader(ai) => write!(f, "invalid additional info {ai}"),
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {length} exceeds maximum {max}")
            }
            Self::NestingTooDeep => write!(f, "nesting too deep"),
            Self::InvalidUtf8 => write!(f, "text item is not valid UTF-8"),
            Self::MissingField(name) => write!(f, "missing field {name}"),
        }
    }
}

/// SNMP protocol error status (RFC 3416).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    /// Status code outside the RFC 3416 range.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from the wire integer.
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// Get the wire integer.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(v) => v,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(v) => write!(f, "unknown({v})"),
        }
    }
}

/// Gateway error type.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid. The only fatal error.
    Config(String),

    /// Socket-level I/O failure.
    Io {
        /// Remote address, when known.
        target: Option<SocketAddr>,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// SNMP request timed out after all retries.
    Timeout {
        /// The polled device.
        target: SocketAddr,
        /// Total time spent including retries.
        elapsed: Duration,
        /// Number of retries attempted.
        retries: u32,
    },

    /// Device returned an SNMP error status.
    Snmp {
        /// The polled device.
        target: SocketAddr,
        /// Error status from the response PDU.
        status: ErrorStatus,
        /// 1-based index of the offending varbind (0 = whole PDU).
        index: u32,
        /// OID the error refers to, when the index resolves to one.
        oid: Option<Oid>,
    },

    /// BER decode failure.
    Decode {
        /// Byte offset into the datagram.
        offset: usize,
        /// What went wrong.
        kind: DecodeErrorKind,
    },

    /// Hub frame (CBOR) decode failure.
    Wire {
        /// Byte offset into the frame.
        offset: usize,
        /// What went wrong.
        kind: WireErrorKind,
    },

    /// WebSocket connect or transfer failure.
    WebSocket(String),
}

impl Error {
    /// Shorthand for a BER decode error.
    pub(crate) fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Shorthand for a hub wire error.
    pub(crate) fn wire(offset: usize, kind: WireErrorKind) -> Self {
        Self::Wire { offset, kind }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Io { target, source } => match target {
                Some(addr) => write!(f, "I/O error ({addr}): {source}"),
                None => write!(f, "I/O error: {source}"),
            },
            Self::Timeout {
                target,
                elapsed,
                retries,
            } => write!(
                f,
                "request to {target} timed out after {elapsed:?} ({retries} retries)"
            ),
            Self::Snmp {
                target,
                status,
                index,
                oid,
            } => {
                write!(f, "SNMP error from {target}: {status} at index {index}")?;
                if let Some(oid) = oid {
                    write!(f, " ({oid})")?;
                }
                Ok(())
            }
            Self::Decode { offset, kind } => write!(f, "BER decode error at offset {offset}: {kind}"),
            Self::Wire { offset, kind } => write!(f, "hub frame error at offset {offset}: {kind}"),
            Self::WebSocket(msg) => write!(f, "websocket error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_roundtrip() {
        for code in 0..=18 {
            assert_eq!(ErrorStatus::from_i32(code).as_i32(), code);
        }
        assert_eq!(ErrorStatus::from_i32(99), ErrorStatus::Unknown(99));
    }

    #[test]
    fn display_includes_context() {
        let err = Error::Timeout {
            target: "192.0.2.1:161".parse().unwrap(),
            elapsed: Duration::from_secs(4),
            retries: 1,
        };
        let text = err.to_string();
        assert!(text.contains("192.0.2.1:161"));
        assert!(text.contains("1 retries"));
    }

    #[test]
    fn decode_kind_display() {
        let kind = DecodeErrorKind::UnexpectedTag {
            expected: 0x30,
            actual: 0x04,
        };
        assert_eq!(kind.to_string(), "unexpected tag: expected 0x30, got 0x04");
    }
}
