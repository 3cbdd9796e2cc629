//! SNMP value types.
//!
//! The `Value` enum covers the SNMPv2c type set plus exception values.
//! Unknown tags are preserved as raw bytes so a trap carrying a vendor type
//! does not kill the whole varbind list.

use bytes::Bytes;

use crate::ber::{tag, Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER (signed 32-bit)
    Integer(i32),
    /// OCTET STRING (arbitrary bytes)
    OctetString(Bytes),
    /// NULL
    Null,
    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),
    /// IpAddress (4 bytes, big-endian)
    IpAddress([u8; 4]),
    /// Counter32 (unsigned 32-bit, wrapping)
    Counter32(u32),
    /// Gauge32 / Unsigned32
    Gauge32(u32),
    /// TimeTicks (hundredths of seconds)
    TimeTicks(u32),
    /// Opaque (legacy, arbitrary bytes)
    Opaque(Bytes),
    /// Counter64 (unsigned 64-bit, wrapping; v2c and later)
    Counter64(u64),
    /// noSuchObject exception
    NoSuchObject,
    /// noSuchInstance exception
    NoSuchInstance,
    /// endOfMibView exception
    EndOfMibView,
    /// Unrecognized tag, raw content kept for logging.
    Unknown { tag: u8, data: Bytes },
}

impl Value {
    /// Numeric reading of the value for the metric pipeline.
    ///
    /// Integer and the unsigned application types convert; Counter64 values
    /// above 2^53 lose precision, which is the accepted truncation for
    /// sensor data. Strings, OIDs and exceptions return `None` and the
    /// sample is dropped upstream.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(f64::from(*v)),
            Value::Counter64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Borrow the value as UTF-8 text, if it is a printable OCTET STRING.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::OctetString(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Check for a v2c exception value.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(octets) => buf.push_ip_address(*octets),
            Value::Counter32(v) => buf.push_unsigned(tag::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned(tag::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned(tag::TIME_TICKS, *v),
            Value::Opaque(data) => buf.push_primitive(tag::OPAQUE, data),
            Value::Counter64(v) => buf.push_unsigned64(tag::COUNTER64, *v),
            Value::NoSuchObject => buf.push_primitive(tag::NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => buf.push_primitive(tag::NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => buf.push_primitive(tag::END_OF_MIB_VIEW, &[]),
            Value::Unknown { tag, data } => buf.push_primitive(*tag, data),
        }
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let value_tag = decoder.read_tag()?;
        let len = decoder.read_length()?;

        match value_tag {
            tag::INTEGER => Ok(Value::Integer(decoder.read_integer_value(len)?)),
            tag::OCTET_STRING => Ok(Value::OctetString(decoder.read_bytes(len)?)),
            tag::NULL => {
                if len != 0 {
                    return Err(Error::decode(decoder.offset(), DecodeErrorKind::InvalidNull));
                }
                Ok(Value::Null)
            }
            tag::OBJECT_IDENTIFIER => Ok(Value::ObjectIdentifier(Oid::decode_body(decoder, len)?)),
            tag::IP_ADDRESS => {
                if len != 4 {
                    return Err(Error::decode(
                        decoder.offset(),
                        DecodeErrorKind::InvalidIpAddress { length: len },
                    ));
                }
                let bytes = decoder.read_bytes(4)?;
                Ok(Value::IpAddress([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            tag::COUNTER32 => Ok(Value::Counter32(decoder.read_unsigned_value(len)?)),
            tag::GAUGE32 => Ok(Value::Gauge32(decoder.read_unsigned_value(len)?)),
            tag::TIME_TICKS => Ok(Value::TimeTicks(decoder.read_unsigned_value(len)?)),
            tag::OPAQUE => Ok(Value::Opaque(decoder.read_bytes(len)?)),
            tag::COUNTER64 => Ok(Value::Counter64(decoder.read_unsigned64_value(len)?)),
            tag::NO_SUCH_OBJECT => {
                decoder.read_bytes(len)?;
                Ok(Value::NoSuchObject)
            }
            tag::NO_SUCH_INSTANCE => {
                decoder.read_bytes(len)?;
                Ok(Value::NoSuchInstance)
            }
            tag::END_OF_MIB_VIEW => {
                decoder.read_bytes(len)?;
                Ok(Value::EndOfMibView)
            }
            other => Ok(Value::Unknown {
                tag: other,
                data: decoder.read_bytes(len)?,
            }),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "{}", crate::util::encode_hex(bytes)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{oid}"),
            Value::IpAddress([a, b, c, d]) => write!(f, "{a}.{b}.{c}.{d}"),
            Value::Counter32(v) => write!(f, "{v}"),
            Value::Gauge32(v) => write!(f, "{v}"),
            Value::TimeTicks(v) => write!(f, "{v}"),
            Value::Opaque(bytes) => write!(f, "{}", crate::util::encode_hex(bytes)),
            Value::Counter64(v) => write!(f, "{v}"),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
            Value::Unknown { tag, data } => {
                write!(f, "unknown(0x{tag:02x}, {})", crate::util::encode_hex(data))
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}
