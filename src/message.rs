//! Community-based SNMP message format.
//!
//! `SEQUENCE { version INTEGER, community OCTET STRING, pdu PDU }`
//!
//! The gateway transmits v2c only; v1 is recognized on the wire so the trap
//! receiver can name what it drops.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;

/// SNMP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// SNMPv1 (wire value 0)
    V1,
    /// SNMPv2c (wire value 1)
    V2c,
}

impl Version {
    /// Create from the wire integer.
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            _ => None,
        }
    }

    /// Get the wire integer.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2c => write!(f, "v2c"),
        }
    }
}

/// Community-based SNMP message.
#[derive(Debug, Clone)]
pub struct CommunityMessage {
    /// SNMP version
    pub version: Version,
    /// Community string
    pub community: Bytes,
    /// Protocol data unit
    pub pdu: Pdu,
}

impl CommunityMessage {
    /// Create a v2c message.
    pub fn v2c(community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version: Version::V2c,
            community: community.into(),
            pdu,
        }
    }

    /// Encode to BER.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();

        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });

        buf.finish()
    }

    /// Decode from BER.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let version_num = seq.read_integer()?;
        let version = Version::from_i32(version_num).ok_or_else(|| {
            Error::decode(seq.offset(), DecodeErrorKind::UnknownVersion(version_num))
        })?;

        let community = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;

        Ok(CommunityMessage {
            version,
            community,
            pdu,
        })
    }

    /// Consume and return the PDU.
    pub fn into_pdu(self) -> Pdu {
        self.pdu
    }
}
