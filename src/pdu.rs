//! SNMP Protocol Data Units.
//!
//! The gateway speaks the request/response subset it needs: GET requests
//! out, Response/TrapV2/InformRequest in, Response back for informs.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::varbind::{decode_varbind_list, encode_varbind_list, VarBind};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    Response = 0xA2,
    SetRequest = 0xA3,
    TrapV1 = 0xA4,
    GetBulkRequest = 0xA5,
    InformRequest = 0xA6,
    TrapV2 = 0xA7,
    Report = 0xA8,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA4 => Some(Self::TrapV1),
            0xA5 => Some(Self::GetBulkRequest),
            0xA6 => Some(Self::InformRequest),
            0xA7 => Some(Self::TrapV2),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::TrapV1 => write!(f, "TrapV1"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::InformRequest => write!(f, "InformRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Generic PDU structure shared by every v2c operation.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type
    pub pdu_type: PduType,
    /// Request ID for correlating requests and responses
    pub request_id: i32,
    /// Error status (0 for requests)
    pub error_status: i32,
    /// Error index (1-based index of the problematic varbind)
    pub error_index: i32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a GET request PDU.
    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// Create an SNMPv2 trap PDU.
    pub fn trap_v2(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::TrapV2,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Create the Response PDU that acknowledges this PDU (inform handling).
    pub fn to_response(&self) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: 0,
            error_index: 0,
            varbinds: self.varbinds.clone(),
        }
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }

    /// Get the error status as an enum.
    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// Check if this is a notification PDU (trap or inform).
    pub fn is_notification(&self) -> bool {
        matches!(self.pdu_type, PduType::TrapV2 | PduType::InformRequest)
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;

        let len = decoder.read_length()?;
        let mut pdu = decoder.sub_decoder(len)?;

        let request_id = pdu.read_integer()?;
        let error_status = pdu.read_integer()?;
        let error_index = pdu.read_integer()?;
        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}
