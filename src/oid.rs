//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` to avoid heap allocation for
//! common OIDs. Parsing tolerates a leading dot, since device configurations
//! and trap varbinds commonly write OIDs both ways.

use std::fmt;

use smallvec::SmallVec;

use crate::ber::{tag, Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a
/// value". Enforced during BER decoding.
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

/// Build an [`Oid`] from arc literals.
///
/// ```
/// use snmp_gateway::oid;
///
/// let sys_name = oid!(1, 3, 6, 1, 2, 1, 1, 5, 0);
/// assert_eq!(sys_name.to_string(), "1.3.6.1.2.1.1.5.0");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),+ $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),+])
    };
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from arc values.
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse dotted notation, with or without a leading dot.
    ///
    /// ```
    /// use snmp_gateway::oid::Oid;
    ///
    /// let a = Oid::parse("1.3.6.1.2.1.1.5.0").unwrap();
    /// let b = Oid::parse(".1.3.6.1.2.1.1.5.0").unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs = SmallVec::new();
        for part in trimmed.split('.') {
            let arc: u32 = part
                .parse()
                .map_err(|_| Error::decode(0, DecodeErrorKind::InvalidOid))?;
            arcs.push(arc);
        }

        Ok(Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Get the number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the OID is empty.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Check if this OID starts with another OID.
    pub fn starts_with(&self, other: &Oid) -> bool {
        self.arcs.len() >= other.arcs.len() && self.arcs[..other.arcs.len()] == other.arcs[..]
    }

    /// Encode into the buffer as OBJECT IDENTIFIER.
    ///
    /// The first two arcs combine into one subidentifier per X.690 8.19.
    /// An OID with fewer than two arcs encodes as the degenerate zero byte,
    /// which is what net-snmp emits for such values.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        let mut body: SmallVec<[u8; 32]> = SmallVec::new();

        if self.arcs.len() >= 2 {
            let first = u64::from(self.arcs[0]) * 40 + u64::from(self.arcs[1]);
            push_base128(&mut body, first);
            for &arc in &self.arcs[2..] {
                push_base128(&mut body, u64::from(arc));
            }
        } else {
            body.push(0);
        }

        buf.push_primitive(tag::OBJECT_IDENTIFIER, &body);
    }

    /// Decode an OBJECT IDENTIFIER body of `len` bytes from the decoder.
    pub fn decode_body(decoder: &mut Decoder, len: usize) -> Result<Self> {
        let offset = decoder.offset();
        let body = decoder.read_bytes(len)?;

        if body.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut value: u64 = 0;
        let mut first = true;

        for (i, &byte) in body.iter().enumerate() {
            value = (value << 7) | u64::from(byte & 0x7F);
            if value > u64::from(u32::MAX) {
                return Err(Error::decode(offset + i, DecodeErrorKind::InvalidOid));
            }
            if byte & 0x80 == 0 {
                if first {
                    // Split the combined first subidentifier.
                    let (a, b) = if value < 40 {
                        (0, value)
                    } else if value < 80 {
                        (1, value - 40)
                    } else {
                        (2, value - 80)
                    };
                    arcs.push(a as u32);
                    arcs.push(b as u32);
                    first = false;
                } else {
                    arcs.push(value as u32);
                }
                value = 0;
            } else if i == body.len() - 1 {
                // Continuation bit set on the final byte.
                return Err(Error::decode(offset + i, DecodeErrorKind::InvalidOid));
            }
        }

        if arcs.len() > MAX_OID_LEN {
            return Err(Error::decode(offset, DecodeErrorKind::InvalidOid));
        }

        Ok(Self { arcs })
    }
}

/// Append a base-128 subidentifier, most significant group first.
fn push_base128(out: &mut SmallVec<[u8; 32]>, value: u64) {
    if value == 0 {
        out.push(0);
        return;
    }
    let mut groups: SmallVec<[u8; 10]> = SmallVec::new();
    let mut v = value;
    while v > 0 {
        groups.push((v & 0x7F) as u8);
        v >>= 7;
    }
    for (i, g) in groups.iter().enumerate().rev() {
        out.push(if i == 0 { *g } else { g | 0x80 });
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{arc}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
