//! Hub wire framing: a compact CBOR subset.
//!
//! The hub channel carries self-describing binary items (RFC 8949 major
//! types, definite lengths only). Like the BER layer, this codec is written
//! directly on `bytes` buffers with offset-tracked errors; an undecodable
//! frame is dropped, never fatal.
//!
//! The writer always emits the canonical forms the gateway needs: smallest
//! integer heads, f64 floats, definite lengths. The reader is permissive
//! about numeric widths (u8..u64 heads, f16/f32/f64, ints where floats are
//! expected) but rejects indefinite lengths outright.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result, WireErrorKind};

/// Major types (RFC 8949 section 3.1).
mod major {
    pub const UINT: u8 = 0;
    pub const NEGINT: u8 = 1;
    pub const BYTES: u8 = 2;
    pub const TEXT: u8 = 3;
    pub const ARRAY: u8 = 4;
    pub const MAP: u8 = 5;
    pub const TAG: u8 = 6;
    pub const SIMPLE: u8 = 7;
}

/// Maximum nesting depth when skipping unknown items.
const MAX_SKIP_DEPTH: usize = 32;

/// CBOR item writer.
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
        }
    }

    fn head(&mut self, major: u8, value: u64) {
        let m = major << 5;
        if value < 24 {
            self.buf.put_u8(m | value as u8);
        } else if value <= 0xFF {
            self.buf.put_u8(m | 24);
            self.buf.put_u8(value as u8);
        } else if value <= 0xFFFF {
            self.buf.put_u8(m | 25);
            self.buf.put_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.buf.put_u8(m | 26);
            self.buf.put_u32(value as u32);
        } else {
            self.buf.put_u8(m | 27);
            self.buf.put_u64(value);
        }
    }

    /// Write a map head for `len` key/value pairs.
    pub fn map(&mut self, len: usize) {
        self.head(major::MAP, len as u64);
    }

    /// Write an array head for `len` items.
    pub fn array(&mut self, len: usize) {
        self.head(major::ARRAY, len as u64);
    }

    /// Write an unsigned integer.
    pub fn uint(&mut self, value: u64) {
        self.head(major::UINT, value);
    }

    /// Write a signed integer.
    pub fn int(&mut self, value: i64) {
        if value >= 0 {
            self.head(major::UINT, value as u64);
        } else {
            self.head(major::NEGINT, !(value as u64));
        }
    }

    /// Write a boolean.
    pub fn bool(&mut self, value: bool) {
        self.buf.put_u8(if value { 0xF5 } else { 0xF4 });
    }

    /// Write null.
    pub fn null(&mut self) {
        self.buf.put_u8(0xF6);
    }

    /// Write an f64.
    pub fn f64(&mut self, value: f64) {
        self.buf.put_u8(0xFB);
        self.buf.put_f64(value);
    }

    /// Write a text string.
    pub fn text(&mut self, value: &str) {
        self.head(major::TEXT, value.len() as u64);
        self.buf.put_slice(value.as_bytes());
    }

    /// Write a byte string.
    pub fn bytes(&mut self, value: &[u8]) {
        self.head(major::BYTES, value.len() as u64);
        self.buf.put_slice(value);
    }

    /// Append an already-encoded item verbatim.
    pub fn raw_item(&mut self, item: &[u8]) {
        self.buf.put_slice(item);
    }

    /// Finalize into wire bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded item head.
#[derive(Debug, Clone, Copy)]
struct Head {
    major: u8,
    /// Additional-info bits, before argument expansion.
    ai: u8,
    /// Expanded argument (length, value, or raw float bits).
    arg: u64,
}

/// CBOR item reader over a frame.
pub struct Reader {
    data: Bytes,
    offset: usize,
}

impl Reader {
    /// Create a reader over a frame.
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Current offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Check whether the frame is fully consumed.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn byte(&mut self) -> Result<u8> {
        let b = self
            .data
            .get(self.offset)
            .copied()
            .ok_or_else(|| Error::wire(self.offset, WireErrorKind::Truncated))?;
        self.offset += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<Bytes> {
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(Error::wire(self.offset, WireErrorKind::Truncated));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    fn head(&mut self) -> Result<Head> {
        let at = self.offset;
        let initial = self.byte()?;
        let major = initial >> 5;
        let ai = initial & 0x1F;

        let arg = match ai {
            0..=23 => u64::from(ai),
            24 => u64::from(self.byte()?),
            25 => {
                let b = self.take(2)?;
                u64::from(u16::from_be_bytes([b[0], b[1]]))
            }
            26 => {
                let b = self.take(4)?;
                u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            27 => {
                let b = self.take(8)?;
                u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
            28..=30 => return Err(Error::wire(at, WireErrorKind::InvalidHeader(ai))),
            _ => return Err(Error::wire(at, WireErrorKind::IndefiniteLength)),
        };

        Ok(Head { major, ai, arg })
    }

    fn length(&self, head: Head) -> Result<usize> {
        let len = usize::try_from(head.arg).map_err(|_| {
            Error::wire(
                self.offset,
                WireErrorKind::LengthExceedsMax {
                    length: head.arg,
                    max: usize::MAX,
                },
            )
        })?;
        if len > self.remaining() {
            return Err(Error::wire(self.offset, WireErrorKind::Truncated));
        }
        Ok(len)
    }

    /// Read an unsigned integer.
    pub fn read_uint(&mut self) -> Result<u64> {
        let at = self.offset;
        let head = self.head()?;
        if head.major != major::UINT {
            return Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "unsigned integer",
                    actual: head.major,
                },
            ));
        }
        Ok(head.arg)
    }

    /// Read a boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        let at = self.offset;
        let head = self.head()?;
        match (head.major, head.ai) {
            (major::SIMPLE, 20) => Ok(false),
            (major::SIMPLE, 21) => Ok(true),
            _ => Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "bool",
                    actual: head.major,
                },
            )),
        }
    }

    /// Read a float. Accepts f16/f32/f64 and integral items.
    pub fn read_f64(&mut self) -> Result<f64> {
        let at = self.offset;
        let head = self.head()?;
        match (head.major, head.ai) {
            (major::SIMPLE, 25) => Ok(f16_to_f64(head.arg as u16)),
            (major::SIMPLE, 26) => Ok(f64::from(f32::from_bits(head.arg as u32))),
            (major::SIMPLE, 27) => Ok(f64::from_bits(head.arg)),
            (major::UINT, _) => Ok(head.arg as f64),
            (major::NEGINT, _) => Ok(-1.0 - head.arg as f64),
            _ => Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "float",
                    actual: head.major,
                },
            )),
        }
    }

    /// Read a text string.
    pub fn read_text(&mut self) -> Result<String> {
        let at = self.offset;
        let head = self.head()?;
        if head.major != major::TEXT {
            return Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "text",
                    actual: head.major,
                },
            ));
        }
        let len = self.length(head)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::wire(at, WireErrorKind::InvalidUtf8))
    }

    /// Read a byte string.
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let at = self.offset;
        let head = self.head()?;
        if head.major != major::BYTES {
            return Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "bytes",
                    actual: head.major,
                },
            ));
        }
        let len = self.length(head)?;
        self.take(len)
    }

    /// Read a map head, returning the pair count.
    pub fn read_map_len(&mut self) -> Result<usize> {
        let at = self.offset;
        let head = self.head()?;
        if head.major != major::MAP {
            return Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "map",
                    actual: head.major,
                },
            ));
        }
        // Each pair takes at least two bytes; anything bigger is garbage.
        if head.arg > (self.remaining() as u64) {
            return Err(Error::wire(at, WireErrorKind::Truncated));
        }
        Ok(head.arg as usize)
    }

    /// Read an array head, returning the item count.
    pub fn read_array_len(&mut self) -> Result<usize> {
        let at = self.offset;
        let head = self.head()?;
        if head.major != major::ARRAY {
            return Err(Error::wire(
                at,
                WireErrorKind::UnexpectedType {
                    expected: "array",
                    actual: head.major,
                },
            ));
        }
        if head.arg > (self.remaining() as u64) {
            return Err(Error::wire(at, WireErrorKind::Truncated));
        }
        Ok(head.arg as usize)
    }

    /// Skip one item of any type.
    pub fn skip_item(&mut self) -> Result<()> {
        self.skip_at_depth(0)
    }

    fn skip_at_depth(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_SKIP_DEPTH {
            return Err(Error::wire(self.offset, WireErrorKind::NestingTooDeep));
        }

        let head = self.head()?;
        match head.major {
            major::UINT | major::NEGINT | major::SIMPLE => Ok(()),
            major::BYTES | major::TEXT => {
                let len = self.length(head)?;
                self.take(len)?;
                Ok(())
            }
            major::ARRAY => {
                for _ in 0..head.arg {
                    self.skip_at_depth(depth + 1)?;
                }
                Ok(())
            }
            major::MAP => {
                for _ in 0..head.arg {
                    self.skip_at_depth(depth + 1)?;
                    self.skip_at_depth(depth + 1)?;
                }
                Ok(())
            }
            // Tag: the tagged item follows.
            _ => self.skip_at_depth(depth + 1),
        }
    }

    /// Consume one item and return its raw encoding.
    pub fn read_raw_item(&mut self) -> Result<Bytes> {
        let start = self.offset;
        self.skip_item()?;
        Ok(self.data.slice(start..self.offset))
    }
}

/// IEEE 754 half-precision to f64.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let fraction = f64::from(bits & 0x3FF);

    let magnitude = match exponent {
        0 => fraction * 2f64.powi(-24),
        31 => {
            if fraction == 0.0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        e => (1.0 + fraction / 1024.0) * 2f64.powi(e - 15),
    };

    sign * magnitude
}
