//! BER encoding.
//!
//! [`EncodeBuf`] builds messages back-to-front: callers push fields in
//! reverse order, and constructed types learn their content length from how
//! much the nested closure wrote. `finish()` reverses once at the end.

use bytes::Bytes;

use super::tag;
use crate::oid::Oid;

/// Reverse-building BER encode buffer.
///
/// Push fields in reverse field order; nested sequences via
/// [`push_sequence`](Self::push_sequence) /
/// [`push_constructed`](Self::push_constructed).
pub struct EncodeBuf {
    /// Message bytes in reverse order.
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append content bytes (stored reversed so `finish` restores order).
    fn push_content(&mut self, content: &[u8]) {
        self.buf.extend(content.iter().rev());
    }

    /// Append a length field for `len` content bytes already pushed.
    fn push_length(&mut self, len: usize) {
        if len <= 127 {
            self.buf.push(len as u8);
        } else {
            let mut remaining = len;
            let mut count = 0u8;
            while remaining > 0 {
                self.buf.push(remaining as u8);
                remaining >>= 8;
                count += 1;
            }
            self.buf.push(0x80 | count);
        }
    }

    /// Push a primitive TLV.
    pub fn push_primitive(&mut self, tag: u8, content: &[u8]) {
        self.push_content(content);
        self.push_length(content.len());
        self.buf.push(tag);
    }

    /// Push a constructed TLV whose content is written by `f`.
    ///
    /// The closure must push the content fields in reverse order.
    pub fn push_constructed(&mut self, tag: u8, f: impl FnOnce(&mut Self)) {
        let start = self.buf.len();
        f(self);
        let content_len = self.buf.len() - start;
        self.push_length(content_len);
        self.buf.push(tag);
    }

    /// Push a SEQUENCE whose content is written by `f`.
    pub fn push_sequence(&mut self, f: impl FnOnce(&mut Self)) {
        self.push_constructed(tag::SEQUENCE, f);
    }

    /// Push a signed INTEGER with minimal two's-complement content.
    pub fn push_integer(&mut self, value: i32) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 3 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.push_primitive(tag::INTEGER, &bytes[start..]);
    }

    /// Push an unsigned 32-bit application type (Counter32, Gauge32, TimeTicks).
    pub fn push_unsigned(&mut self, tag: u8, value: u32) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 3 && bytes[start] == 0 {
            start += 1;
        }
        if bytes[start] & 0x80 != 0 {
            // Zero pad keeps the value positive.
            let mut padded = [0u8; 5];
            padded[1..].copy_from_slice(&bytes);
            self.push_primitive(tag, &padded[start..]);
        } else {
            self.push_primitive(tag, &bytes[start..]);
        }
    }

    /// Push a Counter64.
    pub fn push_unsigned64(&mut self, tag: u8, value: u64) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7 && bytes[start] == 0 {
            start += 1;
        }
        if bytes[start] & 0x80 != 0 {
            let mut padded = [0u8; 9];
            padded[1..].copy_from_slice(&bytes);
            self.push_primitive(tag, &padded[start..]);
        } else {
            self.push_primitive(tag, &bytes[start..]);
        }
    }

    /// Push an OCTET STRING.
    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_primitive(tag::OCTET_STRING, data);
    }

    /// Push a NULL.
    pub fn push_null(&mut self) {
        self.push_primitive(tag::NULL, &[]);
    }

    /// Push an IpAddress.
    pub fn push_ip_address(&mut self, octets: [u8; 4]) {
        self.push_primitive(tag::IP_ADDRESS, &octets);
    }

    /// Push an OBJECT IDENTIFIER.
    pub fn push_oid(&mut self, oid: &Oid) {
        oid.encode(self);
    }

    /// Finalize into wire-order bytes.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}

impl Default for EncodeBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::Decoder;

    #[test]
    fn integer_minimal_encoding() {
        for (value, expected) in [
            (0i32, &[0x02, 0x01, 0x00][..]),
            (42, &[0x02, 0x01, 0x2A]),
            (127, &[0x02, 0x01, 0x7F]),
            (128, &[0x02, 0x02, 0x00, 0x80]),
            (-1, &[0x02, 0x01, 0xFF]),
            (-129, &[0x02, 0x02, 0xFF, 0x7F]),
        ] {
            let mut buf = EncodeBuf::new();
            buf.push_integer(value);
            assert_eq!(buf.finish().as_ref(), expected, "value {value}");
        }
    }

    #[test]
    fn unsigned_pads_high_bit() {
        let mut buf = EncodeBuf::new();
        buf.push_unsigned(tag::GAUGE32, 0x8000_0000);
        assert_eq!(
            buf.finish().as_ref(),
            &[0x42, 0x05, 0x00, 0x80, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn sequence_nesting() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(b"public");
            buf.push_integer(1);
        });
        let bytes = buf.finish();

        let mut decoder = Decoder::new(bytes);
        let mut seq = decoder.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), 1);
        assert_eq!(seq.read_octet_string().unwrap().as_ref(), b"public");
        assert!(seq.is_empty());
    }

    #[test]
    fn long_form_length() {
        let payload = vec![0x55u8; 200];
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(&payload);
        let bytes = buf.finish();
        assert_eq!(&bytes[..3], &[0x04, 0x81, 200]);
        assert_eq!(bytes.len(), 203);
    }

    #[test]
    fn counter64_roundtrip() {
        let mut buf = EncodeBuf::new();
        buf.push_unsigned64(tag::COUNTER64, 10_000_000_000);
        let bytes = buf.finish();

        let mut decoder = Decoder::new(bytes);
        let len = decoder.expect_tag(tag::COUNTER64).unwrap();
        assert_eq!(decoder.read_unsigned64_value(len).unwrap(), 10_000_000_000);
    }
}
