//! Schema-driven wire codec (C1): fixed headers + nested TLV ("NLA")
//! attribute trees.
//!
//! Netlink aligns every field to 4 bytes; attribute encoding is
//! `[type:u16][len:u16][value padded to 4]`. This module supplies the
//! primitives (`NlaIter`, `encode_nla`, `NlaValue`) that per-message-kind
//! headers and the `#[derive(NlaSet)]` macro in `rtnl_macros` build on.

use crate::netlink::error::DecodeError;
use std::net::Ipv4Addr;

pub const NLA_ALIGNTO: usize = 4;

pub fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// A scalar wire format. Declarative member of a message schema; the actual
/// encode/decode work is done by [`NlaValue`] impls and the fixed-header
/// structs in `netlink::messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    /// Fixed-size byte blob of the given length.
    Bytes(usize),
    /// Null-terminated ASCII string.
    Asciiz,
}

impl Scalar {
    /// The minimum payload length this scalar needs, or `None` for a
    /// variable-length kind (`Asciiz`, and `Bytes(0)`'s "no minimum" use).
    pub fn size(self) -> Option<usize> {
        match self {
            Scalar::U8 | Scalar::I8 => Some(1),
            Scalar::U16 | Scalar::I16 => Some(2),
            Scalar::U32 | Scalar::I32 => Some(4),
            Scalar::U64 | Scalar::I64 => Some(8),
            Scalar::Bytes(0) => None,
            Scalar::Bytes(n) => Some(n),
            Scalar::Asciiz => None,
        }
    }

    /// Bounds-checks `payload` against this scalar's minimum size, returning
    /// the leading slice a fixed-size decode should read from. Used by every
    /// [`NlaValue`] impl so the "payload too short" error carries a
    /// consistent field name and size across every wire type.
    pub fn decode<'a>(self, field: &'static str, payload: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        match self.size() {
            Some(size) if payload.len() < size => Err(DecodeError::nla(field, size, payload.len())),
            Some(size) => Ok(&payload[..size]),
            None => Ok(payload),
        }
    }
}

/// A decoded-but-unvalidated attribute: its type id and raw (unpadded)
/// payload, borrowed from the message buffer.
#[derive(Debug, Clone, Copy)]
pub struct NlaBuf<'a> {
    pub kind: u16,
    pub payload: &'a [u8],
}

/// Walks a TLV chain, yielding one [`NlaBuf`] per attribute. Stops at the
/// first malformed header (declared length less than the 4-byte TLV header,
/// or pointing past the end of the buffer) rather than panicking, per the
/// "never panic on kernel-malformed input" contract.
pub struct NlaIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> NlaIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        NlaIter { buf, offset: 0 }
    }
}

impl<'a> Iterator for NlaIter<'a> {
    type Item = NlaBuf<'a>;

    fn next(&mut self) -> Option<NlaBuf<'a>> {
        if self.offset + 4 > self.buf.len() {
            return None;
        }
        let len = u16::from_ne_bytes([self.buf[self.offset], self.buf[self.offset + 1]]) as usize;
        let kind = u16::from_ne_bytes([self.buf[self.offset + 2], self.buf[self.offset + 3]]);
        if len < 4 || self.offset + len > self.buf.len() {
            return None;
        }
        let payload = &self.buf[self.offset + 4..self.offset + len];
        self.offset += nla_align(len);
        Some(NlaBuf { kind, payload })
    }
}

/// Appends one attribute (header + value + padding) to `buf`.
pub fn encode_nla(kind: u16, value: &[u8], buf: &mut Vec<u8>) {
    let len = (4 + value.len()) as u16;
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&kind.to_ne_bytes());
    buf.extend_from_slice(value);
    let padded = nla_align(value.len());
    buf.resize(buf.len() + (padded - value.len()), 0);
}

/// A scalar type that can be the payload of one attribute. Implemented for
/// the primitive wire types `#[derive(NlaSet)]` understands.
pub trait NlaValue: Sized {
    /// This type's wire shape, used to bounds-check a payload before
    /// decoding it (see [`Scalar::decode`]).
    const SCALAR: Scalar;

    fn encode_nla_value(&self, buf: &mut Vec<u8>);
    fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError>;
}

macro_rules! impl_nla_value_int {
    ($t:ty, $scalar:expr) => {
        impl NlaValue for $t {
            const SCALAR: Scalar = $scalar;

            fn encode_nla_value(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_ne_bytes());
            }

            fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError> {
                let bytes = Scalar::decode(Self::SCALAR, stringify!($t), payload)?;
                let mut arr = [0u8; std::mem::size_of::<$t>()];
                arr.copy_from_slice(bytes);
                Ok(<$t>::from_ne_bytes(arr))
            }
        }
    };
}

impl_nla_value_int!(u8, Scalar::U8);
impl_nla_value_int!(u16, Scalar::U16);
impl_nla_value_int!(u32, Scalar::U32);
impl_nla_value_int!(u64, Scalar::U64);
impl_nla_value_int!(i8, Scalar::I8);
impl_nla_value_int!(i16, Scalar::I16);
impl_nla_value_int!(i32, Scalar::I32);
impl_nla_value_int!(i64, Scalar::I64);

impl NlaValue for String {
    const SCALAR: Scalar = Scalar::Asciiz;

    fn encode_nla_value(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
        buf.push(0);
    }

    fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload = Scalar::decode(Self::SCALAR, "asciiz", payload)?;
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        std::str::from_utf8(&payload[..end])
            .map(|s| s.to_string())
            .map_err(|_| DecodeError::nla("asciiz", end, payload.len()))
    }
}

impl NlaValue for Vec<u8> {
    const SCALAR: Scalar = Scalar::Bytes(0);

    fn encode_nla_value(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload = Scalar::decode(Self::SCALAR, "bytes", payload)?;
        Ok(payload.to_vec())
    }
}

impl NlaValue for Ipv4Addr {
    const SCALAR: Scalar = Scalar::Bytes(4);

    fn encode_nla_value(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.octets());
    }

    fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError> {
        let bytes = Scalar::decode(Self::SCALAR, "ipaddr", payload)?;
        Ok(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }
}

impl NlaValue for [u8; 6] {
    const SCALAR: Scalar = Scalar::Bytes(6);

    fn encode_nla_value(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode_nla_value(payload: &[u8]) -> Result<Self, DecodeError> {
        let bytes = Scalar::decode(Self::SCALAR, "hwaddr", payload)?;
        let mut out = [0u8; 6];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Implemented by `#[derive(NlaSet)]` on a struct of `Option<T: NlaValue>`
/// fields. Attribute order on encode follows field declaration order, per
/// the determinism contract (callers control attribute order). A struct that
/// adds a field named `extra: Vec<(u16, Vec<u8>)>` gets every attribute id it
/// doesn't otherwise declare retained there as a raw `(kind, payload)` pair
/// and replayed verbatim on encode, so `decode(encode(x)) == x` holds even
/// for kernel attributes the schema hasn't caught up to yet.
pub trait NlaSet: Default {
    fn encode_attrs(&self, buf: &mut Vec<u8>);
    fn decode_attrs(raw: &[u8]) -> Self;
}

/// A fixed-layout message header (the part before the TLV stream).
pub trait Header: Sized {
    const LEN: usize;
    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nla_roundtrip_u32() {
        let mut buf = Vec::new();
        encode_nla(7, &42u32.to_ne_bytes(), &mut buf);
        assert_eq!(buf.len(), 8);
        let attrs: Vec<_> = NlaIter::new(&buf).collect();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].kind, 7);
        assert_eq!(u32::decode_nla_value(attrs[0].payload).unwrap(), 42);
    }

    #[test]
    fn nla_roundtrip_string_padding() {
        let mut buf = Vec::new();
        encode_nla(1, b"eth0\0", &mut buf);
        // header(4) + "eth0\0"(5) padded to 4 => 12
        assert_eq!(buf.len(), 12);
        let attrs: Vec<_> = NlaIter::new(&buf).collect();
        assert_eq!(String::decode_nla_value(attrs[0].payload).unwrap(), "eth0");
    }

    #[test]
    fn nla_iter_stops_on_truncated_length() {
        let buf = vec![0xff, 0xff, 0, 0]; // length 65535, way past buffer
        let attrs: Vec<_> = NlaIter::new(&buf).collect();
        assert!(attrs.is_empty());
    }

    #[test]
    fn nla_iter_concatenates_two_messages_in_order() {
        let mut buf = Vec::new();
        encode_nla(1, &1u32.to_ne_bytes(), &mut buf);
        encode_nla(2, &2u32.to_ne_bytes(), &mut buf);
        let kinds: Vec<u16> = NlaIter::new(&buf).map(|n| n.kind).collect();
        assert_eq!(kinds, vec![1, 2]);
    }

    #[test]
    fn unknown_attrs_round_trip_through_extra_bucket() {
        use crate::netlink::messages::link::LinkAttrs;

        let mut raw = Vec::new();
        encode_nla(3, b"eth0\0", &mut raw); // IFLA_IFNAME, recognized
        encode_nla(16, &0u8.to_ne_bytes(), &mut raw); // IFLA_OPERSTATE, unknown to this schema
        encode_nla(23, &1234u32.to_ne_bytes(), &mut raw); // IFLA_STATS64, unknown

        let decoded = LinkAttrs::decode_attrs(&raw);
        assert_eq!(decoded.ifname.as_deref(), Some("eth0"));
        assert_eq!(decoded.extra, vec![(16, vec![0]), (23, 1234u32.to_ne_bytes().to_vec())]);

        let mut re_encoded = Vec::new();
        decoded.encode_attrs(&mut re_encoded);
        let re_decoded = LinkAttrs::decode_attrs(&re_encoded);
        assert_eq!(decoded, re_decoded);
    }
}
