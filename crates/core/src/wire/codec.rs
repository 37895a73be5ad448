//! Shared encode/parse machinery for the wire formats.

use crate::addr::MacAddress;
use crate::error::{FakenetError, FakenetResult};
use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

pub type ParseResult<'a, O> = nom::IResult<&'a [u8], O>;

/// Fixed-layout binary encoding into a caller-sized buffer.
pub trait Encode {
    fn encoded_len(&self) -> usize;

    /// `buf` is at least `encoded_len()` bytes long.
    fn encode_to(&self, buf: &mut [u8]);
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }

    fn encode_to(&self, buf: &mut [u8]) {
        (**self).encode_to(buf)
    }
}

impl Encode for u8 {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }
}

impl Encode for u16 {
    fn encoded_len(&self) -> usize {
        2
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..2].copy_from_slice(&self.to_be_bytes());
    }
}

impl Encode for u32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_be_bytes());
    }
}

impl<T: Encode> Encode for [T] {
    fn encoded_len(&self) -> usize {
        self.iter().map(Encode::encoded_len).sum()
    }

    fn encode_to(&self, buf: &mut [u8]) {
        let mut offset = 0;
        for part in self {
            let len = part.encoded_len();
            part.encode_to(&mut buf[offset..offset + len]);
            offset += len;
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encoded_len(&self) -> usize {
        self.as_slice().encoded_len()
    }

    fn encode_to(&self, buf: &mut [u8]) {
        self.as_slice().encode_to(buf)
    }
}

impl Encode for MacAddress {
    fn encoded_len(&self) -> usize {
        6
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..6].copy_from_slice(&self.0);
    }
}

impl Encode for Ipv4Addr {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.octets());
    }
}

impl Encode for Ipv6Addr {
    fn encoded_len(&self) -> usize {
        16
    }

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..16].copy_from_slice(&self.octets());
    }
}

/// Encodes each value back to back into `$buf`.
#[macro_export]
macro_rules! encode_to {
    ( $buf:expr, $($val:expr),+ $(,)? ) => {{
        let mut buf: &mut [u8] = $buf;
        $(
            let len = $crate::wire::codec::Encode::encoded_len(&$val);
            $crate::wire::codec::Encode::encode_to(&$val, &mut buf[..len]);
            buf = &mut ::std::mem::take(&mut buf)[len..];
        )+
        let _ = buf;
    }};
}

/// Encodes each value back to back into a freshly sized `Vec<u8>`.
#[macro_export]
macro_rules! encode {
    ( $($val:expr),+ $(,)? ) => {{
        let mut result =
            vec![0u8; 0 $( + $crate::wire::codec::Encode::encoded_len(&$val) )+];
        $crate::encode_to!(&mut result[..], $($val),+);
        result
    }};
}

/// Declares a protocol number enum that keeps unrecognized values.
#[macro_export]
macro_rules! proto_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $type:ty {
            $( $variant:ident = $disc:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
        $vis enum $name {
            $( $variant, )+
            Unknown($type),
        }

        impl ::std::convert::From<$type> for $name {
            fn from(value: $type) -> Self {
                match value {
                    $( $disc => $name::$variant, )+
                    other => $name::Unknown(other),
                }
            }
        }

        impl ::std::convert::From<$name> for $type {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $disc, )+
                    $name::Unknown(other) => other,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( $name::$variant => f.write_str(::std::stringify!($variant)), )+
                    $name::Unknown(value) => write!(f, "Unknown({})", value),
                }
            }
        }

        impl $crate::wire::codec::Encode for $name {
            fn encoded_len(&self) -> usize {
                ::std::mem::size_of::<$type>()
            }

            fn encode_to(&self, buf: &mut [u8]) {
                $crate::wire::codec::Encode::encode_to(&<$type>::from(*self), buf)
            }
        }
    };
}

/// Runs a complete parser, mapping nom failures into [`FakenetError::Parse`].
pub fn parse<'a, O>(
    what: &str,
    input: &'a [u8],
    mut parser: impl FnMut(&'a [u8]) -> ParseResult<'a, O>,
) -> FakenetResult<O> {
    parser(input)
        .map(|(_, output)| output)
        .map_err(|e| FakenetError::Parse(format!("parsing {what} failed: {e}")))
}

pub fn mac_address(input: &[u8]) -> ParseResult<'_, MacAddress> {
    let (input, octets) = nom::bytes::complete::take(6usize)(input)?;
    let mut mac = [0u8; 6];
    mac.copy_from_slice(octets);
    Ok((input, MacAddress(mac)))
}

pub fn ipv4_address(input: &[u8]) -> ParseResult<'_, Ipv4Addr> {
    let (input, octets) = nom::bytes::complete::take(4usize)(input)?;
    let mut ip = [0u8; 4];
    ip.copy_from_slice(octets);
    Ok((input, Ipv4Addr::from(ip)))
}

pub fn ipv6_address(input: &[u8]) -> ParseResult<'_, Ipv6Addr> {
    let (input, octets) = nom::bytes::complete::take(16usize)(input)?;
    let mut ip = [0u8; 16];
    ip.copy_from_slice(octets);
    Ok((input, Ipv6Addr::from(ip)))
}

/// RFC 1071 one's-complement checksum over the concatenation of `parts`.
pub fn internet_checksum(parts: &[&[u8]]) -> u16 {
    let mut sum: u32 = 0;
    let mut pending: Option<u8> = None;

    for byte in parts.iter().flat_map(|p| p.iter().copied()) {
        match pending.take() {
            Some(hi) => sum += u32::from(u16::from_be_bytes([hi, byte])),
            None => pending = Some(byte),
        }
    }
    if let Some(hi) = pending {
        sum += u32::from(hi) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

/// Checksum over the IPv6 pseudo-header (RFC 8200 §8.1) and `body`.
///
/// A body that already carries a correct checksum sums to zero.
pub fn pseudo_header_checksum(src: &Ipv6Addr, dest: &Ipv6Addr, next_header: u8, body: &[u8]) -> u16 {
    let src = src.octets();
    let dest = dest.octets();
    let length = (body.len() as u32).to_be_bytes();
    let next_header = [0, 0, 0, next_header];
    internet_checksum(&[&src[..], &dest[..], &length[..], &next_header[..], body])
}

/// Rounds `n` up to the next multiple of `to`.
#[inline]
pub fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

/// Offset / hex / ASCII dump, 16 bytes per line.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::new();

    for (chunk_num, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}: ", chunk_num * 16);
        for byte in chunk {
            let _ = write!(out, "{byte:02x} ");
        }
        out.push_str(&"   ".repeat(16 - chunk.len()));
        for &byte in chunk {
            let c = byte as char;
            out.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_concatenates_in_order() {
        let mac = MacAddress([1, 2, 3, 4, 5, 6]);
        let bytes = encode!(0xabu8, 0x0102u16, mac, 0x0a0b0c0du32);
        assert_eq!(
            bytes,
            vec![0xab, 0x01, 0x02, 1, 2, 3, 4, 5, 6, 0x0a, 0x0b, 0x0c, 0x0d]
        );
    }

    #[test]
    fn checksum_matches_rfc1071_example() {
        // RFC 1071 §3: 0001 f203 f4f5 f6f7 sums to ddf2.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&[&data]), !0xddf2);
    }

    #[test]
    fn checksum_handles_odd_split_parts() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(
            internet_checksum(&[&data[..3], &data[3..]]),
            internet_checksum(&[&data])
        );
    }

    #[test]
    fn hexdump_shows_offsets_and_ascii() {
        let dump = hexdump(b"0123456789abcdefXY\x00");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000: 30 31 32"));
        assert!(lines[0].ends_with("0123456789abcdef"));
        assert!(lines[1].starts_with("0010: 58 59 00"));
        assert!(lines[1].ends_with("XY."));
    }

    #[test]
    fn round_up_to_multiple() {
        assert_eq!(round_up(6, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(17, 8), 24);
    }
}
