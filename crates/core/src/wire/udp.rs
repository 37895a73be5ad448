//! UDP over IPv6 (RFC 768, RFC 8200 §8.1).

use super::codec::{parse, pseudo_header_checksum, ParseResult};
use super::ipv6::NextHeader;
use crate::encode;
use crate::error::{FakenetError, FakenetResult};
use nom::bytes::complete::take;
use nom::combinator::verify;
use nom::number::complete::be_u16;
use std::net::Ipv6Addr;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub src_port: u16,
    pub dest_port: u16,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn encode(&self, src: &Ipv6Addr, dest: &Ipv6Addr) -> Vec<u8> {
        let mut bytes = encode!(
            self.src_port,
            self.dest_port,
            (HEADER_LEN + self.payload.len()) as u16,
            0u16,
            self.payload,
        );

        // Zero means "no checksum", which IPv6 forbids; send the other zero.
        let checksum = match pseudo_header_checksum(src, dest, u8::from(NextHeader::Udp), &bytes) {
            0 => 0xffff,
            sum => sum,
        };
        bytes[6..8].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    pub fn parse(input: &[u8], src: &Ipv6Addr, dest: &Ipv6Addr) -> FakenetResult<Self> {
        let (header, _) = input.split_at(input.len().min(HEADER_LEN));
        if header.len() == HEADER_LEN && header[6..8] == [0, 0] {
            return Err(FakenetError::Parse("udp datagram without checksum".to_string()));
        }

        let datagram = parse("udp datagram", input, datagram)?;

        let length = HEADER_LEN + datagram.payload.len();
        if pseudo_header_checksum(src, dest, u8::from(NextHeader::Udp), &input[..length]) != 0 {
            return Err(FakenetError::Parse("udp checksum mismatch".to_string()));
        }

        Ok(datagram)
    }
}

fn datagram(input: &[u8]) -> ParseResult<'_, Datagram> {
    let (input, src_port) = be_u16(input)?;
    let (input, dest_port) = be_u16(input)?;
    let (input, length) = verify(be_u16, |len: &u16| usize::from(*len) >= HEADER_LEN)(input)?;
    let (input, _checksum) = be_u16(input)?;
    let (input, payload) = take(usize::from(length) - HEADER_LEN)(input)?;

    Ok((
        input,
        Datagram {
            src_port,
            dest_port,
            payload: payload.to_vec(),
        },
    ))
}
