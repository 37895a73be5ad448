//! Ethernet II framing.

use super::codec::{mac_address, parse, ParseResult};
use crate::addr::MacAddress;
use crate::error::FakenetResult;
use crate::{encode, proto_enum};
use nom::number::complete::be_u16;
use std::fmt;

/// Largest frame on the link: 1500 byte MTU plus the 14 byte header.
pub const FRAME_SIZE: usize = 1514;
pub const MTU: usize = 1500;
const MIN_FRAME_SIZE: usize = 60;

proto_enum! {
    pub enum EtherType: u16 {
        Ipv4 = 0x0800,
        Arp = 0x0806,
        Ipv6 = 0x86dd,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dest: MacAddress,
    pub src: MacAddress,
    pub ethertype: EtherType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encodes the frame, zero-padding it to the 60 byte minimum.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = encode!(self.dest, self.src, self.ethertype, self.payload);

        if result.len() < MIN_FRAME_SIZE {
            result.resize(MIN_FRAME_SIZE, 0u8);
        }

        result
    }

    pub fn parse(input: &[u8]) -> FakenetResult<Self> {
        parse("ethernet frame", input, frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}, {} bytes)",
            self.src,
            self.dest,
            self.ethertype,
            self.payload.len()
        )
    }
}

fn frame(input: &[u8]) -> ParseResult<'_, Frame> {
    let (input, dest) = mac_address(input)?;
    let (input, src) = mac_address(input)?;
    let (input, ethertype) = be_u16(input)?;

    Ok((
        &input[input.len()..],
        Frame {
            dest,
            src,
            ethertype: EtherType::from(ethertype),
            payload: input.to_vec(),
        },
    ))
}
