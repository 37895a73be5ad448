//! ARP for IPv4 over Ethernet (RFC 826).

use super::codec::{ipv4_address, mac_address, parse, ParseResult};
use super::ether::EtherType;
use crate::addr::MacAddress;
use crate::error::FakenetResult;
use crate::{encode, proto_enum};
use nom::combinator::verify;
use nom::number::complete::{be_u16, be_u8};
use std::net::Ipv4Addr;

const HARDWARE_ETHERNET: u16 = 1;

proto_enum! {
    pub enum Opcode: u16 {
        Request = 1,
        Reply = 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: Opcode,
    pub src_mac: MacAddress,
    pub src_ip: Ipv4Addr,
    pub dest_mac: MacAddress,
    pub dest_ip: Ipv4Addr,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        encode!(
            HARDWARE_ETHERNET,
            EtherType::Ipv4,
            6u8,
            4u8,
            self.opcode,
            self.src_mac,
            self.src_ip,
            self.dest_mac,
            self.dest_ip,
        )
    }

    pub fn parse(input: &[u8]) -> FakenetResult<Self> {
        parse("arp packet", input, packet)
    }
}

fn packet(input: &[u8]) -> ParseResult<'_, Packet> {
    let (input, _) = verify(be_u16, |hrd: &u16| *hrd == HARDWARE_ETHERNET)(input)?;
    let (input, _) = verify(be_u16, |pro: &u16| *pro == u16::from(EtherType::Ipv4))(input)?;
    let (input, _) = verify(be_u8, |hln: &u8| *hln == 6)(input)?;
    let (input, _) = verify(be_u8, |pln: &u8| *pln == 4)(input)?;
    let (input, opcode) = be_u16(input)?;
    let (input, src_mac) = mac_address(input)?;
    let (input, src_ip) = ipv4_address(input)?;
    let (input, dest_mac) = mac_address(input)?;
    let (input, dest_ip) = ipv4_address(input)?;

    Ok((
        input,
        Packet {
            opcode: Opcode::from(opcode),
            src_mac,
            src_ip,
            dest_mac,
            dest_ip,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hexstring(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn request_packet_decodes() {
        assert_eq!(
            Packet::parse(&hexstring(
                "0001080006040001000af56dbc840a0001eb0000000000000a000002"
            ))
            .unwrap(),
            Packet {
                opcode: Opcode::Request,
                src_mac: MacAddress([0, 10, 245, 109, 188, 132]),
                src_ip: Ipv4Addr::new(10, 0, 1, 235),
                dest_mac: MacAddress([0, 0, 0, 0, 0, 0]),
                dest_ip: Ipv4Addr::new(10, 0, 0, 2),
            }
        );
    }

    #[test]
    fn reply_packet_decodes() {
        assert_eq!(
            Packet::parse(&hexstring(
                "0001080006040002b827ebb38fcf0a00012204d9f5f844e80a000168"
            ))
            .unwrap(),
            Packet {
                opcode: Opcode::Reply,
                src_mac: MacAddress([184, 39, 235, 179, 143, 207]),
                src_ip: Ipv4Addr::new(10, 0, 1, 34),
                dest_mac: MacAddress([4, 217, 245, 248, 68, 232]),
                dest_ip: Ipv4Addr::new(10, 0, 1, 104),
            }
        );
    }

    #[test]
    fn reply_packet_encodes() {
        let packet = Packet {
            opcode: Opcode::Reply,
            src_mac: MacAddress([184, 39, 235, 179, 143, 207]),
            src_ip: Ipv4Addr::new(10, 0, 1, 34),
            dest_mac: MacAddress([4, 217, 245, 248, 68, 232]),
            dest_ip: Ipv4Addr::new(10, 0, 1, 104),
        };
        assert_eq!(
            hex::encode(packet.encode()),
            "0001080006040002b827ebb38fcf0a00012204d9f5f844e80a000168"
        );
    }

    #[test]
    fn non_ethernet_hardware_is_rejected() {
        assert!(Packet::parse(&hexstring(
            "0006080006040001000af56dbc840a0001eb0000000000000a000002"
        ))
        .is_err());
    }
}
