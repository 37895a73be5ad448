//! ICMPv6 (RFC 4443) with Neighbor Discovery (RFC 4861) and MLDv2 (RFC 3810)
//! message bodies.

use super::codec::{
    ipv6_address, mac_address, parse, pseudo_header_checksum, round_up, Encode, ParseResult,
};
use super::ipv6::NextHeader;
use crate::addr::MacAddress;
use crate::error::{FakenetError, FakenetResult};
use crate::{encode, encode_to, proto_enum};
use nom::bytes::complete::take;
use nom::combinator::{all_consuming, verify};
use nom::multi::{count, many0};
use nom::number::complete::{be_u16, be_u32, be_u8};
use std::net::Ipv6Addr;

proto_enum! {
    pub enum MessageType: u8 {
        DestinationUnreachable = 1,
        PacketTooBig = 2,
        TimeExceeded = 3,
        ParameterProblem = 4,
        EchoRequest = 128,
        EchoReply = 129,
        MulticastListenerQuery = 130,
        RouterSolicitation = 133,
        RouterAdvertisement = 134,
        NeighborSolicitation = 135,
        NeighborAdvertisement = 136,
        Redirect = 137,
        MldV2Report = 143,
    }
}

impl MessageType {
    /// ND messages carry code 0; anything else is invalid (RFC 4861 §6.1, §7.1).
    fn is_neighbor_discovery(self) -> bool {
        matches!(
            self,
            MessageType::RouterSolicitation
                | MessageType::RouterAdvertisement
                | MessageType::NeighborSolicitation
                | MessageType::NeighborAdvertisement
                | MessageType::Redirect
        )
    }
}

proto_enum! {
    pub enum NdOptionType: u8 {
        SourceLinkLayerAddress = 1,
        TargetLinkLayerAddress = 2,
        PrefixInformation = 3,
        RedirectedHeader = 4,
        Mtu = 5,
        Nonce = 14,
    }
}

proto_enum! {
    pub enum MldRecordType: u8 {
        ModeIsInclude = 1,
        ModeIsExclude = 2,
        ChangeToInclude = 3,
        ChangeToExclude = 4,
        AllowNewSources = 5,
        BlockOldSources = 6,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixInformation {
    pub prefix_length: u8,
    pub on_link: bool,
    pub autonomous: bool,
    /// Seconds; `u32::MAX` is infinity.
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub prefix: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdOption {
    SourceLinkLayerAddress(MacAddress),
    TargetLinkLayerAddress(MacAddress),
    PrefixInformation(PrefixInformation),
    Mtu(u32),
    Nonce(Vec<u8>),
    Unknown { option_type: u8, data: Vec<u8> },
}

impl NdOption {
    fn option_type(&self) -> NdOptionType {
        match self {
            NdOption::SourceLinkLayerAddress(_) => NdOptionType::SourceLinkLayerAddress,
            NdOption::TargetLinkLayerAddress(_) => NdOptionType::TargetLinkLayerAddress,
            NdOption::PrefixInformation(_) => NdOptionType::PrefixInformation,
            NdOption::Mtu(_) => NdOptionType::Mtu,
            NdOption::Nonce(_) => NdOptionType::Nonce,
            NdOption::Unknown { option_type, .. } => NdOptionType::from(*option_type),
        }
    }

    fn body_len(&self) -> usize {
        match self {
            NdOption::SourceLinkLayerAddress(_) | NdOption::TargetLinkLayerAddress(_) => 6,
            NdOption::PrefixInformation(_) => 30,
            NdOption::Mtu(_) => 6,
            NdOption::Nonce(data) | NdOption::Unknown { data, .. } => data.len(),
        }
    }
}

impl Encode for NdOption {
    fn encoded_len(&self) -> usize {
        round_up(2 + self.body_len(), 8)
    }

    fn encode_to(&self, buf: &mut [u8]) {
        let units = u8::try_from(self.encoded_len() / 8);
        debug_assert!(units.is_ok(), "nd option exceeds 2040 bytes");
        let units = units.unwrap_or(u8::MAX);
        let (header, body) = buf.split_at_mut(2);
        encode_to!(header, self.option_type(), units);

        match self {
            NdOption::SourceLinkLayerAddress(mac) | NdOption::TargetLinkLayerAddress(mac) => {
                encode_to!(body, mac)
            }
            NdOption::PrefixInformation(info) => {
                let flags = if info.on_link { 0x80u8 } else { 0 }
                    | if info.autonomous { 0x40u8 } else { 0 };
                encode_to!(
                    body,
                    info.prefix_length,
                    flags,
                    info.valid_lifetime,
                    info.preferred_lifetime,
                    0u32,
                    info.prefix,
                )
            }
            NdOption::Mtu(mtu) => encode_to!(body, 0u16, mtu),
            NdOption::Nonce(data) | NdOption::Unknown { data, .. } => {
                body[..data.len()].copy_from_slice(data);
                body[data.len()..].fill(0);
            }
        }
    }
}

/// Finds the first option matching `pick`.
pub fn find_option<'a, T>(
    options: &'a [NdOption],
    pick: impl Fn(&'a NdOption) -> Option<T>,
) -> Option<T> {
    options.iter().find_map(pick)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MldRecord {
    pub record_type: MldRecordType,
    pub multicast_address: Ipv6Addr,
    pub sources: Vec<Ipv6Addr>,
}

impl Encode for MldRecord {
    fn encoded_len(&self) -> usize {
        4 + 16 + 16 * self.sources.len()
    }

    fn encode_to(&self, buf: &mut [u8]) {
        encode_to!(
            buf,
            self.record_type,
            0u8,
            self.sources.len() as u16,
            self.multicast_address,
            self.sources,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub identifier: u16,
    pub sequence: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAdvertisement {
    pub cur_hop_limit: u8,
    pub managed: bool,
    pub other: bool,
    pub router_lifetime: u16,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub options: Vec<NdOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    EchoRequest(Echo),
    EchoReply(Echo),
    /// MLD general (`::`) or address-specific query.
    MulticastListenerQuery {
        multicast_address: Ipv6Addr,
    },
    RouterSolicitation {
        options: Vec<NdOption>,
    },
    RouterAdvertisement(RouterAdvertisement),
    NeighborSolicitation {
        target: Ipv6Addr,
        options: Vec<NdOption>,
    },
    NeighborAdvertisement {
        router: bool,
        solicited: bool,
        override_flag: bool,
        target: Ipv6Addr,
        options: Vec<NdOption>,
    },
    MldV2Report(Vec<MldRecord>),
    Other {
        message_type: MessageType,
        code: u8,
        body: Vec<u8>,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::EchoRequest(_) => MessageType::EchoRequest,
            Message::EchoReply(_) => MessageType::EchoReply,
            Message::MulticastListenerQuery { .. } => MessageType::MulticastListenerQuery,
            Message::RouterSolicitation { .. } => MessageType::RouterSolicitation,
            Message::RouterAdvertisement(_) => MessageType::RouterAdvertisement,
            Message::NeighborSolicitation { .. } => MessageType::NeighborSolicitation,
            Message::NeighborAdvertisement { .. } => MessageType::NeighborAdvertisement,
            Message::MldV2Report(_) => MessageType::MldV2Report,
            Message::Other { message_type, .. } => *message_type,
        }
    }

    /// Encodes the message with its checksum computed for `src` -> `dest`.
    pub fn encode(&self, src: &Ipv6Addr, dest: &Ipv6Addr) -> Vec<u8> {
        let message_type = self.message_type();

        let mut bytes = match self {
            Message::EchoRequest(echo) | Message::EchoReply(echo) => encode!(
                message_type,
                0u8,
                0u16,
                echo.identifier,
                echo.sequence,
                echo.data,
            ),
            Message::MulticastListenerQuery { multicast_address } => {
                encode!(message_type, 0u8, 0u16, 0u16, 0u16, multicast_address)
            }
            Message::RouterSolicitation { options } => {
                encode!(message_type, 0u8, 0u16, 0u32, options)
            }
            Message::RouterAdvertisement(ra) => {
                let flags = if ra.managed { 0x80u8 } else { 0 } | if ra.other { 0x40u8 } else { 0 };
                encode!(
                    message_type,
                    0u8,
                    0u16,
                    ra.cur_hop_limit,
                    flags,
                    ra.router_lifetime,
                    ra.reachable_time,
                    ra.retrans_timer,
                    ra.options,
                )
            }
            Message::NeighborSolicitation { target, options } => {
                encode!(message_type, 0u8, 0u16, 0u32, target, options)
            }
            Message::NeighborAdvertisement {
                router,
                solicited,
                override_flag,
                target,
                options,
            } => {
                let flags = if *router { 0x8000_0000u32 } else { 0 }
                    | if *solicited { 0x4000_0000u32 } else { 0 }
                    | if *override_flag { 0x2000_0000u32 } else { 0 };
                encode!(message_type, 0u8, 0u16, flags, target, options)
            }
            Message::MldV2Report(records) => {
                encode!(message_type, 0u8, 0u16, 0u16, records.len() as u16, records)
            }
            Message::Other { code, body, .. } => encode!(message_type, code, 0u16, body),
        };

        let checksum = pseudo_header_checksum(src, dest, u8::from(NextHeader::Icmpv6), &bytes);
        bytes[2..4].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    /// Verifies the checksum for `src` -> `dest` and parses the message.
    pub fn parse(input: &[u8], src: &Ipv6Addr, dest: &Ipv6Addr) -> FakenetResult<Self> {
        if pseudo_header_checksum(src, dest, u8::from(NextHeader::Icmpv6), input) != 0 {
            return Err(FakenetError::Parse("icmpv6 checksum mismatch".to_string()));
        }
        parse("icmpv6 message", input, message)
    }
}

fn nd_option(input: &[u8]) -> ParseResult<'_, NdOption> {
    let (input, option_type) = be_u8(input)?;
    let (input, units) = verify(be_u8, |units: &u8| *units != 0)(input)?;
    let (input, body) = take(usize::from(units) * 8 - 2)(input)?;

    let option = match NdOptionType::from(option_type) {
        NdOptionType::SourceLinkLayerAddress => {
            NdOption::SourceLinkLayerAddress(mac_address(body)?.1)
        }
        NdOptionType::TargetLinkLayerAddress => {
            NdOption::TargetLinkLayerAddress(mac_address(body)?.1)
        }
        NdOptionType::PrefixInformation => NdOption::PrefixInformation(prefix_information(body)?.1),
        NdOptionType::Mtu => {
            let (body, _) = be_u16(body)?;
            NdOption::Mtu(be_u32(body)?.1)
        }
        NdOptionType::Nonce => NdOption::Nonce(body.to_vec()),
        _ => NdOption::Unknown {
            option_type,
            data: body.to_vec(),
        },
    };

    Ok((input, option))
}

fn nd_options(input: &[u8]) -> ParseResult<'_, Vec<NdOption>> {
    all_consuming(many0(nd_option))(input)
}

fn prefix_information(input: &[u8]) -> ParseResult<'_, PrefixInformation> {
    let (input, prefix_length) = be_u8(input)?;
    let (input, flags) = be_u8(input)?;
    let (input, valid_lifetime) = be_u32(input)?;
    let (input, preferred_lifetime) = be_u32(input)?;
    let (input, _) = be_u32(input)?;
    let (input, prefix) = ipv6_address(input)?;

    Ok((
        input,
        PrefixInformation {
            prefix_length,
            on_link: flags & 0x80 != 0,
            autonomous: flags & 0x40 != 0,
            valid_lifetime,
            preferred_lifetime,
            prefix,
        },
    ))
}

fn mld_record(input: &[u8]) -> ParseResult<'_, MldRecord> {
    let (input, record_type) = be_u8(input)?;
    let (input, aux_data_len) = be_u8(input)?;
    let (input, source_count) = be_u16(input)?;
    let (input, multicast_address) = ipv6_address(input)?;
    let (input, sources) = count(ipv6_address, usize::from(source_count))(input)?;
    let (input, _) = take(usize::from(aux_data_len) * 4)(input)?;

    Ok((
        input,
        MldRecord {
            record_type: MldRecordType::from(record_type),
            multicast_address,
            sources,
        },
    ))
}

fn echo(input: &[u8]) -> ParseResult<'_, Echo> {
    let (input, identifier) = be_u16(input)?;
    let (input, sequence) = be_u16(input)?;

    Ok((
        &input[input.len()..],
        Echo {
            identifier,
            sequence,
            data: input.to_vec(),
        },
    ))
}

fn message(input: &[u8]) -> ParseResult<'_, Message> {
    let (input, message_type) = be_u8(input)?;
    let message_type = MessageType::from(message_type);
    let (input, code) = verify(be_u8, |code: &u8| {
        !message_type.is_neighbor_discovery() || *code == 0
    })(input)?;
    let (body, _checksum) = be_u16(input)?;

    match message_type {
        MessageType::EchoRequest => {
            let (rest, echo) = echo(body)?;
            Ok((rest, Message::EchoRequest(echo)))
        }
        MessageType::EchoReply => {
            let (rest, echo) = echo(body)?;
            Ok((rest, Message::EchoReply(echo)))
        }
        MessageType::MulticastListenerQuery => {
            let (input, _max_response_code) = be_u16(body)?;
            let (input, _) = be_u16(input)?;
            let (input, multicast_address) = ipv6_address(input)?;
            // MLDv2 queries carry source lists past this point.
            Ok((
                &input[input.len()..],
                Message::MulticastListenerQuery { multicast_address },
            ))
        }
        MessageType::RouterSolicitation => {
            let (input, _) = be_u32(body)?;
            let (input, options) = nd_options(input)?;
            Ok((input, Message::RouterSolicitation { options }))
        }
        MessageType::RouterAdvertisement => {
            let (input, cur_hop_limit) = be_u8(body)?;
            let (input, flags) = be_u8(input)?;
            let (input, router_lifetime) = be_u16(input)?;
            let (input, reachable_time) = be_u32(input)?;
            let (input, retrans_timer) = be_u32(input)?;
            let (input, options) = nd_options(input)?;
            Ok((
                input,
                Message::RouterAdvertisement(RouterAdvertisement {
                    cur_hop_limit,
                    managed: flags & 0x80 != 0,
                    other: flags & 0x40 != 0,
                    router_lifetime,
                    reachable_time,
                    retrans_timer,
                    options,
                }),
            ))
        }
        MessageType::NeighborSolicitation => {
            let (input, _) = be_u32(body)?;
            let (input, target) = ipv6_address(input)?;
            let (input, options) = nd_options(input)?;
            Ok((input, Message::NeighborSolicitation { target, options }))
        }
        MessageType::NeighborAdvertisement => {
            let (input, flags) = be_u32(body)?;
            let (input, target) = ipv6_address(input)?;
            let (input, options) = nd_options(input)?;
            Ok((
                input,
                Message::NeighborAdvertisement {
                    router: flags & 0x8000_0000 != 0,
                    solicited: flags & 0x4000_0000 != 0,
                    override_flag: flags & 0x2000_0000 != 0,
                    target,
                    options,
                },
            ))
        }
        MessageType::MldV2Report => {
            let (input, _) = be_u16(body)?;
            let (input, record_count) = be_u16(input)?;
            let (input, records) = count(mld_record, usize::from(record_count))(input)?;
            Ok((input, Message::MldV2Report(records)))
        }
        _ => Ok((
            &body[body.len()..],
            Message::Other {
                message_type,
                code,
                body: body.to_vec(),
            },
        )),
    }
}
