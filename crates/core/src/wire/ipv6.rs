//! IPv6 header and hop-by-hop options (RFC 8200).

use super::codec::{ipv6_address, parse, round_up, Encode, ParseResult};
use crate::error::FakenetResult;
use crate::{encode, encode_to, proto_enum};
use nom::bytes::complete::take;
use nom::combinator::{all_consuming, verify};
use nom::multi::many0;
use nom::number::complete::{be_u16, be_u32, be_u8};
use std::net::Ipv6Addr;

pub const DEFAULT_HOP_LIMIT: u8 = 64;

// Ref: https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml
proto_enum! {
    pub enum NextHeader: u8 {
        HopByHopOptions = 0,
        Tcp = 6,
        Udp = 17,
        Icmpv6 = 58,
        NoNextHeader = 59,
    }
}

proto_enum! {
    pub enum HopByHopOptionType: u8 {
        Pad1 = 0,
        PadN = 1,
        RouterAlert = 5,
    }
}

// Ref: RFC 2711
proto_enum! {
    pub enum RouterAlertType: u16 {
        Mld = 0,
        Rsvp = 1,
        ActiveNetworks = 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopByHopOption {
    RouterAlert(RouterAlertType),
    Unknown { option_type: u8, data: Vec<u8> },
}

impl HopByHopOption {
    /// The two high-order bits of the option type: what a node that does not
    /// recognize the option must do with the packet. Zero means skip it.
    pub fn action(&self) -> u8 {
        match self {
            HopByHopOption::RouterAlert(_) => u8::from(HopByHopOptionType::RouterAlert) >> 6,
            HopByHopOption::Unknown { option_type, .. } => option_type >> 6,
        }
    }
}

impl Encode for HopByHopOption {
    fn encoded_len(&self) -> usize {
        2 + match self {
            HopByHopOption::RouterAlert(_) => 2,
            HopByHopOption::Unknown { data, .. } => data.len(),
        }
    }

    fn encode_to(&self, buf: &mut [u8]) {
        match self {
            HopByHopOption::RouterAlert(kind) => {
                encode_to!(buf, HopByHopOptionType::RouterAlert, 2u8, kind)
            }
            HopByHopOption::Unknown { option_type, data } => {
                let len = u8::try_from(data.len());
                debug_assert!(len.is_ok(), "hop-by-hop option data exceeds 255 bytes");
                encode_to!(buf, option_type, len.unwrap_or(u8::MAX), data)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionHeader {
    HopByHopOptions(Vec<HopByHopOption>),
}

impl ExtensionHeader {
    fn kind(&self) -> NextHeader {
        match self {
            ExtensionHeader::HopByHopOptions(_) => NextHeader::HopByHopOptions,
        }
    }

    /// Encodes the header, padded to a multiple of 8 octets with Pad1/PadN.
    fn encode(&self, next_header: NextHeader) -> Vec<u8> {
        match self {
            ExtensionHeader::HopByHopOptions(options) => {
                let mut encoded_options = encode!(options);
                let total_len = round_up(encoded_options.len() + 2, 8);
                let padding = total_len - 2 - encoded_options.len();

                match padding {
                    0 => {}
                    1 => encoded_options.push(u8::from(HopByHopOptionType::Pad1)),
                    n => {
                        encoded_options.push(u8::from(HopByHopOptionType::PadN));
                        encoded_options.push((n - 2) as u8);
                        encoded_options.resize(total_len - 2, 0u8);
                    }
                }

                encode!(next_header, (total_len / 8 - 1) as u8, encoded_options)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub traffic_class: u8,
    pub flow_label: u32,
    /// Protocol of `payload`, after all extension headers.
    pub next_header: NextHeader,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dest: Ipv6Addr,
    pub extension_headers: Vec<ExtensionHeader>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(src: Ipv6Addr, dest: Ipv6Addr, next_header: NextHeader, payload: Vec<u8>) -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header,
            hop_limit: DEFAULT_HOP_LIMIT,
            src,
            dest,
            extension_headers: Vec::new(),
            payload,
        }
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn with_traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    pub fn with_flow_label(mut self, flow_label: u32) -> Self {
        self.flow_label = flow_label & 0xfffff;
        self
    }

    pub fn with_extension_header(mut self, header: ExtensionHeader) -> Self {
        self.extension_headers.push(header);
        self
    }

    pub fn hop_by_hop_options(&self) -> impl Iterator<Item = &HopByHopOption> {
        self.extension_headers.iter().flat_map(|h| match h {
            ExtensionHeader::HopByHopOptions(options) => options.iter(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let prelude =
            (6u32 << 28) | (u32::from(self.traffic_class) << 20) | (self.flow_label & 0xfffff);

        let first_next_header = self
            .extension_headers
            .first()
            .map_or(self.next_header, ExtensionHeader::kind);

        let mut encoded_extension_headers = Vec::new();
        for (i, header) in self.extension_headers.iter().enumerate() {
            let next_header = self
                .extension_headers
                .get(i + 1)
                .map_or(self.next_header, ExtensionHeader::kind);
            encoded_extension_headers.extend(header.encode(next_header));
        }

        encode!(
            prelude,
            (encoded_extension_headers.len() + self.payload.len()) as u16,
            first_next_header,
            self.hop_limit,
            self.src,
            self.dest,
            encoded_extension_headers,
            self.payload,
        )
    }

    /// Parses a packet, ignoring any bytes past `payload_length` (link padding).
    pub fn parse(input: &[u8]) -> FakenetResult<Self> {
        parse("ipv6 packet", input, packet)
    }
}

fn hop_by_hop_option(input: &[u8]) -> ParseResult<'_, Option<HopByHopOption>> {
    let (input, option_type) = be_u8(input)?;
    if HopByHopOptionType::from(option_type) == HopByHopOptionType::Pad1 {
        return Ok((input, None));
    }

    let (input, option_len) = be_u8(input)?;
    let (input, data) = take(option_len)(input)?;

    let option = match HopByHopOptionType::from(option_type) {
        HopByHopOptionType::PadN => None,
        HopByHopOptionType::RouterAlert => {
            let (_, value) = all_consuming(be_u16)(data)?;
            Some(HopByHopOption::RouterAlert(RouterAlertType::from(value)))
        }
        _ => Some(HopByHopOption::Unknown {
            option_type,
            data: data.to_vec(),
        }),
    };

    Ok((input, option))
}

fn hop_by_hop_header(input: &[u8]) -> ParseResult<'_, (NextHeader, ExtensionHeader)> {
    let (input, next_header) = be_u8(input)?;
    let (input, header_len) = be_u8(input)?;
    let (input, option_bytes) = take(usize::from(header_len) * 8 + 6)(input)?;
    let (_, options) = all_consuming(many0(hop_by_hop_option))(option_bytes)?;

    Ok((
        input,
        (
            NextHeader::from(next_header),
            ExtensionHeader::HopByHopOptions(options.into_iter().flatten().collect()),
        ),
    ))
}

fn packet(input: &[u8]) -> ParseResult<'_, Packet> {
    let (input, prelude) = verify(be_u32, |p: &u32| p >> 28 == 6)(input)?;
    let (input, payload_length) = be_u16(input)?;
    let (input, next_header) = be_u8(input)?;
    let (input, hop_limit) = be_u8(input)?;
    let (input, src) = ipv6_address(input)?;
    let (input, dest) = ipv6_address(input)?;
    let (rest, mut body) = take(payload_length)(input)?;

    let mut next_header = NextHeader::from(next_header);
    let mut extension_headers = Vec::new();

    while next_header == NextHeader::HopByHopOptions {
        let (remaining, (following, header)) = hop_by_hop_header(body)?;
        extension_headers.push(header);
        next_header = following;
        body = remaining;
    }

    Ok((
        rest,
        Packet {
            traffic_class: ((prelude >> 20) & 0xff) as u8,
            flow_label: prelude & 0xfffff,
            next_header,
            hop_limit,
            src,
            dest,
            extension_headers,
            payload: body.to_vec(),
        },
    ))
}
