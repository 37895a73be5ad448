//! Link-layer and IPv6 address helpers.

use crate::error::{FakenetError, FakenetResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Ethernet
// ---------------------------------------------------------------------------

/// A 48-bit IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Group bit of the first octet.
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = FakenetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| FakenetError::InvalidInput(format!("MAC address too short: {s}")))?;
            if part.len() != 2 {
                return Err(FakenetError::InvalidInput(format!(
                    "MAC address field must be two hex digits: {s}"
                )));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|e| FakenetError::InvalidInput(format!("bad MAC address {s}: {e}")))?;
        }

        if parts.next().is_some() {
            return Err(FakenetError::InvalidInput(format!(
                "MAC address too long: {s}"
            )));
        }

        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// IPv6
// ---------------------------------------------------------------------------

/// `ff02::1:ff00:0/104`
const SOLICITED_NODE_PREFIX: u128 = 0xff02_0000_0000_0000_0000_0001_ff00_0000;

pub const LINK_LOCAL_PREFIX: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0);
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);
pub const ALL_MLDV2_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x16);

/// Bit-level operations on IPv6 addresses used by address autoconfiguration.
pub trait Ipv6AddrExt: Sized {
    /// Keeps the top `len` bits.
    fn prefix(&self, len: u8) -> Self;

    /// Keeps the low `len` bits.
    fn suffix(&self, len: u8) -> Self;

    /// ORs an interface identifier (`self`) into a subnet prefix.
    ///
    /// Fails if the prefix and the identifier share any set bit.
    fn combine_subnet(&self, subnet: &Self) -> FakenetResult<Self>;

    fn solicited_node_multicast(&self) -> Self;

    /// RFC 2464 §7 mapping of a multicast group to its Ethernet address.
    fn multicast_mac(&self) -> MacAddress;

    fn is_link_local_unicast(&self) -> bool;
}

impl Ipv6AddrExt for Ipv6Addr {
    fn prefix(&self, len: u8) -> Self {
        let len = u32::from(len.min(128));
        let mask = u128::MAX.checked_shl(128 - len).unwrap_or(0);
        Ipv6Addr::from(u128::from(*self) & mask)
    }

    fn suffix(&self, len: u8) -> Self {
        let len = u32::from(len.min(128));
        let mask = u128::MAX.checked_shr(128 - len).unwrap_or(0);
        Ipv6Addr::from(u128::from(*self) & mask)
    }

    fn combine_subnet(&self, subnet: &Self) -> FakenetResult<Self> {
        let subnet_bits = u128::from(*subnet);
        let interface_bits = u128::from(*self);

        if subnet_bits & interface_bits != 0 {
            return Err(FakenetError::InvalidInput(format!(
                "subnet {subnet} and interface ID {self} overlap"
            )));
        }

        Ok(Ipv6Addr::from(subnet_bits | interface_bits))
    }

    fn solicited_node_multicast(&self) -> Self {
        Ipv6Addr::from(SOLICITED_NODE_PREFIX | u128::from(self.suffix(24)))
    }

    fn multicast_mac(&self) -> MacAddress {
        let o = self.octets();
        MacAddress([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }

    fn is_link_local_unicast(&self) -> bool {
        self.prefix(10) == LINK_LOCAL_PREFIX
    }
}

/// A random 64-bit interface identifier, as the low half of an address.
pub fn interface_id_random(rng: &mut impl rand::Rng) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(rng.gen::<u64>()))
}

/// Modified EUI-64 interface identifier (RFC 4291 Appendix A).
pub fn interface_id_eui64(mac: &MacAddress) -> Ipv6Addr {
    let m = mac.0;
    let eui = [m[0] ^ 0x02, m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]];
    Ipv6Addr::from(u128::from(u64::from_be_bytes(eui)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv6a(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn mac_parses_and_displays() {
        let mac: MacAddress = "02:AB:00:0c:41:7a".parse().unwrap();
        assert_eq!(mac, MacAddress([0x02, 0xab, 0x00, 0x0c, 0x41, 0x7a]));
        assert_eq!(mac.to_string(), "02:ab:00:0c:41:7a");
    }

    #[test]
    fn mac_rejects_malformed_input() {
        assert!("02:ab:00:0c:41".parse::<MacAddress>().is_err());
        assert!("02:ab:00:0c:41:7a:00".parse::<MacAddress>().is_err());
        assert!("2:ab:00:0c:41:7a".parse::<MacAddress>().is_err());
        assert!("zz:ab:00:0c:41:7a".parse::<MacAddress>().is_err());
    }

    #[test]
    fn mac_group_bit() {
        assert!(MacAddress::BROADCAST.is_multicast());
        assert!(MacAddress([0x33, 0x33, 0, 0, 0, 1]).is_multicast());
        assert!(!MacAddress([0x02, 0, 0, 0, 0, 1]).is_multicast());
    }

    #[test]
    fn combine_subnet_works_on_trivial_input() {
        assert_eq!(
            ipv6a("::1").combine_subnet(&ipv6a("f840::")).unwrap(),
            ipv6a("f840::1"),
        );
        assert_eq!(
            ipv6a("::54:3210:fedc:ba98:7654:3210")
                .combine_subnet(&ipv6a("fedc:ba98:7600::"))
                .unwrap(),
            ipv6a("fedc:ba98:7654:3210:fedc:ba98:7654:3210"),
        );
    }

    #[test]
    fn combine_subnet_rejects_overlap() {
        assert!(ipv6a("::bbbb:aaaa:9999:8888:7777")
            .combine_subnet(&ipv6a("ffff:eeee:dddd:cccc:bbbb::"))
            .is_err());
    }

    #[test]
    fn suffix_gets_exactly_the_desired_bits() {
        let a = ipv6a("fedc:ba98:7654:3210:fedc:ba98:7654:3210");
        assert_eq!(a.suffix(128), a);
        assert_eq!(a.suffix(88), ipv6a("::54:3210:fedc:ba98:7654:3210"));
        assert_eq!(a.suffix(30), ipv6a("::3654:3210"));
        assert_eq!(a.suffix(0), ipv6a("::"));
    }

    #[test]
    fn prefix_gets_exactly_the_desired_bits() {
        let a = ipv6a("fedc:ba98:7654:3210:fedc:ba98:7654:3210");
        assert_eq!(a.prefix(128), a);
        assert_eq!(a.prefix(88), ipv6a("fedc:ba98:7654:3210:fedc:ba00::"));
        assert_eq!(a.prefix(30), ipv6a("fedc:ba98::"));
        assert_eq!(a.prefix(0), ipv6a("::"));
    }

    #[test]
    fn solicited_node_multicast_preserves_lowest_bits() {
        assert_eq!(
            ipv6a("1080::8:800:200c:417a").solicited_node_multicast(),
            ipv6a("ff02::1:ff0c:417a"),
        );
        assert_eq!(
            ipv6a("2601::101").solicited_node_multicast(),
            ipv6a("ff02::1:ff00:101"),
        );
        assert_eq!(
            ipv6a("fedc:ba98:7654:3210:fedc:ba98:7654:3210").solicited_node_multicast(),
            ipv6a("ff02::1:ff54:3210"),
        );
    }

    #[test]
    fn multicast_mac_preserves_lowest_bits() {
        assert_eq!(
            ipv6a("ff02::1:ff0c:417a").multicast_mac(),
            "33:33:ff:0c:41:7a".parse().unwrap(),
        );
        assert_eq!(
            ipv6a("ff01::1").multicast_mac(),
            "33:33:00:00:00:01".parse().unwrap(),
        );
        assert_eq!(
            ipv6a("ff02::db8:f339:f002").multicast_mac(),
            "33:33:f3:39:f0:02".parse().unwrap(),
        );
    }

    #[test]
    fn link_local_detection() {
        assert!(ipv6a("fe80::1").is_link_local_unicast());
        assert!(ipv6a("febf::1").is_link_local_unicast());
        assert!(!ipv6a("fec0::1").is_link_local_unicast());
        assert!(!ipv6a("2001:db8::1").is_link_local_unicast());
    }

    #[test]
    fn eui64_flips_universal_local_bit() {
        let mac: MacAddress = "00:0a:f5:6d:bc:84".parse().unwrap();
        assert_eq!(interface_id_eui64(&mac), ipv6a("::20a:f5ff:fe6d:bc84"));
    }

    #[test]
    fn random_interface_id_fits_in_low_half() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            assert_eq!(interface_id_random(&mut rng).prefix(64), ipv6a("::"));
        }
    }
}
