//! Wire formats. Each module parses from and encodes to raw bytes; none of
//! them perform I/O.

pub mod arp;
pub mod codec;
pub mod ether;
pub mod icmpv6;
pub mod ipv6;
pub mod udp;

pub use codec::{hexdump, Encode};
pub use ether::{EtherType, Frame, FRAME_SIZE, MTU};
pub use ipv6::NextHeader;
