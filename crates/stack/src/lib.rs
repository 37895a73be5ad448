//! Protocol actors for fakenet: Ethernet dispatch, ARP, IPv6 autoconfiguration,
//! UDP and the status stream.

pub mod arp;
pub mod dispatch;
pub mod interface;
pub mod ipv6;
pub mod node;
pub mod status;
pub mod udp;

pub use node::{Node, NodeHandle};
pub use status::StatusBoard;
pub use udp::{Received, UdpEndpoint};
