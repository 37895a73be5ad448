//! Domain models, shared types, wire codecs and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod addr;
pub mod config;
pub mod error;
pub mod types;
pub mod wire;

pub use addr::{Ipv6AddrExt, MacAddress};
pub use config::{InterfaceIdMode, Ipv6Config, NetworkConfig, NodeConfig};
pub use error::{FakenetError, FakenetResult};
pub use types::{AddressOrigin, AddressState, AddressStatus};
