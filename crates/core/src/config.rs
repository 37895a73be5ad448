//! Network description loaded from TOML.

use crate::addr::MacAddress;
use crate::error::{FakenetError, FakenetResult};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub node: NodeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub ether_address: MacAddress,
    #[serde(default)]
    pub ipv4_address: Option<Ipv4Addr>,
    /// Requested TAP interface name; the kernel picks `tapN` when unset.
    #[serde(default)]
    pub tap_name: Option<String>,
    #[serde(default)]
    pub ipv6: Ipv6Config,
}

/// How the low 64 bits of autoconfigured addresses are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceIdMode {
    #[default]
    Random,
    Eui64,
}

/// RFC 4861 / RFC 4862 host constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Ipv6Config {
    pub interface_id: InterfaceIdMode,
    pub dup_addr_detect_transmits: u8,
    pub retrans_timer_ms: u64,
    pub max_rtr_solicitation_delay_ms: u64,
    pub rtr_solicitation_interval_ms: u64,
    pub max_rtr_solicitations: u8,
}

impl Default for Ipv6Config {
    fn default() -> Self {
        Self {
            interface_id: InterfaceIdMode::Random,
            dup_addr_detect_transmits: 1,
            retrans_timer_ms: 1_000,
            max_rtr_solicitation_delay_ms: 1_000,
            rtr_solicitation_interval_ms: 4_000,
            max_rtr_solicitations: 3,
        }
    }
}

impl Ipv6Config {
    pub fn retrans_timer(&self) -> Duration {
        Duration::from_millis(self.retrans_timer_ms)
    }

    pub fn max_rtr_solicitation_delay(&self) -> Duration {
        Duration::from_millis(self.max_rtr_solicitation_delay_ms)
    }

    pub fn rtr_solicitation_interval(&self) -> Duration {
        Duration::from_millis(self.rtr_solicitation_interval_ms)
    }
}

impl NetworkConfig {
    pub fn from_toml(s: &str) -> FakenetResult<Self> {
        toml::from_str(s).map_err(|e| FakenetError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> FakenetResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FakenetError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }
}
