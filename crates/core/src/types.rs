//! Address bookkeeping types shared by the IPv6 node and the status stream.

use serde::Serialize;
use std::fmt;

/// Lifecycle of an autoconfigured address (RFC 4862 §2).
///
/// `New` addresses wait for the DAD delay; nothing is sent for them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressState {
    New,
    Tentative,
    Valid,
    Deprecated,
    Duplicate,
}

impl AddressState {
    /// Whether packets addressed here are ours.
    #[inline]
    pub fn is_assigned(self) -> bool {
        matches!(self, AddressState::Valid | AddressState::Deprecated)
    }
}

impl fmt::Display for AddressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressState::New => "new",
            AddressState::Tentative => "tentative",
            AddressState::Valid => "valid",
            AddressState::Deprecated => "deprecated",
            AddressState::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressOrigin {
    LinkLocal,
    Autoconf,
}

/// What the status stream shows for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressStatus {
    pub state: AddressState,
    pub origin: AddressOrigin,
    pub prefix_length: u8,
}
