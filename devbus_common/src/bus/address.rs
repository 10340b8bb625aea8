//! 7-bit bus address.

use crate::bus::error::BusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 7-bit device address (0x00 - 0x7F).
///
/// Constructed through [`BusAddress::new`] or `TryFrom<u8>`, so an out of
/// range value can never reach the adapter. Deserializes from a plain TOML
/// integer (`address = 0x20`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusAddress(u8);

impl BusAddress {
    /// Highest valid 7-bit address.
    pub const MAX: u8 = 0x7F;

    /// Create an address, returning `None` if `raw` does not fit in 7 bits.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Raw 7-bit value.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = BusError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| {
            BusError::InvalidArgument(format!(
                "bus address 0x{raw:02x} exceeds 7-bit range (max 0x{:02x})",
                Self::MAX
            ))
        })
    }
}

impl From<BusAddress> for u8 {
    fn from(address: BusAddress) -> Self {
        address.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}
