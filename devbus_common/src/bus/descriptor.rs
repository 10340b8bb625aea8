//! Static device catalog.
//!
//! A [`DeviceDescriptor`] is defined once (in code or in `devbus.toml`) and is
//! never mutated afterwards. The [`DeviceCatalog`] is the ordered list the
//! registry walks at startup; it is passed in by value so tests can supply
//! synthetic catalogs.

use crate::bus::address::BusAddress;
use crate::consts::{ADS1115_ADDR, PCF8574_ADDR, REFERENCE_BUS_ID, TCA9555_ADDR};
use serde::{Deserialize, Serialize};

/// Immutable `{name, address}` record for one peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescriptor {
    name: String,
    address: BusAddress,
}

impl DeviceDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, address: BusAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Symbolic name (also the chip type, e.g. `"tca9555"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus address of the device.
    pub fn address(&self) -> BusAddress {
        self.address
    }
}

/// Ordered list of devices on one bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCatalog {
    bus_id: u8,
    devices: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    /// Create a catalog for `bus_id`. Order of `devices` is registration order.
    pub fn new(bus_id: u8, devices: Vec<DeviceDescriptor>) -> Self {
        Self { bus_id, devices }
    }

    /// The reference board: TCA9555 (0x20), PCF8574 (0x21), ADS1115 (0x48) on bus 1.
    pub fn reference() -> Self {
        let entries = [
            ("tca9555", TCA9555_ADDR),
            ("pcf8574", PCF8574_ADDR),
            ("ads1115", ADS1115_ADDR),
        ];
        let devices = entries
            .into_iter()
            .filter_map(|(name, raw)| BusAddress::new(raw).map(|a| DeviceDescriptor::new(name, a)))
            .collect();
        Self::new(REFERENCE_BUS_ID, devices)
    }

    /// Bus these devices live on.
    pub fn bus_id(&self) -> u8 {
        self.bus_id
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, DeviceDescriptor> {
        self.devices.iter()
    }

    /// Look up a descriptor by name.
    pub fn find(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if the catalog has no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeviceCatalog {
    type Item = &'a DeviceDescriptor;
    type IntoIter = std::slice::Iter<'a, DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_catalog_order_and_addresses() {
        let catalog = DeviceCatalog::reference();
        assert_eq!(catalog.bus_id(), 1);

        let entries: Vec<(&str, u8)> = catalog
            .iter()
            .map(|d| (d.name(), d.address().get()))
            .collect();
        assert_eq!(
            entries,
            vec![("tca9555", 0x20), ("pcf8574", 0x21), ("ads1115", 0x48)]
        );
    }

    #[test]
    fn find_by_name() {
        let catalog = DeviceCatalog::reference();
        assert_eq!(catalog.find("ads1115").map(|d| d.address().get()), Some(0x48));
        assert!(catalog.find("mcp23017").is_none());
    }
}
