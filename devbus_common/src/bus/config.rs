//! `devbus.toml` configuration.
//!
//! ```toml
//! [shared]
//! service_name = "devbus"
//!
//! [bus]
//! id = 1
//!
//! [[devices]]
//! name = "tca9555"
//! address = 0x20
//!
//! [self_test]
//! enabled = true
//! ```

use crate::bus::descriptor::{DeviceCatalog, DeviceDescriptor};
use crate::config::{ConfigError, ConfigLoader, SharedConfig};
use crate::consts::REFERENCE_BUS_ID;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_bus_id() -> u8 {
    REFERENCE_BUS_ID
}

fn default_true() -> bool {
    true
}

/// Bus selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Bus number (`/dev/i2c-<id>`).
    #[serde(default = "default_bus_id")]
    pub id: u8,

    /// Also instantiate kernel clients through sysfs `new_device` on the
    /// Linux adapter. Off by default.
    #[serde(default)]
    pub instantiate_kernel_clients: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            id: default_bus_id(),
            instantiate_kernel_clients: false,
        }
    }
}

/// Startup self-test switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfTestConfig {
    /// Run the self-test after registration.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete configuration loaded from `devbus.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevbusConfig {
    /// Logging and instance naming.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Bus selection.
    #[serde(default)]
    pub bus: BusConfig,

    /// Device catalog in registration order.
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,

    /// Self-test settings.
    #[serde(default)]
    pub self_test: SelfTestConfig,
}

impl DevbusConfig {
    /// Configuration of the reference board, used when no file is present.
    pub fn reference() -> Self {
        let catalog = DeviceCatalog::reference();
        Self {
            shared: SharedConfig::default(),
            bus: BusConfig {
                id: catalog.bus_id(),
                instantiate_kernel_clients: false,
            },
            devices: catalog.iter().cloned().collect(),
            self_test: SelfTestConfig::default(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` not empty
    /// 2. at least one device
    /// 3. device names not empty and unique
    ///
    /// Two devices sharing an address is accepted here; the adapter refuses the
    /// second one at registration time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.devices.is_empty() {
            return Err(ConfigError::ValidationError(
                "no devices configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "device at {} has an empty name",
                    device.address()
                )));
            }
            if !names.insert(device.name()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate device name: {}",
                    device.name()
                )));
            }
        }
        Ok(())
    }

    /// Device catalog for the configured bus.
    pub fn catalog(&self) -> DeviceCatalog {
        DeviceCatalog::new(self.bus.id, self.devices.clone())
    }
}

impl Default for DevbusConfig {
    fn default() -> Self {
        Self::reference()
    }
}
