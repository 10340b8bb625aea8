//! Device manager: start/stop lifecycle.
//!
//! The `DeviceManager` owns the configuration, the bus host and the single
//! [`DeviceRegistry`] instance. `start()` registers the catalog and runs the
//! self-test; `stop()` deregisters whatever is still registered. Neither can
//! fail: partial registration and self-test failures are reported, not raised.

use crate::device_registry::{DeviceRegistry, RegistrationReport};
use crate::handle::DeviceHandle;
use crate::self_test::{SelfTestReport, SelfTestRunner};
use devbus_common::bus::adapter::BusHost;
use devbus_common::bus::config::DevbusConfig;
use devbus_common::bus::error::BusError;
use devbus_common::config::ConfigError;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by the manager's fallible entry points.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bus operation failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Where the active configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from the given file.
    File,
    /// File absent; reference board configuration in use.
    Reference,
}

/// Everything `start()` observed.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    /// Per-device registration outcomes
    pub registration: RegistrationReport,
    /// Self-test outcomes, `None` if the self-test was disabled
    pub self_test: Option<SelfTestReport>,
}

/// Owns the registry for the lifetime of the process.
pub struct DeviceManager {
    config: DevbusConfig,
    host: Box<dyn BusHost>,
    registry: DeviceRegistry,
}

impl DeviceManager {
    /// Create a manager. Nothing is registered until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns `ManagerError::Config` if configuration validation fails.
    pub fn new(config: DevbusConfig, host: Box<dyn BusHost>) -> Result<Self, ManagerError> {
        config.validate()?;
        info!(
            "DeviceManager created for bus {} with {} catalog entries",
            config.bus.id,
            config.devices.len()
        );
        Ok(Self {
            config,
            host,
            registry: DeviceRegistry::new(),
        })
    }

    /// Load `devbus.toml`, falling back to the reference board if the file
    /// does not exist.
    ///
    /// # Errors
    /// Parse and validation errors are returned; a missing file is not an error.
    pub fn load_config(path: &Path) -> Result<(DevbusConfig, ConfigSource), ConfigError> {
        match DevbusConfig::load_validated(path) {
            Ok(config) => Ok((config, ConfigSource::File)),
            Err(ConfigError::FileNotFound) => Ok((DevbusConfig::reference(), ConfigSource::Reference)),
            Err(e) => Err(e),
        }
    }

    /// Register the catalog, then self-test every registered device.
    ///
    /// Always succeeds. Calling it while devices are registered deregisters
    /// them first.
    pub fn start(&mut self) -> StartReport {
        if !self.registry.is_empty() {
            warn!(
                "start() with {} devices still registered, deregistering first",
                self.registry.pending_count()
            );
            self.registry.deregister_all();
        }

        info!("===== Device registration on bus {} =====", self.config.bus.id);
        let catalog = self.config.catalog();
        let registration = self.registry.register_all(self.host.as_ref(), &catalog);

        let self_test = if self.config.self_test.enabled {
            Some(SelfTestRunner::run(&self.registry))
        } else {
            info!("Self-test disabled");
            None
        };

        info!(
            "===== Startup complete: {}/{} devices registered =====",
            registration.success_count(),
            catalog.len()
        );
        StartReport {
            registration,
            self_test,
        }
    }

    /// Deregister every device still registered. Returns how many were.
    pub fn stop(&mut self) -> usize {
        info!("===== Device deregistration =====");
        let count = self.registry.deregister_all();
        info!("===== Deregistration complete ({} devices) =====", count);
        count
    }

    /// Handle for a registered device.
    pub fn device(&self, name: &str) -> Result<DeviceHandle, BusError> {
        self.registry.get(name)
    }

    /// Read `length` bytes from `register` of device `name`.
    pub fn read(&self, name: &str, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        self.registry.get(name)?.read(register, length)
    }

    /// Write `data` to `register` of device `name`.
    pub fn write(&self, name: &str, register: u8, data: &[u8]) -> Result<(), BusError> {
        self.registry.get(name)?.write(register, data)
    }

    /// The registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &DevbusConfig {
        &self.config
    }
}
