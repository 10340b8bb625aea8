//! Workspace-wide constants.

/// Canonical service name (used for logging).
pub const SERVICE_NAME: &str = "devbus";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/devbus/devbus.toml";

/// Bus the reference catalog lives on (`/dev/i2c-1`).
pub const REFERENCE_BUS_ID: u8 = 1;

/// TCA9555 16-bit GPIO expander
pub const TCA9555_ADDR: u8 = 0x20;

/// PCF8574 8-bit GPIO expander
pub const PCF8574_ADDR: u8 = 0x21;

/// ADS1115 16-bit ADC
pub const ADS1115_ADDR: u8 = 0x48;

/// Largest single transfer phase, in bytes (i2c-dev per-message limit).
pub const MAX_TRANSFER_LEN: usize = 8192;

/// Largest number of phases in one batch (`I2C_RDWR_IOCTL_MAX_MSGS`).
pub const MAX_BATCH_PHASES: usize = 42;
