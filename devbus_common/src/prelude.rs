//! Prelude module for common re-exports.
//!
//! ```rust
//! use devbus_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::bus::config::{BusConfig, DevbusConfig, SelfTestConfig};
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Bus model ──────────────────────────────────────────────────────
pub use crate::bus::adapter::{
    AdapterRef, BusAdapter, BusHost, Direction, PhaseBuffer, PhaseFlags, TransferPhase,
};
pub use crate::bus::address::BusAddress;
pub use crate::bus::descriptor::{DeviceCatalog, DeviceDescriptor};
pub use crate::bus::error::BusError;

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{MAX_BATCH_PHASES, MAX_TRANSFER_LEN, REFERENCE_BUS_ID};
