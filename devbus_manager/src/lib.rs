//! # devbus Manager Library
//!
//! Registers a fixed catalog of peripherals on an addressed bus, gives callers
//! a register-oriented read/write primitive, and self-tests every device once
//! at startup.
//!
//! # Module Structure
//!
//! - [`core`] - `DeviceManager`, the start/stop lifecycle owner
//! - [`device_registry`] - registration, deregistration and lookup
//! - [`handle`] - `DeviceHandle`, a runtime reference to a registered device
//! - [`transaction`] - register read/write batches
//! - [`self_test`] - one-shot startup self-test
//! - [`adapters`] - bus adapter backends (simulation, Linux i2c-dev)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        DeviceManager                          │
//! │   start() = register_all + self-test      stop() = deregister │
//! │  ┌──────────────────┐      ┌──────────────────────────────┐   │
//! │  │  DeviceRegistry  │─────►│  SelfTestRunner              │   │
//! │  │  (DeviceHandles) │      └──────────────┬───────────────┘   │
//! │  └────────┬─────────┘                     ▼                   │
//! │           │                ┌──────────────────────────────┐   │
//! │           │                │  transaction::{read, write}  │   │
//! │           │                └──────────────┬───────────────┘   │
//! │           ▼                               ▼                   │
//! │     ┌────────────────────────────────────────────┐            │
//! │     │  BusAdapter (trait object, shared by Arc)  │            │
//! │     └────────────────────────────────────────────┘            │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod adapters;
pub mod core;
pub mod device_registry;
pub mod handle;
pub mod self_test;
pub mod transaction;

// Re-export key types for convenience
pub use crate::core::{DeviceManager, ManagerError, StartReport};
pub use crate::device_registry::{DeviceRegistry, RegistrationOutcome, RegistrationReport};
pub use crate::handle::{DeviceHandle, RegistrationState};
pub use crate::self_test::{SelfTestReport, SelfTestResult, SelfTestRunner};
