//! Bus data model and adapter contracts.
//!
//! This module contains the types shared by everything that talks to an
//! addressed peripheral bus:
//! - [`address::BusAddress`] - validated 7-bit device address
//! - [`descriptor`] - static device catalog
//! - [`adapter`] - the external bus adapter collaborator and transfer phases
//! - [`error::BusError`] - closed error taxonomy
//! - [`config`] - `devbus.toml` configuration

pub mod adapter;
pub mod address;
pub mod config;
pub mod descriptor;
pub mod error;
