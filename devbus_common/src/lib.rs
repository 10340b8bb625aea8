//! devbus Common Library
//!
//! This crate provides the shared bus data model, the contracts of the external
//! bus adapter collaborator and the configuration loading utilities used by all
//! devbus workspace crates.
//!
//! # Module Structure
//!
//! - [`bus`] - Bus addresses, device catalog, adapter traits and errors
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use devbus_common::prelude::*;
//!
//! let catalog = DeviceCatalog::reference();
//! assert_eq!(catalog.len(), 3);
//! ```

pub mod bus;
pub mod config;
pub mod consts;
pub mod prelude;
