//! Bus error taxonomy.
//!
//! Every failure the transaction engine, the registry or an adapter can report
//! is one of the variants below. Adapter statuses travel unchanged inside
//! [`BusError::BusTransferFailed`] so callers match on kind, not on integers.

use crate::bus::address::BusAddress;
use serde::Serialize;
use thiserror::Error;

/// Error types for bus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum BusError {
    /// Malformed call: unregistered handle, zero length, empty payload.
    /// Caller bug, never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transient buffer could not be allocated. Caller may retry.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The adapter reported a negative status for a submitted batch.
    #[error("Bus transfer failed with status {code}")]
    BusTransferFailed {
        /// Raw adapter status, always negative.
        code: i32,
    },

    /// Unknown bus id or unknown device name.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The adapter already has a client at this address.
    #[error("Address {address} already in use")]
    AddressInUse {
        /// Colliding address
        address: BusAddress,
    },
}

impl BusError {
    /// Negative errno-style status for diagnostics.
    ///
    /// `BusTransferFailed` yields the adapter's own code.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::ResourceExhausted(_) => -libc::ENOMEM,
            Self::BusTransferFailed { code } => *code,
            Self::NotFound(_) => -libc::ENODEV,
            Self::AddressInUse { .. } => -libc::EBUSY,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }
}
