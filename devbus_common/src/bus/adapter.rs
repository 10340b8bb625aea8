//! Bus adapter contract.
//!
//! The adapter owns the physical bus and is the one shared mutable resource of
//! the system. It is consumed through two traits:
//!
//! - [`BusHost`] - acquires/releases an adapter by bus id
//! - [`BusAdapter`] - client attach/detach and atomic batch submission
//!
//! # Batch Contract
//!
//! `submit_batch` executes every phase of the slice in order, and no phase of
//! any other batch on the same adapter may run in between. Implementations
//! serialize batches internally (typically with a `Mutex`). The return value
//! follows the Linux `i2c_transfer` convention: the number of phases executed
//! on success, a negative errno on failure.

use crate::bus::address::BusAddress;
use crate::bus::descriptor::DeviceDescriptor;
use crate::bus::error::BusError;
use bitflags::bitflags;
use serde::Serialize;
use static_assertions::{assert_impl_all, assert_obj_safe};
use std::sync::Arc;

bitflags! {
    /// Per-phase flags, bit-compatible with `struct i2c_msg.flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhaseFlags: u16 {
        /// Read from the device (`I2C_M_RD`).
        const READ = 0x0001;
    }
}

/// Data direction of one transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Host to device.
    Write,
    /// Device to host.
    Read,
}

/// Buffer carried by a phase. The variant fixes the direction.
#[derive(Debug)]
pub enum PhaseBuffer<'a> {
    /// Bytes to send.
    Write(&'a [u8]),
    /// Destination for received bytes; its length is the read length.
    Read(&'a mut [u8]),
}

/// One directional data movement to or from a single address.
#[derive(Debug)]
pub struct TransferPhase<'a> {
    address: BusAddress,
    buffer: PhaseBuffer<'a>,
}

impl<'a> TransferPhase<'a> {
    /// Write phase: send `data` to `address`.
    pub fn write(address: BusAddress, data: &'a [u8]) -> Self {
        Self {
            address,
            buffer: PhaseBuffer::Write(data),
        }
    }

    /// Read phase: fill `buf` from `address`.
    pub fn read(address: BusAddress, buf: &'a mut [u8]) -> Self {
        Self {
            address,
            buffer: PhaseBuffer::Read(buf),
        }
    }

    /// Target device address.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Direction of this phase.
    pub fn direction(&self) -> Direction {
        match self.buffer {
            PhaseBuffer::Write(_) => Direction::Write,
            PhaseBuffer::Read(_) => Direction::Read,
        }
    }

    /// Wire flags for this phase.
    pub fn flags(&self) -> PhaseFlags {
        match self.direction() {
            Direction::Write => PhaseFlags::empty(),
            Direction::Read => PhaseFlags::READ,
        }
    }

    /// Phase length in bytes.
    pub fn len(&self) -> usize {
        match &self.buffer {
            PhaseBuffer::Write(data) => data.len(),
            PhaseBuffer::Read(buf) => buf.len(),
        }
    }

    /// True for a zero-length phase.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Phase buffer.
    pub fn buffer(&self) -> &PhaseBuffer<'a> {
        &self.buffer
    }

    /// Phase buffer, mutable (adapters fill read buffers through this).
    pub fn buffer_mut(&mut self) -> &mut PhaseBuffer<'a> {
        &mut self.buffer
    }
}

/// A physical (or simulated) addressed bus.
///
/// Shared by every device handle on the bus, hence `&self` methods and
/// `Send + Sync`.
pub trait BusAdapter: Send + Sync {
    /// Bus number this adapter drives.
    fn bus_id(&self) -> u8;

    /// Human-readable adapter name (e.g. `"i2c-1"`, `"sim-1"`).
    fn name(&self) -> &str;

    /// Create a client for `descriptor` on this bus.
    ///
    /// # Errors
    /// Returns `BusError::AddressInUse` if a client already exists at the
    /// descriptor's address.
    fn attach_client(&self, descriptor: &DeviceDescriptor) -> Result<(), BusError>;

    /// Remove the client at `address`. Removing an absent client is a no-op.
    fn detach_client(&self, address: BusAddress);

    /// Execute `phases` as one atomic batch.
    ///
    /// Returns the number of phases executed, or a negative errno.
    fn submit_batch(&self, phases: &mut [TransferPhase<'_>]) -> i32;
}

/// Shared, reference-counted adapter capability.
pub type AdapterRef = Arc<dyn BusAdapter>;

/// Environment that owns the adapters.
pub trait BusHost {
    /// Acquire a reference to the adapter of `bus_id`.
    ///
    /// # Errors
    /// Returns `BusError::NotFound` if no such bus exists.
    fn acquire(&self, bus_id: u8) -> Result<AdapterRef, BusError>;

    /// Give back a reference obtained from [`acquire`](Self::acquire).
    fn release(&self, adapter: AdapterRef) {
        drop(adapter);
    }
}

assert_obj_safe!(BusAdapter, BusHost);
assert_impl_all!(BusAddress: Copy, Send, Sync);
assert_impl_all!(AdapterRef: Clone, Send, Sync);
