//! Register transaction engine.
//!
//! Stateless request/response layer between device handles and the adapter.
//!
//! - [`read`] submits `[write(register), read(length)]` as ONE batch, so no
//!   foreign transaction can move the device's register pointer between the
//!   address phase and the data phase.
//! - [`write`] submits a single write phase carrying `[register] ++ data`
//!   from a [`TransferBuffer`] that lives only for the duration of the call.
//!
//! Argument and registration checks run before the adapter is touched. A
//! negative adapter status is always returned to the caller as
//! `BusError::BusTransferFailed` with the raw code.

use crate::handle::DeviceHandle;
use devbus_common::bus::adapter::TransferPhase;
use devbus_common::bus::error::BusError;
use devbus_common::consts::MAX_TRANSFER_LEN;
use tracing::{error, trace};

/// Exclusively owned, single-transaction byte buffer.
///
/// Dropped at the end of the transaction call on every path.
#[derive(Debug)]
pub struct TransferBuffer {
    bytes: Vec<u8>,
}

impl TransferBuffer {
    /// `len` zero bytes, used as a read destination.
    ///
    /// # Errors
    /// Returns `BusError::ResourceExhausted` if the allocation fails.
    pub fn zeroed(len: usize) -> Result<Self, BusError> {
        let mut bytes = Self::allocate(len)?;
        bytes.resize(len, 0);
        Ok(Self { bytes })
    }

    /// `[register] ++ data`, used as a write payload.
    ///
    /// # Errors
    /// Returns `BusError::ResourceExhausted` if the allocation fails.
    pub fn for_write(register: u8, data: &[u8]) -> Result<Self, BusError> {
        let mut bytes = Self::allocate(data.len() + 1)?;
        bytes.push(register);
        bytes.extend_from_slice(data);
        Ok(Self { bytes })
    }

    /// Buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Buffer contents, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hand the bytes to the caller.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    fn allocate(len: usize) -> Result<Vec<u8>, BusError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(|e| {
            BusError::ResourceExhausted(format!("transfer buffer of {len} bytes: {e}"))
        })?;
        Ok(bytes)
    }
}

/// Read `length` bytes from `register` of the device behind `handle`.
///
/// Bytes are returned exactly as the device sent them; a 16-bit register comes
/// back as `[high, low]`.
///
/// # Errors
/// - `InvalidArgument` if the handle is unregistered or `length` is 0 or
///   larger than `MAX_TRANSFER_LEN`
/// - `ResourceExhausted` if the receive buffer cannot be allocated
/// - `BusTransferFailed { code }` if the adapter rejects the batch
pub fn read(handle: &DeviceHandle, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
    if length == 0 || length > MAX_TRANSFER_LEN {
        return Err(BusError::InvalidArgument(format!(
            "read length {length} outside 1..={MAX_TRANSFER_LEN}"
        )));
    }
    let adapter = handle.adapter()?;
    let address = handle.address();

    let mut rx = TransferBuffer::zeroed(length)?;
    let reg = [register];
    let status = {
        let mut phases = [
            TransferPhase::write(address, &reg),
            TransferPhase::read(address, rx.as_mut_slice()),
        ];
        adapter.submit_batch(&mut phases)
    };

    if status < 0 {
        error!(
            "Read failed: {} at {} reg 0x{:02x}, status {}",
            handle.name(),
            address,
            register,
            status
        );
        return Err(BusError::BusTransferFailed { code: status });
    }

    trace!(
        "{} reg 0x{:02x} read {} bytes",
        handle.name(),
        register,
        length
    );
    Ok(rx.into_vec())
}

/// Write `data` to `register` of the device behind `handle`.
///
/// # Errors
/// - `InvalidArgument` if the handle is unregistered, `data` is empty or the
///   payload plus register byte exceeds `MAX_TRANSFER_LEN`
/// - `ResourceExhausted` if the transfer buffer cannot be allocated
/// - `BusTransferFailed { code }` if the adapter rejects the batch
pub fn write(handle: &DeviceHandle, register: u8, data: &[u8]) -> Result<(), BusError> {
    if data.is_empty() || data.len() >= MAX_TRANSFER_LEN {
        return Err(BusError::InvalidArgument(format!(
            "write payload of {} bytes outside 1..{MAX_TRANSFER_LEN}",
            data.len()
        )));
    }
    let adapter = handle.adapter()?;
    let address = handle.address();

    let tx = TransferBuffer::for_write(register, data)?;
    let status = adapter.submit_batch(&mut [TransferPhase::write(address, tx.as_slice())]);
    drop(tx);

    if status < 0 {
        error!(
            "Write failed: {} at {} reg 0x{:02x}, status {}",
            handle.name(),
            address,
            register,
            status
        );
        return Err(BusError::BusTransferFailed { code: status });
    }

    trace!(
        "{} reg 0x{:02x} wrote {} bytes",
        handle.name(),
        register,
        data.len()
    );
    Ok(())
}
