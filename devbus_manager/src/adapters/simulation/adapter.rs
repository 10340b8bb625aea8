//! Simulated bus adapter implementation.
//!
//! The `SimulatedAdapter` implements the `BusAdapter` trait over an in-memory
//! bus: one [`RegisterFile`] per simulated chip, a client table, fault
//! injection, and a log of the most recent submitted batches.

use super::registers::RegisterFile;
use devbus_common::bus::adapter::{BusAdapter, Direction, PhaseBuffer, TransferPhase};
use devbus_common::bus::address::BusAddress;
use devbus_common::bus::descriptor::{DeviceCatalog, DeviceDescriptor};
use devbus_common::bus::error::BusError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Batches kept in the log; older ones are dropped first.
pub const BATCH_LOG_CAPACITY: usize = 1024;

/// Injected failure for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail every batch containing a read phase to the address.
    ReadBatch(i32),
    /// Fail every batch touching the address.
    AnyBatch(i32),
}

/// One executed (or rejected) phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    /// Target address
    pub address: BusAddress,
    /// Phase direction
    pub direction: Direction,
    /// Bytes sent, or bytes returned for a successful read
    pub bytes: Vec<u8>,
}

/// One submitted batch and the status it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRecord {
    /// Phases in submission order
    pub phases: Vec<PhaseRecord>,
    /// Returned status
    pub status: i32,
}

#[derive(Debug, Default)]
struct BusState {
    chips: HashMap<BusAddress, RegisterFile>,
    clients: BTreeMap<BusAddress, String>,
    occupied: HashSet<BusAddress>,
    faults: HashMap<BusAddress, Fault>,
    log: VecDeque<BatchRecord>,
}

impl BusState {
    fn record(&mut self, record: BatchRecord) {
        if self.log.len() == BATCH_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(record);
    }

    /// Status a batch must fail with, checked before any phase executes.
    fn precheck(&self, phases: &[TransferPhase<'_>]) -> Option<i32> {
        if phases.is_empty() {
            return Some(-libc::EINVAL);
        }
        for phase in phases {
            match self.faults.get(&phase.address()) {
                Some(Fault::AnyBatch(code)) => return Some(*code),
                Some(Fault::ReadBatch(code)) if phase.direction() == Direction::Read => {
                    return Some(*code);
                }
                _ => {}
            }
            if !self.chips.contains_key(&phase.address()) {
                return Some(-libc::ENXIO);
            }
        }
        None
    }
}

/// In-memory bus.
///
/// All state sits behind one mutex, which is also what serializes batches.
#[derive(Debug)]
pub struct SimulatedAdapter {
    bus_id: u8,
    name: String,
    state: Mutex<BusState>,
}

impl SimulatedAdapter {
    /// Create an empty bus with no chips.
    pub fn new(bus_id: u8) -> Self {
        Self {
            bus_id,
            name: format!("sim-{bus_id}"),
            state: Mutex::new(BusState::default()),
        }
    }

    /// Bus with one chip per catalog address, seeded with power-on values.
    pub fn for_catalog(catalog: &DeviceCatalog) -> Self {
        let sim = Self::new(catalog.bus_id());
        for descriptor in catalog {
            let model = chip_model(descriptor.name());
            sim.add_chip_with_width(descriptor.address(), model.register_width);
            for (register, bytes) in model.power_on {
                sim.poke(descriptor.address(), *register, bytes);
            }
        }
        sim
    }

    /// Put a chip with byte-wide registers (all zero) at `address`.
    pub fn add_chip(&self, address: BusAddress) {
        self.add_chip_with_width(address, 1);
    }

    /// Put a chip with `register_width`-byte registers (all zero) at
    /// `address`. An existing chip there is kept.
    pub fn add_chip_with_width(&self, address: BusAddress, register_width: usize) {
        self.lock()
            .chips
            .entry(address)
            .or_insert_with(|| RegisterFile::with_width(register_width));
    }

    /// Remove the chip at `address`; later phases to it fail with `-ENXIO`.
    pub fn remove_chip(&self, address: BusAddress) {
        self.lock().chips.remove(&address);
    }

    /// Mark `address` as claimed by a client this process does not own.
    pub fn occupy(&self, address: BusAddress) {
        self.lock().occupied.insert(address);
    }

    /// Set registers of the chip at `address` (no-op if there is no chip).
    pub fn poke(&self, address: BusAddress, register: u8, bytes: &[u8]) {
        if let Some(chip) = self.lock().chips.get_mut(&address) {
            chip.poke(register, bytes);
        }
    }

    /// Read registers of the chip at `address` without a bus transfer.
    pub fn peek(&self, address: BusAddress, register: u8, len: usize) -> Option<Vec<u8>> {
        self.lock()
            .chips
            .get(&address)
            .map(|chip| chip.peek(register, len))
    }

    /// Make batches touching `address` fail.
    pub fn inject_fault(&self, address: BusAddress, fault: Fault) {
        self.lock().faults.insert(address, fault);
    }

    /// Remove an injected fault.
    pub fn clear_fault(&self, address: BusAddress) {
        self.lock().faults.remove(&address);
    }

    /// Addresses with an attached client, ascending.
    pub fn clients(&self) -> Vec<BusAddress> {
        self.lock().clients.keys().copied().collect()
    }

    /// Submitted batches, oldest first (at most [`BATCH_LOG_CAPACITY`]).
    pub fn batches(&self) -> Vec<BatchRecord> {
        self.lock().log.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusAdapter for SimulatedAdapter {
    fn bus_id(&self) -> u8 {
        self.bus_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn attach_client(&self, descriptor: &DeviceDescriptor) -> Result<(), BusError> {
        let address = descriptor.address();
        let mut state = self.lock();
        if state.occupied.contains(&address) || state.clients.contains_key(&address) {
            return Err(BusError::AddressInUse { address });
        }
        state.clients.insert(address, descriptor.name().to_string());
        debug!("{}: attached {} at {}", self.name, descriptor.name(), address);
        Ok(())
    }

    fn detach_client(&self, address: BusAddress) {
        if let Some(name) = self.lock().clients.remove(&address) {
            debug!("{}: detached {} at {}", self.name, name, address);
        }
    }

    fn submit_batch(&self, phases: &mut [TransferPhase<'_>]) -> i32 {
        let mut state = self.lock();

        if let Some(status) = state.precheck(phases) {
            let record = BatchRecord {
                phases: phases.iter().map(|p| record_phase(p, false)).collect(),
                status,
            };
            state.record(record);
            trace!("{}: batch rejected with {}", self.name, status);
            return status;
        }

        for phase in phases.iter_mut() {
            let address = phase.address();
            // precheck guarantees the chip exists
            let Some(chip) = state.chips.get_mut(&address) else {
                continue;
            };
            match phase.buffer_mut() {
                PhaseBuffer::Write(data) => chip.write(data),
                PhaseBuffer::Read(buf) => chip.read_into(buf),
            }
        }

        let status = i32::try_from(phases.len()).unwrap_or(i32::MAX);
        let record = BatchRecord {
            phases: phases.iter().map(|p| record_phase(p, true)).collect(),
            status,
        };
        state.record(record);
        status
    }
}

fn record_phase(phase: &TransferPhase<'_>, executed: bool) -> PhaseRecord {
    let bytes = match phase.buffer() {
        PhaseBuffer::Write(data) => data.to_vec(),
        PhaseBuffer::Read(buf) if executed => buf.to_vec(),
        PhaseBuffer::Read(_) => Vec::new(),
    };
    PhaseRecord {
        address: phase.address(),
        direction: phase.direction(),
        bytes,
    }
}

/// Register layout and datasheet power-on values of a simulated chip.
struct ChipModel {
    register_width: usize,
    power_on: &'static [(u8, &'static [u8])],
}

fn chip_model(chip: &str) -> ChipModel {
    match chip {
        // Inputs pulled high, all pins configured as inputs.
        "tca9555" => ChipModel {
            register_width: 1,
            power_on: &[(0x00, &[0xFF, 0xFF]), (0x02, &[0xFF, 0xFF]), (0x06, &[0xFF, 0xFF])],
        },
        // Quasi-bidirectional port, high after reset.
        "pcf8574" => ChipModel {
            register_width: 1,
            power_on: &[(0x00, &[0xFF])],
        },
        // 16-bit registers: conversion 0x0000, config 0x8583.
        "ads1115" => ChipModel {
            register_width: 2,
            power_on: &[(0x00, &[0x00, 0x00]), (0x01, &[0x85, 0x83])],
        },
        _ => ChipModel {
            register_width: 1,
            power_on: &[],
        },
    }
}
