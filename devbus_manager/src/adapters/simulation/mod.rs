//! Simulation adapter module.
//!
//! Software bus for development and testing without physical hardware.

mod adapter;
mod host;
mod registers;

pub use adapter::{BATCH_LOG_CAPACITY, BatchRecord, Fault, PhaseRecord, SimulatedAdapter};
pub use host::SimulationHost;
pub use registers::{REGISTER_COUNT, RegisterFile};
