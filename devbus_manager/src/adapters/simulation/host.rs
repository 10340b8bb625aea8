//! Host owning simulated buses.

use super::adapter::SimulatedAdapter;
use devbus_common::bus::adapter::{AdapterRef, BusAdapter, BusHost};
use devbus_common::bus::error::BusError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// `BusHost` over a fixed set of simulated buses.
///
/// Clones share buses and counters, so a test can keep a clone for
/// inspection after handing one to the manager.
#[derive(Debug, Clone, Default)]
pub struct SimulationHost {
    buses: HashMap<u8, Arc<SimulatedAdapter>>,
    counters: Arc<Counters>,
}

impl SimulationHost {
    /// Host with no buses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bus, keyed by its bus id.
    pub fn with_bus(mut self, adapter: Arc<SimulatedAdapter>) -> Self {
        self.buses.insert(adapter.bus_id(), adapter);
        self
    }

    /// Simulated bus by id.
    pub fn bus(&self, bus_id: u8) -> Option<Arc<SimulatedAdapter>> {
        self.buses.get(&bus_id).cloned()
    }

    /// Successful `acquire` calls so far.
    pub fn acquisitions(&self) -> usize {
        self.counters.acquired.load(Ordering::Relaxed)
    }

    /// `release` calls so far.
    pub fn releases(&self) -> usize {
        self.counters.released.load(Ordering::Relaxed)
    }
}

impl BusHost for SimulationHost {
    fn acquire(&self, bus_id: u8) -> Result<AdapterRef, BusError> {
        let bus = self
            .buses
            .get(&bus_id)
            .ok_or_else(|| BusError::NotFound(format!("simulated bus {bus_id}")))?;
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        debug!("Acquired simulated bus {}", bus_id);
        let adapter: AdapterRef = bus.clone();
        Ok(adapter)
    }

    fn release(&self, adapter: AdapterRef) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        debug!("Released simulated bus {}", adapter.bus_id());
    }
}
