//! Device registry.
//!
//! Owns the runtime handle table. Constructed by `DeviceManager` at startup
//! and torn down on stop (or drop). No global state, so it can be exercised
//! in isolation against a simulated adapter.
//!
//! Registration never aborts half way: each catalog entry is attempted on its
//! own and its outcome recorded in a [`RegistrationReport`]. Deregistration
//! walks the table in reverse registration order and is idempotent.

use crate::handle::DeviceHandle;
use devbus_common::bus::adapter::{AdapterRef, BusHost};
use devbus_common::bus::address::BusAddress;
use devbus_common::bus::descriptor::{DeviceCatalog, DeviceDescriptor};
use devbus_common::bus::error::BusError;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

/// Outcome of registering one catalog entry.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// Device is registered; the handle is usable.
    Registered(DeviceHandle),
    /// Registration failed; the device stays absent from the registry.
    Failed(BusError),
}

impl Serialize for RegistrationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Registered(_) => {
                let mut s = serializer.serialize_struct("RegistrationOutcome", 1)?;
                s.serialize_field("status", "registered")?;
                s.end()
            }
            Self::Failed(err) => {
                let mut s = serializer.serialize_struct("RegistrationOutcome", 3)?;
                s.serialize_field("status", "failed")?;
                s.serialize_field("error", &err.to_string())?;
                s.serialize_field("code", &err.code())?;
                s.end()
            }
        }
    }
}

/// Per-device registration record.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationEntry {
    /// Catalog name
    pub name: String,
    /// Catalog address
    pub address: BusAddress,
    /// What happened
    pub outcome: RegistrationOutcome,
}

impl RegistrationEntry {
    fn new(descriptor: &DeviceDescriptor, outcome: RegistrationOutcome) -> Self {
        Self {
            name: descriptor.name().to_string(),
            address: descriptor.address(),
            outcome,
        }
    }

    /// Handle, if registration succeeded.
    pub fn handle(&self) -> Option<&DeviceHandle> {
        match &self.outcome {
            RegistrationOutcome::Registered(handle) => Some(handle),
            RegistrationOutcome::Failed(_) => None,
        }
    }

    /// Error, if registration failed.
    pub fn error(&self) -> Option<&BusError> {
        match &self.outcome {
            RegistrationOutcome::Registered(_) => None,
            RegistrationOutcome::Failed(err) => Some(err),
        }
    }
}

/// Result of one `register_all` pass, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    /// Bus the catalog targeted
    pub bus_id: u8,
    /// One entry per catalog descriptor
    pub entries: Vec<RegistrationEntry>,
}

impl RegistrationReport {
    /// Entries in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, RegistrationEntry> {
        self.entries.iter()
    }

    /// Entry for `name`.
    pub fn entry(&self, name: &str) -> Option<&RegistrationEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Handles of the devices that registered.
    pub fn handles(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.entries.iter().filter_map(RegistrationEntry::handle)
    }

    /// Number of successful registrations.
    pub fn success_count(&self) -> usize {
        self.handles().count()
    }

    /// Number of failed registrations.
    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }

    /// True if every device registered.
    pub fn all_registered(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Registry of devices registered on a bus.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Registered handles in registration order.
    handles: Vec<DeviceHandle>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Acquire the catalog's bus from `host`, register every device, then
    /// release the registry's adapter reference.
    ///
    /// Handles keep their own references, so releasing does not invalidate
    /// them. If the bus cannot be acquired every entry fails with that error.
    pub fn register_all(&mut self, host: &dyn BusHost, catalog: &DeviceCatalog) -> RegistrationReport {
        let adapter = match host.acquire(catalog.bus_id()) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to acquire bus {}: {}", catalog.bus_id(), e);
                let entries = catalog
                    .iter()
                    .map(|d| RegistrationEntry::new(d, RegistrationOutcome::Failed(e.clone())))
                    .collect();
                return RegistrationReport {
                    bus_id: catalog.bus_id(),
                    entries,
                };
            }
        };
        info!("Acquired adapter {} for bus {}", adapter.name(), catalog.bus_id());

        let report = self.register_with(&adapter, catalog);

        host.release(adapter);
        info!("Released adapter reference for bus {}", catalog.bus_id());
        report
    }

    /// Register every catalog device against an already acquired adapter.
    ///
    /// Failures are recorded per device and never stop the remaining ones.
    pub fn register_with(&mut self, adapter: &AdapterRef, catalog: &DeviceCatalog) -> RegistrationReport {
        let entries: Vec<RegistrationEntry> = catalog
            .iter()
            .map(|descriptor| {
                let outcome = match self.register_one(adapter, descriptor) {
                    Ok(handle) => {
                        info!(
                            "{} registered at {} on {}",
                            descriptor.name(),
                            descriptor.address(),
                            adapter.name()
                        );
                        RegistrationOutcome::Registered(handle)
                    }
                    Err(e) => {
                        error!(
                            retryable = e.is_retryable(),
                            "Failed to register {} at {}: {} (code {})",
                            descriptor.name(),
                            descriptor.address(),
                            e,
                            e.code()
                        );
                        RegistrationOutcome::Failed(e)
                    }
                };
                RegistrationEntry::new(descriptor, outcome)
            })
            .collect();

        let report = RegistrationReport {
            bus_id: adapter.bus_id(),
            entries,
        };
        info!(
            "Registration on {} finished: {} registered, {} failed",
            adapter.name(),
            report.success_count(),
            report.failure_count()
        );
        report
    }

    fn register_one(
        &mut self,
        adapter: &AdapterRef,
        descriptor: &DeviceDescriptor,
    ) -> Result<DeviceHandle, BusError> {
        if self.handles.iter().any(|h| h.name() == descriptor.name()) {
            return Err(BusError::InvalidArgument(format!(
                "device '{}' is already registered",
                descriptor.name()
            )));
        }
        adapter.attach_client(descriptor)?;
        let handle = DeviceHandle::new(descriptor, adapter.clone());
        self.handles.push(handle.clone());
        Ok(handle)
    }

    /// Deregister one device. Returns `false` if `name` was not registered.
    pub fn deregister(&mut self, name: &str) -> bool {
        let Some(pos) = self.handles.iter().position(|h| h.name() == name) else {
            return false;
        };
        let handle = self.handles.remove(pos);
        release_handle(&handle);
        true
    }

    /// Deregister every device, newest first.
    ///
    /// Returns how many handles were deregistered; a second call returns 0.
    pub fn deregister_all(&mut self) -> usize {
        let count = self.handles.len();
        while let Some(handle) = self.handles.pop() {
            release_handle(&handle);
        }
        if count > 0 {
            info!("Deregistered {} devices", count);
        }
        count
    }

    /// Handle for `name`.
    ///
    /// # Errors
    /// Returns `BusError::NotFound` if no such device is registered.
    pub fn get(&self, name: &str) -> Result<DeviceHandle, BusError> {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .cloned()
            .ok_or_else(|| BusError::NotFound(format!("device '{name}'")))
    }

    /// Registered handles in registration order.
    pub fn handles(&self) -> &[DeviceHandle] {
        &self.handles
    }

    /// Names of registered devices in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(DeviceHandle::name).collect()
    }

    /// Number of handles still awaiting deregistration.
    pub fn pending_count(&self) -> usize {
        self.handles.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            warn!("Registry dropped with {} registered devices", self.handles.len());
            self.deregister_all();
        }
    }
}

/// Unregister `handle`, detaching its client and dropping its adapter reference.
fn release_handle(handle: &DeviceHandle) {
    if let Some(adapter) = handle.unregister() {
        adapter.detach_client(handle.address());
        info!("{} at {} deregistered", handle.name(), handle.address());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulation::{SimulatedAdapter, SimulationHost};
    use crate::handle::RegistrationState;
    use std::sync::Arc;

    fn addr(raw: u8) -> BusAddress {
        BusAddress::new(raw).unwrap()
    }

    fn catalog(entries: &[(&str, u8)]) -> DeviceCatalog {
        DeviceCatalog::new(
            1,
            entries
                .iter()
                .map(|(n, a)| DeviceDescriptor::new(*n, addr(*a)))
                .collect(),
        )
    }

    fn host() -> (SimulationHost, Arc<SimulatedAdapter>) {
        let sim = Arc::new(SimulatedAdapter::for_catalog(&DeviceCatalog::reference()));
        (SimulationHost::new().with_bus(sim.clone()), sim)
    }

    #[test]
    fn registers_reference_catalog_in_order() {
        let (host, sim) = host();
        let mut reg = DeviceRegistry::new();

        let report = reg.register_all(&host, &DeviceCatalog::reference());
        assert!(report.all_registered());
        assert_eq!(reg.names(), vec!["tca9555", "pcf8574", "ads1115"]);
        assert_eq!(sim.clients().len(), 3);
    }

    #[test]
    fn adapter_reference_released_after_registration() {
        let (host, _sim) = host();
        let mut reg = DeviceRegistry::new();
        reg.register_all(&host, &DeviceCatalog::reference());

        assert_eq!(host.acquisitions(), 1);
        assert_eq!(host.releases(), 1);
        // Handles still work after the registry gave its reference back.
        assert!(reg.get("tca9555").unwrap().read(0x00, 1).is_ok());
    }

    #[test]
    fn unknown_bus_fails_every_entry() {
        let (host, sim) = host();
        let mut reg = DeviceRegistry::new();
        let cat = DeviceCatalog::new(5, DeviceCatalog::reference().iter().cloned().collect());

        let report = reg.register_all(&host, &cat);
        assert_eq!(report.failure_count(), 3);
        assert!(report.iter().all(|e| matches!(e.error(), Some(BusError::NotFound(_)))));
        assert!(reg.is_empty());
        assert!(sim.clients().is_empty());
        assert_eq!(host.releases(), 0);
    }

    #[test]
    fn duplicate_name_in_second_pass_rejected() {
        let (host, _sim) = host();
        let mut reg = DeviceRegistry::new();
        reg.register_all(&host, &catalog(&[("tca9555", 0x20)]));

        let report = reg.register_all(&host, &catalog(&[("tca9555", 0x22)]));
        assert!(matches!(
            report.entries[0].error(),
            Some(BusError::InvalidArgument(_))
        ));
        assert_eq!(reg.pending_count(), 1);
    }

    #[test]
    fn get_unknown_name_is_not_found() {
        let reg = DeviceRegistry::new();
        assert!(matches!(reg.get("mcp23017"), Err(BusError::NotFound(_))));
    }

    #[test]
    fn deregister_single_device() {
        let (host, sim) = host();
        let mut reg = DeviceRegistry::new();
        reg.register_all(&host, &DeviceCatalog::reference());
        let pcf = reg.get("pcf8574").unwrap();

        assert!(reg.deregister("pcf8574"));
        assert!(!reg.deregister("pcf8574"));
        assert_eq!(pcf.state(), RegistrationState::Unregistered);
        assert_eq!(reg.names(), vec!["tca9555", "ads1115"]);
        assert_eq!(sim.clients(), vec![addr(0x20), addr(0x48)]);
    }

    #[test]
    fn deregister_all_is_idempotent() {
        let (host, sim) = host();
        let mut reg = DeviceRegistry::new();
        let report = reg.register_all(&host, &DeviceCatalog::reference());

        assert_eq!(reg.deregister_all(), 3);
        assert_eq!(reg.deregister_all(), 0);
        assert_eq!(reg.pending_count(), 0);
        assert!(sim.clients().is_empty());
        assert!(report.handles().all(|h| !h.is_registered()));

        let mut empty = DeviceRegistry::new();
        assert_eq!(empty.deregister_all(), 0);
    }

    #[test]
    fn drop_deregisters_remaining_devices() {
        let (host, sim) = host();
        let handle = {
            let mut reg = DeviceRegistry::new();
            reg.register_all(&host, &DeviceCatalog::reference());
            reg.get("ads1115").unwrap()
        };
        assert!(!handle.is_registered());
        assert!(sim.clients().is_empty());
    }

    #[test]
    fn report_serializes_outcomes() {
        let (host, sim) = host();
        sim.occupy(addr(0x21));
        let mut reg = DeviceRegistry::new();
        let report = reg.register_all(&host, &DeviceCatalog::reference());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["bus_id"], 1);
        assert_eq!(json["entries"][0]["outcome"]["status"], "registered");
        assert_eq!(json["entries"][1]["outcome"]["status"], "failed");
        assert_eq!(json["entries"][1]["outcome"]["code"], -libc::EBUSY);
        assert_eq!(json["entries"][1]["address"], 0x21);
    }
}
