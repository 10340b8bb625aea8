//! Runtime device handles.
//!
//! A [`DeviceHandle`] is produced by the registry when a descriptor is
//! registered against an adapter. Clones share one registration slot, so
//! deregistering through the registry is seen by every clone a caller holds.

use devbus_common::bus::adapter::AdapterRef;
use devbus_common::bus::address::BusAddress;
use devbus_common::bus::descriptor::DeviceDescriptor;
use devbus_common::bus::error::BusError;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Registration state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    /// Usable for transactions.
    Registered,
    /// Deregistered; any transaction through it is rejected.
    Unregistered,
}

struct HandleInner {
    name: String,
    address: BusAddress,
    bus_id: u8,
    /// `Some` while registered. The handle shares, never owns, the adapter.
    adapter: RwLock<Option<AdapterRef>>,
}

/// Reference to a device registered on a bus.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<HandleInner>,
}

impl DeviceHandle {
    /// Create a registered handle. Only called by `DeviceRegistry`.
    pub(crate) fn new(descriptor: &DeviceDescriptor, adapter: AdapterRef) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name: descriptor.name().to_string(),
                address: descriptor.address(),
                bus_id: adapter.bus_id(),
                adapter: RwLock::new(Some(adapter)),
            }),
        }
    }

    /// Symbolic device name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Resolved bus address.
    pub fn address(&self) -> BusAddress {
        self.inner.address
    }

    /// Bus the device was registered on.
    pub fn bus_id(&self) -> u8 {
        self.inner.bus_id
    }

    /// Current registration state.
    pub fn state(&self) -> RegistrationState {
        if self.slot().is_some() {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Shorthand for `state() == Registered`.
    pub fn is_registered(&self) -> bool {
        self.state() == RegistrationState::Registered
    }

    /// Read `length` bytes starting at `register`. See [`crate::transaction::read`].
    pub fn read(&self, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        crate::transaction::read(self, register, length)
    }

    /// Write `data` starting at `register`. See [`crate::transaction::write`].
    pub fn write(&self, register: u8, data: &[u8]) -> Result<(), BusError> {
        crate::transaction::write(self, register, data)
    }

    /// Adapter to originate a transaction on.
    ///
    /// # Errors
    /// Returns `BusError::InvalidArgument` if the handle is unregistered.
    pub(crate) fn adapter(&self) -> Result<AdapterRef, BusError> {
        self.slot().ok_or_else(|| {
            BusError::InvalidArgument(format!(
                "device '{}' at {} is not registered",
                self.inner.name, self.inner.address
            ))
        })
    }

    /// Move to `Unregistered`, handing back the adapter reference so the
    /// caller can detach the client. `None` if already unregistered.
    pub(crate) fn unregister(&self) -> Option<AdapterRef> {
        self.inner
            .adapter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn slot(&self) -> Option<AdapterRef> {
        self.inner
            .adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.inner.name)
            .field("address", &self.inner.address)
            .field("bus_id", &self.inner.bus_id)
            .field("state", &self.state())
            .finish()
    }
}
