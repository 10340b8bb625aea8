//! Linux i2c-dev adapter.
//!
//! Drives `/dev/i2c-<N>` with the `I2C_RDWR` ioctl, which executes an array of
//! `struct i2c_msg` as one combined transaction (repeated start between
//! messages, single stop at the end). That is exactly the atomic batch the
//! transaction engine relies on.
//!
//! Client registration is tracked in-process. An address the kernel already
//! has a client bound to (`/sys/bus/i2c/devices/<N>-00<addr>`) is refused.
//! With `instantiate_kernel_clients` the adapter also creates and deletes
//! kernel clients through the bus's sysfs `new_device` / `delete_device` files.

use devbus_common::bus::adapter::{AdapterRef, BusAdapter, BusHost, PhaseBuffer, TransferPhase};
use devbus_common::bus::address::BusAddress;
use devbus_common::bus::descriptor::DeviceDescriptor;
use devbus_common::bus::error::BusError;
use devbus_common::consts::{MAX_BATCH_PHASES, MAX_TRANSFER_LEN};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const DEV_ROOT: &str = "/dev";
const SYSFS_I2C_DEVICES: &str = "/sys/bus/i2c/devices";

mod ioctl {
    /// `I2C_RDWR` request number from `<linux/i2c-dev.h>`.
    pub const I2C_RDWR: u32 = 0x0707;

    /// `struct i2c_msg` from `<linux/i2c.h>`.
    #[repr(C)]
    #[derive(Debug)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// `struct i2c_rdwr_ioctl_data` from `<linux/i2c-dev.h>`.
    #[repr(C)]
    #[derive(Debug)]
    pub struct I2cRdwrIoctlData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    nix::ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrIoctlData);

    #[cfg(target_pointer_width = "64")]
    static_assertions::assert_eq_size!(I2cMsg, [u8; 16]);
    #[cfg(target_pointer_width = "64")]
    static_assertions::assert_eq_size!(I2cRdwrIoctlData, [u8; 16]);
}

use ioctl::{I2cMsg, I2cRdwrIoctlData};

/// Negative errno of an I/O error, `-EIO` if the OS gave none.
fn neg_errno(err: &io::Error) -> i32 {
    -err.raw_os_error().unwrap_or(libc::EIO)
}

/// Adapter over one `/dev/i2c-<N>` character device.
#[derive(Debug)]
pub struct LinuxI2cAdapter {
    bus_id: u8,
    name: String,
    /// Held for the whole ioctl; serializes batches from this process.
    device: Mutex<File>,
    clients: Mutex<BTreeMap<BusAddress, String>>,
    instantiate_kernel_clients: bool,
    sysfs_root: PathBuf,
}

impl LinuxI2cAdapter {
    /// Open `<dev_root>/i2c-<bus_id>`.
    ///
    /// # Errors
    /// - `BusError::NotFound` if the device node does not exist
    /// - `BusError::BusTransferFailed` with `-errno` for any other open failure
    pub fn open(
        dev_root: &Path,
        bus_id: u8,
        instantiate_kernel_clients: bool,
    ) -> Result<Self, BusError> {
        let name = format!("i2c-{bus_id}");
        let path = dev_root.join(&name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    BusError::NotFound(format!("{}", path.display()))
                } else {
                    BusError::BusTransferFailed { code: neg_errno(&e) }
                }
            })?;

        info!("Opened {}", path.display());
        Ok(Self {
            bus_id,
            name,
            device: Mutex::new(file),
            clients: Mutex::new(BTreeMap::new()),
            instantiate_kernel_clients,
            sysfs_root: PathBuf::from(SYSFS_I2C_DEVICES),
        })
    }

    /// sysfs directory of a kernel client at `address` on this bus.
    fn kernel_client_dir(&self, address: BusAddress) -> PathBuf {
        self.sysfs_root
            .join(format!("{}-{:04x}", self.bus_id, address.get()))
    }

    /// sysfs control file of this bus (`new_device` / `delete_device`).
    fn bus_control_file(&self, file: &str) -> PathBuf {
        self.sysfs_root.join(&self.name).join(file)
    }

    fn clients(&self) -> MutexGuard<'_, BTreeMap<BusAddress, String>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusAdapter for LinuxI2cAdapter {
    fn bus_id(&self) -> u8 {
        self.bus_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn attach_client(&self, descriptor: &DeviceDescriptor) -> Result<(), BusError> {
        let address = descriptor.address();
        let mut clients = self.clients();
        if clients.contains_key(&address) || self.kernel_client_dir(address).exists() {
            return Err(BusError::AddressInUse { address });
        }

        if self.instantiate_kernel_clients {
            let line = format!("{} 0x{:02x}", descriptor.name(), address.get());
            std::fs::write(self.bus_control_file("new_device"), line).map_err(|e| {
                BusError::BusTransferFailed { code: neg_errno(&e) }
            })?;
            debug!("{}: kernel client {} created at {}", self.name, descriptor.name(), address);
        }

        clients.insert(address, descriptor.name().to_string());
        Ok(())
    }

    fn detach_client(&self, address: BusAddress) {
        let Some(name) = self.clients().remove(&address) else {
            return;
        };
        if self.instantiate_kernel_clients {
            let line = format!("0x{:02x}", address.get());
            if let Err(e) = std::fs::write(self.bus_control_file("delete_device"), line) {
                warn!("{}: failed to delete kernel client {} at {}: {}", self.name, name, address, e);
            }
        }
        debug!("{}: detached {} at {}", self.name, name, address);
    }

    fn submit_batch(&self, phases: &mut [TransferPhase<'_>]) -> i32 {
        if phases.is_empty() || phases.len() > MAX_BATCH_PHASES {
            return -libc::EINVAL;
        }

        let mut msgs = Vec::with_capacity(phases.len());
        for phase in phases.iter_mut() {
            let Ok(len) = u16::try_from(phase.len()) else {
                return -libc::EINVAL;
            };
            if usize::from(len) > MAX_TRANSFER_LEN {
                return -libc::EINVAL;
            }
            let addr = u16::from(phase.address().get());
            let flags = phase.flags().bits();
            let buf = match phase.buffer_mut() {
                // The kernel only reads from write-phase buffers.
                PhaseBuffer::Write(data) => data.as_ptr().cast_mut(),
                PhaseBuffer::Read(buf) => buf.as_mut_ptr(),
            };
            msgs.push(I2cMsg {
                addr,
                flags,
                len,
                buf,
            });
        }

        let data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        let device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `data` points at `msgs`, whose buffers borrow from `phases`;
        // both outlive the call and every `len` matches its buffer.
        match unsafe { ioctl::i2c_rdwr(device.as_raw_fd(), &data) } {
            Ok(n) => n,
            Err(errno) => -(errno as i32),
        }
    }
}

/// `BusHost` over the system's i2c-dev nodes.
#[derive(Debug, Clone)]
pub struct LinuxHost {
    dev_root: PathBuf,
    instantiate_kernel_clients: bool,
}

impl LinuxHost {
    /// Host over `/dev/i2c-*`.
    pub fn new(instantiate_kernel_clients: bool) -> Self {
        Self {
            dev_root: PathBuf::from(DEV_ROOT),
            instantiate_kernel_clients,
        }
    }

    /// Host over `<dev_root>/i2c-*`.
    pub fn with_dev_root(dev_root: impl Into<PathBuf>, instantiate_kernel_clients: bool) -> Self {
        Self {
            dev_root: dev_root.into(),
            instantiate_kernel_clients,
        }
    }
}

impl BusHost for LinuxHost {
    fn acquire(&self, bus_id: u8) -> Result<AdapterRef, BusError> {
        let adapter =
            LinuxI2cAdapter::open(&self.dev_root, bus_id, self.instantiate_kernel_clients)?;
        Ok(Arc::new(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_device_node_is_not_found() {
        let dir = TempDir::new().unwrap();
        let host = LinuxHost::with_dev_root(dir.path(), false);
        assert!(matches!(host.acquire(7), Err(BusError::NotFound(_))));
    }

    #[test]
    fn plain_file_stands_in_for_device_node() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("i2c-3"), b"").unwrap();
        let host = LinuxHost::with_dev_root(dir.path(), false);

        let adapter = host.acquire(3).unwrap();
        assert_eq!(adapter.bus_id(), 3);
        assert_eq!(adapter.name(), "i2c-3");

        // A regular file does not implement I2C_RDWR.
        let reg = [0u8];
        let addr = BusAddress::new(0x20).unwrap();
        let status = adapter.submit_batch(&mut [TransferPhase::write(addr, &reg)]);
        assert!(status < 0);
    }

    #[test]
    fn oversized_batches_rejected_before_ioctl() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("i2c-1"), b"").unwrap();
        let adapter = LinuxI2cAdapter::open(dir.path(), 1, false).unwrap();
        let addr = BusAddress::new(0x20).unwrap();

        assert_eq!(adapter.submit_batch(&mut []), -libc::EINVAL);

        let big = vec![0u8; MAX_TRANSFER_LEN + 1];
        assert_eq!(
            adapter.submit_batch(&mut [TransferPhase::write(addr, &big)]),
            -libc::EINVAL
        );
    }

    #[test]
    fn duplicate_client_refused() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("i2c-9"), b"").unwrap();
        let adapter = LinuxI2cAdapter::open(dir.path(), 9, false).unwrap();
        let desc = DeviceDescriptor::new("pcf8574", BusAddress::new(0x21).unwrap());

        adapter.attach_client(&desc).unwrap();
        assert!(matches!(
            adapter.attach_client(&desc),
            Err(BusError::AddressInUse { .. })
        ));
        adapter.detach_client(desc.address());
        adapter.attach_client(&desc).unwrap();
    }
}
