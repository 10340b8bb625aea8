//! Bus adapter backends.
//!
//! - [`simulation`] - in-memory bus for development and testing
//! - [`linux`] - `/dev/i2c-*` through the `I2C_RDWR` ioctl
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `adapters/`
//! 2. Implement `BusAdapter` and `BusHost` from `devbus_common::bus::adapter`
//! 3. Select it in [`host_for`]

#[cfg(target_os = "linux")]
pub mod linux;
pub mod simulation;

use devbus_common::bus::adapter::BusHost;
use devbus_common::bus::config::DevbusConfig;
use simulation::{SimulatedAdapter, SimulationHost};
use std::sync::Arc;
use tracing::info;

/// Host for the configured bus.
///
/// `simulate` selects a simulated bus populated from the catalog. Otherwise
/// the Linux i2c-dev host is used; on other platforms the simulation is the
/// only backend.
pub fn host_for(config: &DevbusConfig, simulate: bool) -> Box<dyn BusHost> {
    if simulate {
        return simulated_host(config);
    }

    #[cfg(target_os = "linux")]
    {
        info!("Using i2c-dev bus {}", config.bus.id);
        Box::new(linux::LinuxHost::new(config.bus.instantiate_kernel_clients))
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("No hardware backend on this platform, falling back to simulation");
        simulated_host(config)
    }
}

fn simulated_host(config: &DevbusConfig) -> Box<dyn BusHost> {
    info!("Using simulated bus {}", config.bus.id);
    let bus = SimulatedAdapter::for_catalog(&config.catalog());
    Box::new(SimulationHost::new().with_bus(Arc::new(bus)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbus_common::bus::adapter::BusAdapter;

    #[test]
    fn simulated_host_carries_configured_bus() {
        let mut config = DevbusConfig::reference();
        config.bus.id = 4;
        let host = host_for(&config, true);
        let adapter = host.acquire(4).unwrap();
        assert_eq!(adapter.bus_id(), 4);
        assert!(host.acquire(1).is_err());
    }
}
