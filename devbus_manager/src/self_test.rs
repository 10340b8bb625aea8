//! Startup self-test.
//!
//! Runs one short register sequence per registered device through the
//! transaction engine and reports what came back. Purely diagnostic: a failed
//! step ends that device's test, and nothing here touches registry state.

use crate::device_registry::DeviceRegistry;
use crate::handle::DeviceHandle;
use devbus_common::bus::address::BusAddress;
use devbus_common::bus::error::BusError;
use serde::Serialize;
use std::fmt;
use tracing::{error, info};

/// One register operation of a self-test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SelfTestStep {
    /// Read `length` bytes from `register`.
    Read {
        /// Register address
        register: u8,
        /// Bytes to read
        length: usize,
    },
    /// Write `data` to `register`.
    Write {
        /// Register address
        register: u8,
        /// Payload
        data: &'static [u8],
    },
}

impl SelfTestStep {
    fn run(&self, handle: &DeviceHandle) -> Result<Vec<u8>, BusError> {
        match *self {
            Self::Read { register, length } => handle.read(register, length),
            Self::Write { register, data } => handle.write(register, data).map(|()| data.to_vec()),
        }
    }
}

// TCA9555: input port 0, input port 1.
const TCA9555_PLAN: &[SelfTestStep] = &[
    SelfTestStep::Read { register: 0x00, length: 1 },
    SelfTestStep::Read { register: 0x01, length: 1 },
];

// PCF8574: port state, then drive P0 high.
const PCF8574_PLAN: &[SelfTestStep] = &[
    SelfTestStep::Read { register: 0x00, length: 1 },
    SelfTestStep::Write { register: 0x00, data: &[0x01] },
];

// ADS1115: conversion register, big-endian.
const ADS1115_PLAN: &[SelfTestStep] = &[SelfTestStep::Read { register: 0x00, length: 2 }];

const GENERIC_PLAN: &[SelfTestStep] = &[SelfTestStep::Read { register: 0x00, length: 1 }];

/// Self-test plan for a device, chosen by its catalog name.
pub fn plan_for(name: &str) -> &'static [SelfTestStep] {
    match name {
        "tca9555" => TCA9555_PLAN,
        "pcf8574" => PCF8574_PLAN,
        "ads1115" => ADS1115_PLAN,
        _ => GENERIC_PLAN,
    }
}

/// A step that completed, with the bytes read or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// The step
    pub step: SelfTestStep,
    /// Bytes observed (reads) or sent (writes)
    pub bytes: Vec<u8>,
}

/// Self-test outcome for one device.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestResult {
    /// Device name
    pub device: String,
    /// Device address
    pub address: BusAddress,
    /// Steps that completed, in order
    pub completed: Vec<StepRecord>,
    /// Step that failed, if any
    pub failed_step: Option<SelfTestStep>,
    /// Why it failed
    pub error: Option<BusError>,
}

impl SelfTestResult {
    /// True if every step completed.
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Self-test outcomes in registration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelfTestReport {
    /// One result per registered device
    pub results: Vec<SelfTestResult>,
}

impl SelfTestReport {
    /// Result for `device`.
    pub fn result(&self, device: &str) -> Option<&SelfTestResult> {
        self.results.iter().find(|r| r.device == device)
    }

    /// Number of devices that passed.
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    /// Number of devices that failed.
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }
}

/// Space-separated hex rendering of a byte slice.
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "0x{byte:02x}")?;
        }
        Ok(())
    }
}

/// Runs the per-device plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfTestRunner;

impl SelfTestRunner {
    /// Self-test every device in `registry`.
    pub fn run(registry: &DeviceRegistry) -> SelfTestReport {
        info!("Starting device self-test...");
        let results: Vec<SelfTestResult> = registry
            .handles()
            .iter()
            .map(|handle| Self::run_device(handle, plan_for(handle.name())))
            .collect();

        let report = SelfTestReport { results };
        info!(
            "Self-test finished: {} passed, {} failed",
            report.passed_count(),
            report.failed_count()
        );
        report
    }

    /// Run `plan` against one device, stopping at the first failed step.
    pub fn run_device(handle: &DeviceHandle, plan: &[SelfTestStep]) -> SelfTestResult {
        let mut result = SelfTestResult {
            device: handle.name().to_string(),
            address: handle.address(),
            completed: Vec::with_capacity(plan.len()),
            failed_step: None,
            error: None,
        };

        for step in plan {
            match step.run(handle) {
                Ok(bytes) => {
                    match step {
                        SelfTestStep::Read { register, .. } => info!(
                            "[{}] reg 0x{:02x} read: {}",
                            handle.name(),
                            register,
                            Hex(&bytes)
                        ),
                        SelfTestStep::Write { register, .. } => info!(
                            "[{}] reg 0x{:02x} written: {}",
                            handle.name(),
                            register,
                            Hex(&bytes)
                        ),
                    }
                    result.completed.push(StepRecord { step: *step, bytes });
                }
                Err(e) => {
                    error!("[{}] self-test step {:?} failed: {}", handle.name(), step, e);
                    result.failed_step = Some(*step);
                    result.error = Some(e);
                    break;
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulation::{Fault, SimulatedAdapter, SimulationHost};
    use crate::handle::RegistrationState;
    use devbus_common::bus::adapter::Direction;
    use devbus_common::bus::descriptor::DeviceCatalog;
    use std::sync::Arc;

    fn addr(raw: u8) -> BusAddress {
        BusAddress::new(raw).unwrap()
    }

    fn registered() -> (DeviceRegistry, Arc<SimulatedAdapter>) {
        let sim = Arc::new(SimulatedAdapter::for_catalog(&DeviceCatalog::reference()));
        let host = SimulationHost::new().with_bus(sim.clone());
        let mut registry = DeviceRegistry::new();
        registry.register_all(&host, &DeviceCatalog::reference());
        (registry, sim)
    }

    #[test]
    fn plans_by_chip_name() {
        assert_eq!(plan_for("tca9555").len(), 2);
        assert!(matches!(plan_for("pcf8574")[1], SelfTestStep::Write { register: 0, .. }));
        assert_eq!(
            plan_for("ads1115"),
            &[SelfTestStep::Read { register: 0x00, length: 2 }]
        );
        assert_eq!(plan_for("lm75"), GENERIC_PLAN);
    }

    #[test]
    fn reference_board_passes() {
        let (registry, sim) = registered();
        sim.poke(addr(0x48), 0x00, &[0x12, 0x34]);

        let report = SelfTestRunner::run(&registry);
        assert_eq!(report.passed_count(), 3);

        let ads = report.result("ads1115").unwrap();
        assert_eq!(ads.completed[0].bytes, vec![0x12, 0x34]);

        let tca = report.result("tca9555").unwrap();
        assert_eq!(tca.completed.len(), 2);
        assert_eq!(tca.completed[0].bytes, vec![0xFF]);
    }

    #[test]
    fn pcf8574_write_reaches_the_bus() {
        let (registry, sim) = registered();
        SelfTestRunner::run(&registry);

        let writes: Vec<Vec<u8>> = sim
            .batches()
            .into_iter()
            .filter(|b| b.phases.len() == 1 && b.phases[0].address == addr(0x21))
            .map(|b| b.phases[0].bytes.clone())
            .collect();
        assert_eq!(writes, vec![vec![0x00, 0x01]]);
        assert_eq!(sim.peek(addr(0x21), 0x00, 1), Some(vec![0x01]));
    }

    #[test]
    fn failed_read_ends_device_test_but_keeps_registration() {
        let (registry, sim) = registered();
        sim.inject_fault(addr(0x21), Fault::ReadBatch(-libc::EIO));

        let report = SelfTestRunner::run(&registry);
        let pcf = report.result("pcf8574").unwrap();
        assert!(!pcf.passed());
        assert!(pcf.completed.is_empty());
        assert_eq!(
            pcf.error,
            Some(BusError::BusTransferFailed { code: -libc::EIO })
        );
        assert!(matches!(pcf.failed_step, Some(SelfTestStep::Read { .. })));

        // The write step never ran.
        assert!(!sim.batches().iter().any(|b| {
            b.phases.len() == 1
                && b.phases[0].address == addr(0x21)
                && b.phases[0].direction == Direction::Write
        }));

        // Other devices unaffected, registry untouched.
        assert_eq!(report.passed_count(), 2);
        assert_eq!(
            registry.get("pcf8574").unwrap().state(),
            RegistrationState::Registered
        );
        assert_eq!(registry.pending_count(), 3);
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(Hex(&[0x0a, 0xff]).to_string(), "0x0a 0xff");
        assert_eq!(Hex(&[]).to_string(), "");
    }
}
