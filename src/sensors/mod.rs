//! Temperature sources for the control loop
//!
//! Each provider reports the hottest reading across its sources in whole
//! °C. A provider with no sources reports 0; a configured source that cannot
//! produce a number is an error.

pub mod cpu;
pub mod disk;

use crate::config::{Config, CpuSensorKind, DiskSensorKind};
use crate::errors::{PwmFanError, Result};
use log::trace;
use std::io::ErrorKind;
use std::process::Command;

pub use cpu::{LmSensorsSensor, ThermalZoneSensor};
pub use disk::{HddtempSensor, SmartctlSensor};

/// A class of temperature sensors reduced to its maximum
pub trait TemperatureProvider {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Hottest current reading in °C, or 0 when nothing is configured
    fn read_max(&self) -> Result<i32>;
}

/// Runs an external query tool and hands back its standard output
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommand;

impl CommandRunner for SystemCommand {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        trace!("Running {} {}", program, args.join(" "));
        // Exit status is ignored: smartctl reports disk health bits through it
        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PwmFanError::CommandNotFound {
                    command: program.to_string(),
                }
            } else {
                PwmFanError::io(program, e)
            }
        })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Maximum of the collected readings, 0 when there are none
pub(crate) fn max_or_zero(readings: &[i32]) -> i32 {
    readings.iter().copied().max().unwrap_or(0)
}

/// Select the CPU provider named by the configuration
pub fn build_cpu_provider(config: &Config) -> Box<dyn TemperatureProvider> {
    match config.cpu_sensor {
        CpuSensorKind::LmSensors => Box::new(LmSensorsSensor::new(
            config.sensor_chips.clone(),
            SystemCommand,
        )),
        CpuSensorKind::ThermalZones => Box::new(ThermalZoneSensor::new(&config.thermal_root)),
    }
}

/// Select the disk provider named by the configuration
pub fn build_disk_provider(config: &Config) -> Box<dyn TemperatureProvider> {
    let devices = config.disk_devices.clone();
    match config.disk_sensor {
        DiskSensorKind::Smartctl => Box::new(SmartctlSensor::new(devices, SystemCommand)),
        DiskSensorKind::Hddtemp => Box::new(HddtempSensor::new(devices, SystemCommand)),
    }
}
