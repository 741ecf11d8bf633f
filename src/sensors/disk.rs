//! Disk temperature providers

use super::{max_or_zero, CommandRunner, TemperatureProvider};
use crate::errors::{PwmFanError, Result};
use log::trace;
use serde_json::Value;

/// Reads `temperature.current` from `smartctl -A -j <device>`
#[derive(Debug, Clone)]
pub struct SmartctlSensor<R> {
    devices: Vec<String>,
    runner: R,
}

impl<R: CommandRunner> SmartctlSensor<R> {
    pub fn new(devices: Vec<String>, runner: R) -> Self {
        Self { devices, runner }
    }

    fn read_device(&self, device: &str) -> Result<i32> {
        let output = self.runner.run("smartctl", &["-A", "-j", device])?;
        let document: Value = serde_json::from_str(&output)?;
        let current = document
            .pointer("/temperature/current")
            .and_then(Value::as_i64)
            .ok_or_else(|| PwmFanError::SensorUnavailable(device.to_string()))?;
        Ok(current as i32)
    }
}

impl<R: CommandRunner> TemperatureProvider for SmartctlSensor<R> {
    fn name(&self) -> &str {
        "smartctl"
    }

    fn read_max(&self) -> Result<i32> {
        let mut readings = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let celsius = self.read_device(device)?;
            trace!("{}: {} °C", device, celsius);
            readings.push(celsius);
        }
        Ok(max_or_zero(&readings))
    }
}

/// Reads the bare number printed by `hddtemp <device> --numeric`
#[derive(Debug, Clone)]
pub struct HddtempSensor<R> {
    devices: Vec<String>,
    runner: R,
}

impl<R: CommandRunner> HddtempSensor<R> {
    pub fn new(devices: Vec<String>, runner: R) -> Self {
        Self { devices, runner }
    }
}

impl<R: CommandRunner> TemperatureProvider for HddtempSensor<R> {
    fn name(&self) -> &str {
        "hddtemp"
    }

    fn read_max(&self) -> Result<i32> {
        let mut readings = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let output = self.runner.run("hddtemp", &[device.as_str(), "--numeric"])?;
            let celsius: i32 = output
                .trim()
                .parse()
                .map_err(|_| PwmFanError::parse(format!("hddtemp {}", device), &output))?;
            trace!("{}: {} °C", device, celsius);
            readings.push(celsius);
        }
        Ok(max_or_zero(&readings))
    }
}
