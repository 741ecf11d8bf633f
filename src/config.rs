//! Controller configuration
//!
//! The YAML document is decoded once at startup and validated into an
//! immutable [`Config`]. A missing file yields the built-in defaults, which
//! leave the fan curve empty (fan always off).

use crate::errors::{PwmFanError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/default/pwm-fan-control.yaml";

const DEFAULT_CHECK_INTERVAL: u64 = 5;
const DEFAULT_PWM_PERIOD: u32 = 40_000;
const DEFAULT_PWM_CHIP: &str = "/sys/class/pwm/pwmchip1";
const DEFAULT_THERMAL_ROOT: &str = "/sys/class/thermal";
const DEFAULT_BLACKLISTED_MODULE: &str = "pwm_fan";
const DEFAULT_SENSOR_CHIPS: [&str; 2] = ["cpu_thermal-virtual-0", "gpu_thermal-virtual-0"];

/// One tier of the fan curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanStep {
    /// CPU temperature in °C above which this step engages
    #[serde(rename = "cpu")]
    pub cpu_threshold: i32,
    /// Disk temperature in °C above which this step engages
    #[serde(rename = "disk")]
    pub disk_threshold: i32,
    /// Fan duty in percent (0-100)
    #[serde(rename = "speed")]
    pub duty_percent: u8,
}

impl FanStep {
    pub fn new(cpu_threshold: i32, disk_threshold: i32, duty_percent: u8) -> Self {
        Self {
            cpu_threshold,
            disk_threshold,
            duty_percent,
        }
    }
}

/// Where CPU temperatures come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CpuSensorKind {
    /// `sensors -j` queries against the configured chips
    LmSensors,
    /// `thermal_zone*/temp` files under the thermal root
    ThermalZones,
}

/// Where disk temperatures come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiskSensorKind {
    /// `smartctl -A -j <device>`
    Smartctl,
    /// `hddtemp <device> --numeric`
    Hddtemp,
}

/// The document as written on disk, before validation
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    check_interval: u64,
    pwm_period: u32,
    fan_speed: Vec<FanStep>,
    disk: Vec<String>,
    pwm_chip: PathBuf,
    pwm_channel: u32,
    cpu_sensor: CpuSensorKind,
    sensor_chips: Vec<String>,
    thermal_root: PathBuf,
    disk_sensor: DiskSensorKind,
    blacklisted_module: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            pwm_period: DEFAULT_PWM_PERIOD,
            fan_speed: Vec::new(),
            disk: Vec::new(),
            pwm_chip: PathBuf::from(DEFAULT_PWM_CHIP),
            pwm_channel: 0,
            cpu_sensor: CpuSensorKind::LmSensors,
            sensor_chips: DEFAULT_SENSOR_CHIPS.iter().map(|c| c.to_string()).collect(),
            thermal_root: PathBuf::from(DEFAULT_THERMAL_ROOT),
            disk_sensor: DiskSensorKind::Smartctl,
            blacklisted_module: DEFAULT_BLACKLISTED_MODULE.to_string(),
        }
    }
}

/// Validated controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub check_interval: Duration,
    pub pwm_period_ns: u32,
    pub steps: Vec<FanStep>,
    pub disk_devices: Vec<String>,
    pub pwm_chip: PathBuf,
    pub pwm_channel: u32,
    pub cpu_sensor: CpuSensorKind,
    pub sensor_chips: Vec<String>,
    pub thermal_root: PathBuf,
    pub disk_sensor: DiskSensorKind,
    pub blacklisted_module: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_checked(RawConfig::default())
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|e| PwmFanError::io(path, e))?;
        let config = Self::from_yaml(&text)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        if raw.check_interval == 0 {
            return Err(PwmFanError::Config(
                "check_interval must be greater than 0".to_string(),
            ));
        }
        if raw.pwm_period == 0 {
            return Err(PwmFanError::Config(
                "pwm_period must be greater than 0".to_string(),
            ));
        }
        if let Some(step) = raw.fan_speed.iter().find(|s| s.duty_percent > 100) {
            return Err(PwmFanError::Config(format!(
                "fan speed {}% is outside 0-100",
                step.duty_percent
            )));
        }
        if !is_monotonic(&raw.fan_speed) {
            warn!("fan_speed thresholds are not ordered; steps are matched in file order");
        }

        Ok(Self::from_checked(raw))
    }

    fn from_checked(raw: RawConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(raw.check_interval),
            pwm_period_ns: raw.pwm_period,
            steps: raw.fan_speed,
            disk_devices: raw.disk,
            pwm_chip: raw.pwm_chip,
            pwm_channel: raw.pwm_channel,
            cpu_sensor: raw.cpu_sensor,
            sensor_chips: raw.sensor_chips,
            thermal_root: raw.thermal_root,
            disk_sensor: raw.disk_sensor,
            blacklisted_module: raw.blacklisted_module,
        }
    }
}

/// True when both threshold columns run in one direction through the table
fn is_monotonic(steps: &[FanStep]) -> bool {
    let ordered = |key: fn(&FanStep) -> i32| {
        let ascending = steps.windows(2).all(|w| key(&w[0]) <= key(&w[1]));
        let descending = steps.windows(2).all(|w| key(&w[0]) >= key(&w[1]));
        ascending || descending
    };
    ordered(|s| s.cpu_threshold) && ordered(|s| s.disk_threshold)
}
