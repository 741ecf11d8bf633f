//! Kernel PWM channel control through sysfs
//!
//! [`PwmChannel`] holds only the attribute paths of one channel. Every getter
//! is a single read and every setter a single write, so the kernel stays the
//! source of truth for the channel state.

use crate::errors::{PwmFanError, Result};
use log::{debug, info};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Signal polarity of a PWM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Normal,
    Inversed,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Normal => "normal",
            Polarity::Inversed => "inversed",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = PwmFanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "normal" => Ok(Polarity::Normal),
            "inversed" => Ok(Polarity::Inversed),
            other => Err(PwmFanError::parse("polarity", other)),
        }
    }
}

/// PWM frequency in kHz for a period in nanoseconds
pub fn frequency_khz(period_ns: u32) -> f64 {
    if period_ns == 0 {
        return 0.0;
    }
    1.0 / (period_ns as f64 / 1e9) / 1000.0
}

/// Handle on one exported PWM channel
#[derive(Debug, Clone)]
pub struct PwmChannel {
    channel: u32,
    export_path: PathBuf,
    duty_cycle_path: PathBuf,
    period_path: PathBuf,
    polarity_path: PathBuf,
    enable_path: PathBuf,
}

impl PwmChannel {
    /// Create a handle for `channel` on the chip at `chip_path`
    pub fn new(chip_path: &Path, channel: u32) -> Self {
        let channel_path = chip_path.join(format!("pwm{}", channel));
        Self {
            channel,
            export_path: chip_path.join("export"),
            duty_cycle_path: channel_path.join("duty_cycle"),
            period_path: channel_path.join("period"),
            polarity_path: channel_path.join("polarity"),
            enable_path: channel_path.join("enable"),
        }
    }

    /// Ask the kernel to expose the channel. An already exported channel
    /// refuses the write, which is not an error.
    pub fn export(&self) -> Result<()> {
        match write_attribute(&self.export_path, &self.channel.to_string()) {
            Ok(()) => {
                info!("Exported PWM channel {}", self.channel);
                Ok(())
            }
            Err(PwmFanError::Io { source, .. }) if source.kind() != ErrorKind::NotFound => {
                info!("pwmchip already activated! ({})", source);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_period(&self) -> Result<u32> {
        read_number(&self.period_path)
    }

    pub fn set_period(&self, ns: u32) -> Result<()> {
        write_attribute(&self.period_path, &ns.to_string())
    }

    pub fn get_duty_cycle(&self) -> Result<u32> {
        read_number(&self.duty_cycle_path)
    }

    /// Set the active time in nanoseconds. The caller keeps it at or below
    /// the period.
    pub fn set_duty_cycle(&self, ns: u32) -> Result<()> {
        write_attribute(&self.duty_cycle_path, &ns.to_string())
    }

    pub fn get_enabled(&self) -> Result<bool> {
        let value: u32 = read_number(&self.enable_path)?;
        Ok(value == 1)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        write_attribute(&self.enable_path, if enabled { "1" } else { "0" })
    }

    pub fn get_polarity(&self) -> Result<Polarity> {
        read_attribute(&self.polarity_path)?.parse()
    }

    /// Change the polarity. Most drivers only accept this while the channel
    /// is disabled.
    pub fn set_polarity(&self, polarity: Polarity) -> Result<()> {
        write_attribute(&self.polarity_path, polarity.as_str())
    }

    /// Fail when any attribute the control loop depends on is absent
    pub fn ensure_control_files(&self) -> Result<()> {
        for path in [&self.duty_cycle_path, &self.period_path, &self.enable_path] {
            if !path.is_file() {
                return Err(PwmFanError::MissingControl(path.clone()));
            }
        }
        Ok(())
    }

    /// Bring the channel up: export, period, initial duty, then a
    /// disable/polarity/enable cycle.
    pub fn initialize(&self, period_ns: u32, initial_duty_ns: u32) -> Result<()> {
        self.export()?;
        self.ensure_control_files()?;

        // The kernel rejects a period shorter than the active duty
        if self.get_duty_cycle()? > period_ns {
            self.set_duty_cycle(initial_duty_ns.min(period_ns))?;
        }
        self.set_period(period_ns)?;
        self.set_duty_cycle(initial_duty_ns)?;

        self.set_enabled(false)?;
        self.set_polarity(Polarity::Normal)?;
        self.set_enabled(true)?;

        self.ensure_control_files()?;
        debug!(
            "PWM channel {} ready: period {} ns, duty {} ns",
            self.channel, period_ns, initial_duty_ns
        );
        Ok(())
    }
}

fn read_attribute(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PwmFanError::io(path, e))
}

fn read_number(path: &Path) -> Result<u32> {
    let content = read_attribute(path)?;
    content
        .trim()
        .parse()
        .map_err(|_| PwmFanError::parse(path.display(), &content))
}

/// sysfs attributes exist already; never create them
fn write_attribute(path: &Path, value: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| PwmFanError::io(path, e))?;
    file.write_all(format!("{}\n", value).as_bytes())
        .map_err(|e| PwmFanError::io(path, e))
}
