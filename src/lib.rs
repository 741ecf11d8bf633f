//! PWM Fan Control
//!
//! Drives a sysfs PWM fan on a single-board computer from CPU and disk
//! temperatures, using a stepped fan curve with hysteresis.

pub mod args;
pub mod config;
pub mod control_loop;
pub mod errors;
pub mod fan_curve;
pub mod logging;
pub mod module_guard;
pub mod pwm;
pub mod sensors;

// Re-export commonly used types
pub use config::{Config, FanStep};
pub use control_loop::{ControlLoop, Diagnostic, DiagnosticSink, LogSink};
pub use errors::{PwmFanError, Result};
pub use fan_curve::FanCurve;
pub use pwm::{Polarity, PwmChannel};
pub use sensors::TemperatureProvider;
