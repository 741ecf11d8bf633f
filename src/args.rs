//! Command line argument parsing for the fan controller

use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// PWM Fan Control
///
/// Drives a PWM fan from CPU and disk temperatures using a stepped fan curve.
#[derive(Parser, Debug)]
#[command(name = "pwm-fan-control")]
#[command(about = "Temperature driven PWM fan control")]
#[command(version)]
pub struct Args {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path of the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Run a single control iteration and exit
    #[arg(long)]
    pub once: bool,
}
