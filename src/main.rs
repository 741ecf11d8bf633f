//! Main entry point for the fan controller

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use pwm_fan_control::{
    args::Args,
    config::Config,
    control_loop::{ControlLoop, LogSink},
    logging,
    module_guard::{check_module_not_loaded, PROC_MODULES},
    pwm::PwmChannel,
    sensors::{build_cpu_provider, build_disk_provider},
};
use std::path::Path;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::setup(args.verbose) {
        eprintln!("Failed to set up logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "pwm-fan-control v{} (git {} / {}) built {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_HASH").unwrap_or("unknown"),
        option_env!("GIT_DESC").unwrap_or("unknown"),
        option_env!("BUILD_TIME").unwrap_or("unknown"),
    );

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    check_module_not_loaded(Path::new(PROC_MODULES), &config.blacklisted_module)?;

    // Handlers go in before the channel is touched so an early signal is not fatal
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let mut control = ControlLoop::new(
        &config,
        PwmChannel::new(&config.pwm_chip, config.pwm_channel),
        build_cpu_provider(&config),
        build_disk_provider(&config),
        LogSink,
    );
    control
        .start()
        .with_context(|| format!("Failed to set up PWM on {}", config.pwm_chip.display()))?;

    if args.once {
        let record = control.tick()?;
        println!("{}", record);
        return Ok(());
    }

    let shutdown = async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    };
    control.run(shutdown).await?;
    Ok(())
}
