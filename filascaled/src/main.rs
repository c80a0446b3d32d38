//! FilaScale Monitor
//!
//! Polls a FilaScale spool sensor over USB serial, checks weight, humidity
//! and drybox temperature against the loaded material's thresholds, and
//! reports the latest status.
//!
//! The printer's own serial port can be excluded so the monitor never opens
//! it by accident. With no subcommand the daemon polls until SIGINT/SIGTERM;
//! `ports`, `status`, `reset` and `calibrate` are one-shot maintenance tools.

mod config;
mod publish;
mod shutdown;
mod supervisor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Overrides;
use filascale_core::{evaluate_thresholds, FilaScaleConfig};
use filascale_hardware::{ConnectionManager, ExchangeEngine};
use publish::{EventLog, LogSink};
use std::path::PathBuf;
use supervisor::PollSupervisor;
use tokio::signal;
use tracing::{error, info, warn};

/// FilaScale spool monitor
#[derive(Parser, Debug)]
#[command(name = "filascaled")]
#[command(version, about = "FilaScale filament spool monitor", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Poll the device until interrupted (default)
    Run,
    /// List the serial ports a connect would try, in order
    Ports,
    /// Read one status record and check it against thresholds
    Status,
    /// Pulse the device's reset line
    Reset,
    /// Send scale calibration to the device
    Calibrate {
        /// Load cell offset
        #[arg(long, allow_hyphen_values = true)]
        offset: f64,
        /// Load cell gain
        #[arg(long)]
        gain: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    let config_path = config::resolve_config_path(args.config);
    info!("Configuration file: {}", config_path.display());

    let mut config = config::load_config(&config_path).await?;
    args.overrides.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Ports => list_ports(&config),
        Command::Status => print_status(&config).await,
        Command::Reset => reset(&config).await,
        Command::Calibrate { offset, gain } => calibrate(&config, offset, gain).await,
    }
}

fn build_engine(config: &FilaScaleConfig) -> ExchangeEngine {
    ExchangeEngine::new(ConnectionManager::new(
        config.connection.clone(),
        config.link_timing(),
    ))
}

fn connected_engine(config: &FilaScaleConfig) -> Result<ExchangeEngine> {
    let mut engine = build_engine(config);
    let port = engine.connect().context("No FilaScale device found")?;
    info!("Using {}", port);
    Ok(engine)
}

async fn run(config: FilaScaleConfig) -> Result<()> {
    info!(
        "FilaScale monitor starting (material {})",
        config.monitor.material
    );

    let mut supervisor = PollSupervisor::new(
        build_engine(&config),
        config.thresholds.clone(),
        config.monitor.material.clone(),
        config.timing.poll_interval(),
    )
    .with_sink(Box::new(LogSink));

    if let Some(path) = &config.monitor.event_log {
        match EventLog::open(path).await {
            Ok(log) => supervisor = supervisor.with_sink(Box::new(log)),
            Err(e) => warn!("Event log disabled: {}", e),
        }
    }

    let handle = supervisor.start();
    info!("Monitor ready!");

    shutdown_signal().await;
    shutdown::stop_monitoring(handle).await;

    info!("Monitor shutdown complete");
    Ok(())
}

fn list_ports(config: &FilaScaleConfig) -> Result<()> {
    let candidates = build_engine(config).connection().candidates();
    if candidates.is_empty() {
        println!("No candidate serial ports found");
    }
    for port in candidates {
        println!("{}", port);
    }
    if let Some(excluded) = &config.connection.excluded_port {
        println!("(excluded: {})", excluded);
    }
    Ok(())
}

async fn print_status(config: &FilaScaleConfig) -> Result<()> {
    let mut engine = connected_engine(config)?;
    let status = engine
        .request_status()
        .await
        .context("Status request failed")?;
    engine.disconnect();

    println!("{}", serde_json::to_string_pretty(&status)?);

    match config.thresholds.get(&config.monitor.material) {
        Some(set) => {
            let violations = evaluate_thresholds(&status, set);
            if violations.is_empty() {
                println!("All readings within {} thresholds", config.monitor.material);
            }
            for violation in violations {
                println!("{}: {}", config.monitor.material, violation);
            }
        }
        None => warn!("No thresholds for material '{}'", config.monitor.material),
    }
    Ok(())
}

async fn reset(config: &FilaScaleConfig) -> Result<()> {
    let mut engine = connected_engine(config)?;
    engine.reset_device().await.context("Reset failed")?;
    engine.disconnect();
    println!("Device reset");
    Ok(())
}

async fn calibrate(config: &FilaScaleConfig, offset: f64, gain: f64) -> Result<()> {
    let mut engine = connected_engine(config)?;
    let calibration = serde_json::json!({ "scale": { "offset": offset, "gain": gain } });
    let (reply_type, reply) = engine
        .send_config(&calibration)
        .await
        .context("Calibration failed")?;
    engine.disconnect();

    println!(
        "Device answered {}: {}",
        reply_type,
        String::from_utf8_lossy(&reply)
    );
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
