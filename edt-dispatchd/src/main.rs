//! Emergency Dispatch Twin Simulator - Dispatch Daemon
//!
//! Loads the grid, rescuer, and emergency-type catalogs, binds the message
//! bus, and runs the ingress dispatcher until interrupted.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use edt_common::clock::{SharedClock, SystemClock};
use edt_common::config::{load_emergency_catalog, load_grid_config, load_rescuer_catalog};
use edt_common::eventlog::EventLog;

use edt_dispatchd::bus::DatagramBus;
use edt_dispatchd::ingress;
use edt_dispatchd::intent::IntentTable;
use edt_dispatchd::twins::TwinPool;
use edt_dispatchd::worker::WorkerContext;

#[derive(Parser)]
#[command(name = "edt-dispatchd")]
#[command(author, version, about = "Emergency dispatch twin simulator daemon")]
struct Cli {
    /// Path to the grid configuration TOML file.
    #[arg(long, default_value = "grid.toml")]
    grid: PathBuf,

    /// Path to the rescuer catalog TOML file.
    #[arg(long, default_value = "rescuers.toml")]
    rescuers: PathBuf,

    /// Path to the emergency-type catalog TOML file.
    #[arg(long, default_value = "emergency_types.toml")]
    emergency_types: PathBuf,

    /// Directory the message-bus socket and event log are created under.
    #[arg(long, default_value = "/tmp/edt-dispatchd")]
    runtime_dir: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    info!("starting edt-dispatchd");

    std::fs::create_dir_all(&cli.runtime_dir)
        .with_context(|| format!("creating runtime directory {}", cli.runtime_dir.display()))?;

    let grid = load_grid_config(&cli.grid)
        .with_context(|| format!("loading grid config from {}", cli.grid.display()))?;
    let rescuers = load_rescuer_catalog(&cli.rescuers)
        .with_context(|| format!("loading rescuer catalog from {}", cli.rescuers.display()))?;
    let emergency_types = load_emergency_catalog(&cli.emergency_types, &rescuers)
        .with_context(|| format!("loading emergency catalog from {}", cli.emergency_types.display()))?;

    info!(
        rescuer_types = rescuers.types.len(),
        twins = rescuers.twin_seeds.len(),
        emergency_types = emergency_types.len(),
        grid = %format!("{}x{}", grid.width, grid.height),
        "loaded configuration"
    );

    let socket_path = cli.runtime_dir.join(&grid.queue_name);
    let bus = Arc::new(
        DatagramBus::bind(&socket_path)
            .with_context(|| format!("binding message bus at {}", socket_path.display()))?,
    );
    info!(socket = %socket_path.display(), "message bus bound");

    let log_path = cli.runtime_dir.join("events.log");
    let clock: SharedClock = Arc::new(SystemClock);
    let log = Arc::new(
        EventLog::open(&log_path, clock.clone())
            .with_context(|| format!("opening event log at {}", log_path.display()))?,
    );

    let ctx = WorkerContext {
        pool: Arc::new(TwinPool::from_catalog(&rescuers)),
        intents: Arc::new(IntentTable::new()),
        log,
        clock,
    };

    let terminate = Arc::new(AtomicBool::new(false));
    {
        let terminate = terminate.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("received interrupt, shutting down ingress loop");
                terminate.store(true, Ordering::Relaxed);
            }
        });
    }

    info!("ingress dispatcher running");
    ingress::run_ingress(bus, Arc::new(grid), Arc::new(emergency_types), ctx, terminate).await;
    info!("edt-dispatchd exiting");

    Ok(())
}
