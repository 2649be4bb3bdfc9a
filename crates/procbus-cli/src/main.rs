//! procbus - supervise local processes over MQTT.
//!
//! ```text
//! procbus -n pc -u mqtt://127.0.0.1 -f ./procs.json
//! ```

mod logging;
mod mqtt;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use procbus_core::app::{AppBuilder, SupervisorConfig};
use procbus_core::domain::{ProcessTable, Topics};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::logging::{Verbosity, init_logging};
use crate::shutdown::wait_for_shutdown_signal;

const BUS_EVENT_CAPACITY: usize = 256;
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "procbus", version, about = "Spawn, pipe to and signal local processes over MQTT")]
struct Cli {
    #[arg(short = 'v', long, value_enum, default_value_t = Verbosity::Info)]
    verbosity: Verbosity,

    /// Instance name: MQTT client id and topic prefix.
    #[arg(short = 'n', long, default_value = "pc")]
    name: String,

    /// MQTT broker URL.
    #[arg(short = 'u', long, default_value = "mqtt://127.0.0.1")]
    url: String,

    /// Process table (JSON).
    #[arg(short = 'f', long, default_value = "./procs.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity);
    info!(version = env!("CARGO_PKG_VERSION"), "procbus starting");

    let table = ProcessTable::load(&cli.config)
        .with_context(|| format!("loading process table {}", cli.config.display()))?;
    info!(processes = table.len(), config = %cli.config.display(), "process table loaded");

    let topics = Topics::new(cli.name.clone());
    info!(url = %cli.url, "mqtt trying to connect");
    let (bus, eventloop) =
        mqtt::connect(&cli.url, &cli.name, &topics).context("configuring mqtt client")?;

    let runtime = AppBuilder::new(SupervisorConfig::new(cli.name.clone()))
        .process_table(table)
        .bus(Arc::new(bus.clone()))
        .build()
        .context("building supervisor")?;

    let (bus_tx, bus_rx) = mpsc::channel(BUS_EVENT_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = tokio::spawn(mqtt::drive(eventloop, bus_tx));
    let supervisor = tokio::spawn(runtime.run(bus_rx, shutdown_rx));

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "signal handler failed, stopping");
    }
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let snapshot = supervisor.await.context("supervisor task failed")?;
    info!(status = %serde_json::to_string(&snapshot)?, "final status");

    bus.disconnect().await;
    if tokio::time::timeout(DISCONNECT_GRACE, driver).await.is_err() {
        warn!("mqtt disconnect did not complete in time");
    }
    Ok(())
}
