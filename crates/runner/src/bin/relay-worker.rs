//! relay-worker: forwards new log lines to the collector on a cron schedule.
//!
//! Every tick, each configured source is re-read, lines newer than its
//! checkpoint are POSTed to the collector in order, and the checkpoint moves
//! to the last line of the confirmed prefix.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use relay_checkpoint::CheckpointStore;
use relay_core::config::{load_dotenv, Config};
use relay_core::JobKind;
use relay_forward::{Dispatcher, HttpDeliverer};
use relay_runner::{run_scheduled, JobStatus, Orchestrator, TickScheduler};

// ── CLI ─────────────────────────────────────────────────────────────

/// Line relay worker: periodic checkpointed log forwarding.
#[derive(Parser, Debug)]
#[command(name = "relay-worker", version, about)]
struct Cli {
    /// Run a single tick over all sources, then exit.
    #[arg(long)]
    once: bool,

    /// Clear the checkpoint of one source key (e.g. `redAlarm`) and exit.
    /// The next tick resends that source from the beginning.
    #[arg(long, value_name = "KEY", conflicts_with = "once")]
    reset: Option<String>,

    /// Cron expression overriding RELAY_SCHEDULE (5 or 6 fields).
    #[arg(long)]
    schedule: Option<String>,

    /// Seconds to wait for running ticks on shutdown.
    #[arg(long, env = "RELAY_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    shutdown_timeout: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(expr) = cli.schedule {
        config = config
            .with_schedule(expr)
            .context("invalid --schedule expression")?;
    }
    config.log_summary();

    let store = Arc::new(CheckpointStore::new(&config.checkpoint.path));

    if let Some(key) = cli.reset {
        let kind = JobKind::from_key(&key).ok_or_else(|| {
            let known: Vec<_> = JobKind::ALL.iter().map(|k| k.key()).collect();
            anyhow!("unknown source key '{key}' (expected one of: {})", known.join(", "))
        })?;
        store
            .reset(kind.key())
            .await
            .with_context(|| format!("failed to reset checkpoint for '{kind}'"))?;
        info!(job = %kind, path = %store.path().display(), "checkpoint reset");
        return Ok(());
    }

    let deliverer = HttpDeliverer::new(config.schedule.delivery_timeout)
        .context("failed to build HTTP client")?;
    let orchestrator = Arc::new(Orchestrator::new(
        config.jobs()?,
        store,
        Dispatcher::new(Arc::new(deliverer)),
    ));

    if cli.once {
        let summary = orchestrator.run_tick().await;
        for (key, status) in &summary.jobs {
            if let JobStatus::Failed(reason) = status {
                error!(job = *key, %reason, "job failed");
            }
        }
        return Ok(());
    }

    let scheduler = TickScheduler::new(
        config.schedule.parse_cron()?,
        config.schedule.cron.clone(),
        Utc::now(),
    );

    info!("relay-worker starting");
    run_scheduled(
        orchestrator,
        scheduler,
        config.schedule.poll_interval,
        Duration::from_secs(cli.shutdown_timeout),
        shutdown_signal(),
    )
    .await;
    info!("relay-worker exited cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl_c, running until killed");
        std::future::pending::<()>().await;
    }
}
