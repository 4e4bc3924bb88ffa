//! The scheduling loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;

use super::core::TickScheduler;

/// Poll `scheduler` every `poll_interval` and run a tick whenever it is due,
/// until `shutdown` resolves.
///
/// Each tick runs on its own task. On shutdown no new tick starts; ticks
/// already running get up to `shutdown_timeout` to finish before they are
/// abandoned.
pub async fn run_scheduled(
    orchestrator: Arc<Orchestrator>,
    mut scheduler: TickScheduler,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: JoinSet<()> = JoinSet::new();
    tokio::pin!(shutdown);

    info!(
        schedule = %scheduler.expression(),
        jobs = orchestrator.jobs().count(),
        next = ?scheduler.next_after(Utc::now()),
        "Scheduler started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if !scheduler.is_due(now) {
                    continue;
                }
                scheduler.record_fire(now);
                debug!(at = %now, next = ?scheduler.next_after(now), "Tick due");

                let orchestrator = Arc::clone(&orchestrator);
                ticks.spawn(async move {
                    orchestrator.run_tick().await;
                });
            }
            Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "tick task panicked");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, no further ticks will start");
                break;
            }
        }
    }

    if ticks.is_empty() {
        return;
    }

    info!(
        in_flight = ?orchestrator.in_flight(),
        timeout_secs = shutdown_timeout.as_secs(),
        "Waiting for running ticks"
    );
    let drained = tokio::time::timeout(shutdown_timeout, async {
        while ticks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            in_flight = ?orchestrator.in_flight(),
            "Shutdown timeout elapsed, abandoning running ticks"
        );
        ticks.abort_all();
    }
}
