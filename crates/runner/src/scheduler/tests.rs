//! Tests for the scheduler module.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use relay_checkpoint::CheckpointStore;
use relay_core::config::normalize_cron;
use relay_core::{JobKind, SourceJob};
use relay_forward::{Deliverer, DeliveryError, Dispatcher};
use tokio::sync::Semaphore;

use crate::orchestrator::Orchestrator;
use crate::scheduler::cron::is_cron_due;
use crate::scheduler::{run_scheduled, TickScheduler};

fn schedule(expr: &str) -> Schedule {
    Schedule::from_str(&normalize_cron(expr)).unwrap()
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

// -- is_cron_due -------------------------------------------------------

#[test]
fn is_cron_due_when_tick_passed_since() {
    let every_minute = schedule("*/1 * * * *");
    assert!(is_cron_due(&every_minute, at(10, 1, 0), at(10, 0, 30)));
    assert!(is_cron_due(&every_minute, at(10, 1, 5), at(10, 0, 30)));
}

#[test]
fn is_cron_due_not_before_next_tick() {
    let every_minute = schedule("*/1 * * * *");
    assert!(!is_cron_due(&every_minute, at(10, 0, 59), at(10, 0, 30)));
}

#[test]
fn is_cron_due_excludes_since_itself() {
    let every_minute = schedule("*/1 * * * *");
    assert!(!is_cron_due(&every_minute, at(10, 1, 0), at(10, 1, 0)));
}

// -- TickScheduler -----------------------------------------------------

#[test]
fn does_not_fire_for_points_before_creation() {
    let sched = TickScheduler::new(schedule("*/5 * * * *"), "*/5 * * * *", at(10, 2, 0));
    assert!(!sched.is_due(at(10, 2, 0)));
    assert!(!sched.is_due(at(10, 4, 59)));
    assert!(sched.is_due(at(10, 5, 0)));
}

#[test]
fn fires_once_per_schedule_point() {
    let mut sched = TickScheduler::new(schedule("*/1 * * * *"), "*/1 * * * *", at(10, 0, 10));
    assert!(sched.is_due(at(10, 1, 0)));
    sched.record_fire(at(10, 1, 0));
    assert!(!sched.is_due(at(10, 1, 0)));
    assert!(!sched.is_due(at(10, 1, 30)));
    assert!(sched.is_due(at(10, 2, 0)));
    assert_eq!(sched.last_fired(), Some(at(10, 1, 0)));
}

#[test]
fn missed_points_collapse_into_one_fire() {
    let mut sched = TickScheduler::new(schedule("*/1 * * * *"), "*/1 * * * *", at(10, 0, 10));
    // Process stalled for several minutes.
    assert!(sched.is_due(at(10, 7, 30)));
    sched.record_fire(at(10, 7, 30));
    assert!(!sched.is_due(at(10, 7, 45)));
    assert!(sched.is_due(at(10, 8, 0)));
}

#[test]
fn six_field_expressions_are_supported() {
    let sched = TickScheduler::new(schedule("*/10 * * * * *"), "*/10 * * * * *", at(10, 0, 1));
    assert_eq!(sched.next_after(at(10, 0, 1)), Some(at(10, 0, 10)));
    assert_eq!(sched.expression(), "*/10 * * * * *");
}

// -- run_scheduled -----------------------------------------------------

struct AcceptAll;

#[async_trait::async_trait]
impl Deliverer for AcceptAll {
    async fn deliver(&self, _target: &url::Url, _line: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "accept-all"
    }
}

#[tokio::test]
async fn loop_runs_ticks_until_shutdown() {
    let tmp = tempfile::TempDir::new().unwrap();
    let source = tmp.path().join("prevision.log");
    std::fs::write(&source, "p1\np2\n").unwrap();

    let store = Arc::new(CheckpointStore::new(tmp.path().join("last_line.json")));
    let job = relay_core::SourceJob::new(
        relay_core::JobKind::Prevision,
        &source,
        url::Url::parse("http://collector.test/prevision").unwrap(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        vec![job],
        Arc::clone(&store),
        Dispatcher::new(Arc::new(AcceptAll)),
    ));

    // Every second; created one minute in the past so the first poll fires.
    let scheduler = TickScheduler::new(
        schedule("* * * * * *"),
        "* * * * * *",
        Utc::now() - chrono::Duration::minutes(1),
    );

    run_scheduled(
        orchestrator,
        scheduler,
        Duration::from_millis(20),
        Duration::from_secs(5),
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert_eq!(
        store.get("prevision").await.unwrap().as_line(),
        Some("p2")
    );
}

/// Blocks every `/slow` delivery until the gate opens; rejects every `/fast`
/// delivery so its line is resent on each tick.
struct GatedDeliverer {
    gate: Semaphore,
    slow_calls: AtomicUsize,
    fast_calls: AtomicUsize,
}

impl GatedDeliverer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            slow_calls: AtomicUsize::new(0),
            fast_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Deliverer for GatedDeliverer {
    async fn deliver(&self, target: &url::Url, _line: &str) -> Result<(), DeliveryError> {
        if target.path() == "/slow" {
            self.slow_calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            Ok(())
        } else {
            self.fast_calls.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Rejected {
                status: 503,
                body: "collector busy".to_string(),
            })
        }
    }

    fn channel_name(&self) -> &str {
        "gated"
    }
}

/// A `prevision` job on `/slow` and a `settings` job on `/fast`.
fn gated_orchestrator(dir: &Path, deliverer: Arc<GatedDeliverer>) -> Arc<Orchestrator> {
    let prevision = dir.join("prevision.log");
    let settings = dir.join("settings.log");
    std::fs::write(&prevision, "p1\n").unwrap();
    std::fs::write(&settings, "s1\n").unwrap();

    let jobs = vec![
        SourceJob::new(
            JobKind::Prevision,
            prevision,
            url::Url::parse("http://collector.test/slow").unwrap(),
        ),
        SourceJob::new(
            JobKind::Settings,
            settings,
            url::Url::parse("http://collector.test/fast").unwrap(),
        ),
    ];
    Arc::new(Orchestrator::new(
        jobs,
        Arc::new(CheckpointStore::new(dir.join("last_line.json"))),
        Dispatcher::new(deliverer),
    ))
}

fn every_second() -> TickScheduler {
    TickScheduler::new(
        schedule("* * * * * *"),
        "* * * * * *",
        Utc::now() - chrono::Duration::minutes(1),
    )
}

async fn wait_until(cond: impl Fn() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn blocked_tick_does_not_delay_the_next_one() {
    let tmp = tempfile::TempDir::new().unwrap();
    let deliverer = GatedDeliverer::new();
    let orchestrator = gated_orchestrator(tmp.path(), Arc::clone(&deliverer));

    // Stop once a later tick has re-run the fast job while the first tick is
    // still parked on the slow one; then let the slow delivery finish.
    let watcher = Arc::clone(&deliverer);
    let shutdown = async move {
        wait_until(|| {
            watcher.slow_calls.load(Ordering::SeqCst) == 1
                && watcher.fast_calls.load(Ordering::SeqCst) >= 2
        })
        .await;
        watcher.gate.add_permits(16);
    };

    tokio::time::timeout(
        Duration::from_secs(10),
        run_scheduled(
            Arc::clone(&orchestrator),
            every_second(),
            Duration::from_millis(20),
            Duration::from_secs(5),
            shutdown,
        ),
    )
    .await
    .expect("second tick never ran while the first was blocked");

    // The overlapping tick skipped the slow job instead of starting it again.
    assert_eq!(deliverer.slow_calls.load(Ordering::SeqCst), 1);
    assert!(deliverer.fast_calls.load(Ordering::SeqCst) >= 2);
    assert!(orchestrator.in_flight().is_empty());
}

#[tokio::test]
async fn shutdown_abandons_ticks_after_timeout() {
    let tmp = tempfile::TempDir::new().unwrap();
    let deliverer = GatedDeliverer::new();
    let orchestrator = gated_orchestrator(tmp.path(), Arc::clone(&deliverer));

    let requested_at = Arc::new(Mutex::new(None));
    let watcher = Arc::clone(&deliverer);
    let mark = Arc::clone(&requested_at);
    let shutdown = async move {
        wait_until(|| watcher.slow_calls.load(Ordering::SeqCst) >= 1).await;
        *mark.lock().unwrap() = Some(Instant::now());
    };

    let shutdown_timeout = Duration::from_millis(200);
    tokio::time::timeout(
        Duration::from_secs(10),
        run_scheduled(
            Arc::clone(&orchestrator),
            every_second(),
            Duration::from_millis(20),
            shutdown_timeout,
            shutdown,
        ),
    )
    .await
    .expect("run_scheduled kept waiting on a blocked tick");

    let waited = requested_at.lock().unwrap().unwrap().elapsed();
    assert!(waited >= shutdown_timeout, "returned before the timeout: {waited:?}");
    assert!(waited < Duration::from_secs(3), "drain overran: {waited:?}");

    // The aborted tick releases its job slot.
    tokio::time::timeout(
        Duration::from_secs(2),
        wait_until(|| orchestrator.in_flight().is_empty()),
    )
    .await
    .expect("aborted job still marked in flight");
    assert_eq!(deliverer.gate.available_permits(), 0);
}
