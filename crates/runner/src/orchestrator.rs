//! Per-source job execution and tick fan-out.
//!
//! One job run is: read checkpoint, read the source, extract lines, resolve
//! the delta, dispatch it, then persist the longest delivered prefix. A tick
//! runs every job concurrently on its own task. The job is the error
//! boundary: whatever happens inside one job is logged and reported, never
//! propagated to other jobs or to the scheduling loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use relay_checkpoint::{Checkpoint, CheckpointStore};
use relay_core::{extract, resolve, RelayError, SourceJob};
use relay_forward::{delivered_prefix, Dispatcher};

/// What happened to the checkpoint at the end of a job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointUpdate {
    /// Nothing was delivered in order, so the checkpoint did not move.
    Unchanged,
    /// The checkpoint now points at this line.
    Advanced(String),
    /// Lines were delivered but the store write failed; they will be sent
    /// again on the next tick.
    PersistFailed(String),
}

/// Summary of one completed job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub key: &'static str,
    /// Non-blank lines currently in the source.
    pub extracted: usize,
    /// Lines newer than the checkpoint.
    pub new_lines: usize,
    pub delivered: usize,
    pub failed: usize,
    pub checkpoint: CheckpointUpdate,
}

/// Per-job result within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed(JobReport),
    /// The previous run of this job was still in flight.
    Skipped,
    /// The run aborted before dispatch (or its task panicked).
    Failed(String),
}

/// Outcome of one tick, in completion order.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub jobs: Vec<(&'static str, JobStatus)>,
}

impl TickSummary {
    pub fn status(&self, key: &str) -> Option<&JobStatus> {
        self.jobs.iter().find(|(k, _)| *k == key).map(|(_, s)| s)
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Completed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&JobStatus) -> bool) -> usize {
        self.jobs.iter().filter(|(_, s)| pred(s)).count()
    }
}

/// A configured job plus its in-flight flag.
struct JobSlot {
    job: SourceJob,
    running: AtomicBool,
}

/// Clears the slot's in-flight flag when the run ends, even on panic.
struct RunGuard {
    slot: Arc<JobSlot>,
}

impl JobSlot {
    fn try_start(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                slot: Arc::clone(self),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}

/// Runs the configured jobs against one checkpoint store and one dispatcher.
pub struct Orchestrator {
    slots: Vec<Arc<JobSlot>>,
    store: Arc<CheckpointStore>,
    dispatcher: Dispatcher,
}

impl Orchestrator {
    pub fn new(jobs: Vec<SourceJob>, store: Arc<CheckpointStore>, dispatcher: Dispatcher) -> Self {
        let slots = jobs
            .into_iter()
            .map(|job| {
                Arc::new(JobSlot {
                    job,
                    running: AtomicBool::new(false),
                })
            })
            .collect();
        Self {
            slots,
            store,
            dispatcher,
        }
    }

    /// Configured jobs, in registration order.
    pub fn jobs(&self) -> impl Iterator<Item = &SourceJob> {
        self.slots.iter().map(|slot| &slot.job)
    }

    /// Keys of jobs whose run has started and not yet finished.
    pub fn in_flight(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| slot.running.load(Ordering::Acquire))
            .map(|slot| slot.job.key())
            .collect()
    }

    /// Run every job once, concurrently, and wait for all of them.
    ///
    /// A job whose previous run has not finished is skipped rather than
    /// started twice.
    pub async fn run_tick(self: &Arc<Self>) -> TickSummary {
        let mut summary = TickSummary::default();
        let mut tasks = JoinSet::new();
        let mut task_keys = HashMap::new();

        for slot in &self.slots {
            let key = slot.job.key();
            let Some(guard) = slot.try_start() else {
                warn!(job = key, "previous run still in flight, skipping");
                summary.jobs.push((key, JobStatus::Skipped));
                continue;
            };

            let this = Arc::clone(self);
            let handle = tasks.spawn(async move {
                let status = match this.run_job(&guard.slot.job).await {
                    Ok(report) => JobStatus::Completed(report),
                    Err(e) => {
                        error!(job = key, error = %e, "job aborted");
                        JobStatus::Failed(e.to_string())
                    }
                };
                drop(guard);
                (key, status)
            });
            task_keys.insert(handle.id(), key);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => summary.jobs.push(entry),
                Err(e) => {
                    let key = task_keys.get(&e.id()).copied().unwrap_or("unknown");
                    error!(job = key, error = %e, "job task panicked");
                    summary.jobs.push((key, JobStatus::Failed(e.to_string())));
                }
            }
        }

        info!(
            completed = summary.completed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Tick complete"
        );
        summary
    }

    /// Run one job end to end.
    ///
    /// Only an unreadable source aborts the run. An unreadable checkpoint is
    /// logged and treated as absent (full resend); a failed checkpoint write
    /// is logged and reported in [`JobReport::checkpoint`].
    #[instrument(skip_all, fields(job = %job.key()))]
    pub async fn run_job(&self, job: &SourceJob) -> Result<JobReport, RelayError> {
        let key = job.key();

        let checkpoint = match self.store.get(key).await {
            Ok(Checkpoint::Absent) => {
                debug!("no checkpoint recorded, every line is new");
                Checkpoint::Absent
            }
            Ok(line) => line,
            Err(e) => {
                error!(
                    error = %e,
                    "checkpoint store unreadable, resending full source"
                );
                Checkpoint::Absent
            }
        };

        let raw = tokio::fs::read(&job.content_path)
            .await
            .map_err(|source| RelayError::ContentUnavailable {
                path: job.content_path.clone(),
                source,
            })?;
        let content = String::from_utf8_lossy(&raw);

        let lines = extract(&content);
        let delta = resolve(&lines, checkpoint.as_line());

        if checkpoint.as_line().is_some() && !lines.is_empty() && delta.len() == lines.len() {
            warn!(
                lines = lines.len(),
                "checkpoint line not found in source, resending all lines"
            );
        }

        let mut report = JobReport {
            key,
            extracted: lines.len(),
            new_lines: delta.len(),
            delivered: 0,
            failed: 0,
            checkpoint: CheckpointUpdate::Unchanged,
        };

        if delta.is_empty() {
            debug!(lines = lines.len(), "no new lines");
            return Ok(report);
        }

        let outcomes = self.dispatcher.dispatch(&job.target, delta).await;
        report.delivered = outcomes.iter().filter(|o| o.outcome.is_delivered()).count();
        report.failed = outcomes.len() - report.delivered;

        if let Some(line) = delivered_prefix(&outcomes) {
            report.checkpoint = match self.store.set(key, line).await {
                Ok(()) => CheckpointUpdate::Advanced(line.to_string()),
                Err(e) => {
                    error!(error = %e, "failed to persist checkpoint");
                    CheckpointUpdate::PersistFailed(e.to_string())
                }
            };
        }

        info!(
            new_lines = report.new_lines,
            delivered = report.delivered,
            failed = report.failed,
            advanced = matches!(report.checkpoint, CheckpointUpdate::Advanced(_)),
            "Job complete"
        );
        Ok(report)
    }
}
