//! Job orchestration and scheduling for the line relay.
//!
//! - [`orchestrator`]: runs each configured source job and fans a tick out
//!   over all of them
//! - [`scheduler`]: decides when ticks fire and drives the loop

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{CheckpointUpdate, JobReport, JobStatus, Orchestrator, TickSummary};
pub use scheduler::{run_scheduled, TickScheduler};
