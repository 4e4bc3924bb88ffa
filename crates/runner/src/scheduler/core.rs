//! [`TickScheduler`]: tracks when the next tick should fire.

use chrono::{DateTime, Utc};
use cron::Schedule;

use super::cron::is_cron_due;

/// Firing state for one cron schedule.
///
/// Until the first fire, due-ness is measured from the moment the scheduler
/// was created, so starting the process never fires a tick for a schedule
/// point that already passed.
pub struct TickScheduler {
    schedule: Schedule,
    /// Expression as configured, for logs.
    expression: String,
    created_at: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
}

impl TickScheduler {
    pub fn new(schedule: Schedule, expression: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            schedule,
            expression: expression.into(),
            created_at: now,
            last_fired: None,
        }
    }

    /// Whether a tick should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        is_cron_due(&self.schedule, now, self.last_fired.unwrap_or(self.created_at))
    }

    /// Record that a tick fired at `at`.
    pub fn record_fire(&mut self, at: DateTime<Utc>) {
        self.last_fired = Some(at);
    }

    /// Next scheduled instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}
