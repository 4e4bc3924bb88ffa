//! Cron due-check helper.

use chrono::{DateTime, Utc};
use cron::Schedule;

/// Check if a cron schedule is due at `now`.
///
/// The schedule is due if its first tick after `since` (exclusive) falls at or
/// before `now` (inclusive). Several ticks missed in that window still count
/// as one.
pub(crate) fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    match schedule.after(&since).next() {
        Some(next) => next <= now,
        None => false,
    }
}
