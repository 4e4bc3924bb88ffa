//! Cron-driven tick scheduling.
//!
//! The [`TickScheduler`] decides when the next tick is due from a cron
//! expression and the time of the last fire. [`run_scheduled`] polls it and
//! hands each due tick to the orchestrator on its own task, so a slow tick
//! never delays the one after it.

mod core;
pub(crate) mod cron;
mod service;

#[cfg(test)]
mod tests;

pub use self::core::TickScheduler;
pub use self::service::run_scheduled;
