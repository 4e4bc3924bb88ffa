//! Ordered per-line delivery.
//!
//! The dispatcher sends a batch one line at a time, in order. A failed line
//! is recorded and the batch continues; the checkpoint rule in
//! [`delivered_prefix`] makes sure nothing after the first failure is ever
//! considered forwarded.

use std::sync::Arc;
use std::time::Instant;

use url::Url;

use crate::traits::{Deliverer, LineOutcome, Outcome};

/// Delivers batches of lines through one transport.
#[derive(Clone)]
pub struct Dispatcher {
    deliverer: Arc<dyn Deliverer>,
}

impl Dispatcher {
    pub fn new(deliverer: Arc<dyn Deliverer>) -> Self {
        Self { deliverer }
    }

    /// Deliver `lines` to `target` sequentially, returning one outcome per line
    /// in the same order. No retries happen here.
    pub async fn dispatch(&self, target: &Url, lines: &[String]) -> Vec<LineOutcome> {
        let mut results = Vec::with_capacity(lines.len());

        for line in lines {
            let start = Instant::now();
            let result = self.deliverer.deliver(target, line).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(()) => {
                    tracing::debug!(
                        channel = self.deliverer.channel_name(),
                        duration_ms,
                        "Line delivered"
                    );
                    Outcome::Delivered
                }
                Err(e) => {
                    tracing::warn!(
                        channel = self.deliverer.channel_name(),
                        url = %target,
                        line = %line,
                        error = %e,
                        duration_ms,
                        "Line delivery failed"
                    );
                    Outcome::Failed(e.to_string())
                }
            };

            results.push(LineOutcome {
                line: line.clone(),
                outcome,
                duration_ms,
            });
        }

        results
    }
}

/// Last line of the longest leading run of delivered outcomes.
///
/// This is the only line the checkpoint may advance to. `None` when the first
/// line failed or the batch is empty.
pub fn delivered_prefix(outcomes: &[LineOutcome]) -> Option<&str> {
    outcomes
        .iter()
        .take_while(|o| o.outcome.is_delivered())
        .last()
        .map(|o| o.line.as_str())
}
