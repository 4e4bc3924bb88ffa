//! Deliverer trait definition and shared outcome types.

use std::time::Duration;

use url::Url;

/// Errors that can occur while delivering a single line.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("collector rejected line with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("collector returned status {status} with an empty body")]
    EmptyResponse { status: u16 },
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// Rejected or not confirmed; carries the error text for logs.
    Failed(String),
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }
}

/// A line paired with what happened when it was sent.
#[derive(Debug, Clone)]
pub struct LineOutcome {
    pub line: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// Transport that sends one line to one target.
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync {
    /// Deliver `line` to `target`. `Ok` only when the collector confirmed it.
    async fn deliver(&self, target: &Url, line: &str) -> Result<(), DeliveryError>;

    /// Human-readable name for this transport (e.g., "http").
    fn channel_name(&self) -> &str;
}
