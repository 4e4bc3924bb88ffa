//! HTTP deliverer for the line collector.
//!
//! Each line is sent as a JSON body `{"line": "..."}` in its own POST to the
//! job's target URL. A line counts as delivered only when the collector
//! answers 2xx *and* returns a non-empty body; an empty 2xx body is not a
//! confirmation.

use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::traits::{Deliverer, DeliveryError};

/// Response bytes kept for the emptiness check and for error reports.
const MAX_BODY_BYTES: usize = 1024;

const TRUNCATED_MARKER: &str = "...(truncated)";

#[derive(Serialize)]
struct LinePayload<'a> {
    line: &'a str,
}

/// Delivers lines as JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDeliverer {
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
    /// Upper bound for one request, connect through body read.
    timeout: Duration,
}

impl HttpDeliverer {
    /// Create a deliverer whose every call is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("linerelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Http(err)
        }
    }

    /// Read at most [`MAX_BODY_BYTES`] of the body; the rest is never buffered.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, DeliveryError> {
        let mut buf = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            let room = MAX_BODY_BYTES - buf.len();
            if chunk.len() > room {
                buf.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        let mut body = String::from_utf8_lossy(&buf).into_owned();
        if truncated {
            body.push_str(TRUNCATED_MARKER);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Deliverer for HttpDeliverer {
    async fn deliver(&self, target: &Url, line: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(target.clone())
            .json(&LinePayload { line })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = self.read_body(response).await?;

        if !status.is_success() {
            tracing::warn!(
                url = %target,
                %status,
                body = %body,
                "collector returned non-2xx status"
            );
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Err(DeliveryError::EmptyResponse {
                status: status.as_u16(),
            });
        }

        tracing::debug!(url = %target, %status, "line delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "http"
    }
}
