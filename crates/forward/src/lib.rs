//! Line delivery to the remote collector.
//!
//! This crate provides:
//! - `Deliverer` trait for pluggable delivery transports
//! - `HttpDeliverer`, one JSON POST per line with a per-call timeout
//! - `Dispatcher`, which delivers a batch in order and records one outcome per line
//! - `delivered_prefix`, the checkpoint-advancement rule over those outcomes

pub mod dispatcher;
pub mod http;
pub mod traits;

pub use dispatcher::{delivered_prefix, Dispatcher};
pub use http::HttpDeliverer;
pub use traits::{Deliverer, DeliveryError, LineOutcome, Outcome};
