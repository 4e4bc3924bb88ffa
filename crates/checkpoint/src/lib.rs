//! Durable per-source forwarding checkpoints.
//!
//! This crate provides:
//! - [`CheckpointStore`], a single JSON object on disk mapping source key to
//!   the last line confirmed delivered for that source
//! - [`Checkpoint`], the value read back for one key
//! - [`StoreError`] for read, parse and write failures

mod error;
mod store;

pub use error::StoreError;
pub use store::{Checkpoint, CheckpointStore};
