pub mod config;
pub mod delta;
pub mod error;
pub mod extract;
pub mod job;

pub use config::Config;
pub use delta::resolve;
pub use error::*;
pub use extract::extract;
pub use job::*;
