//! Shared data model, configuration and error types for the attribution and
//! creative-performance analytics engine.

pub mod config;
pub mod dataset;
pub mod error;
pub mod precision;
pub mod types;

pub use config::AppConfig;
pub use dataset::Dataset;
pub use error::{FundlensError, FundlensResult};
