//! Donation attribution: scoped rule store, tiered resolver and batch
//! runner.

pub mod batch;
pub mod resolver;
pub mod rules;
pub mod similarity;
pub mod spend;

pub use batch::{AttributionSummary, BatchAttribution, BatchAttributionRunner};
pub use resolver::AttributionResolver;
pub use rules::RuleStore;
pub use spend::ActiveSpendIndex;
