//! Creative-performance analytics over attributed revenue: aggregation,
//! tag-group significance with FDR control, leading indicators, fatigue
//! detection and budget recommendations.

pub mod engine;
pub mod fatigue;
pub mod leading;
pub mod performance;
pub mod recommend;
pub mod significance;
pub mod stats;

pub use engine::{AnalysisEngine, AnalysisReport, AnalysisRequest};
pub use fatigue::{FatigueDetector, FatigueState};
pub use performance::PerformanceAggregator;
pub use recommend::{Recommendation, RecommendationSynthesizer};
pub use significance::SignificanceEngine;
