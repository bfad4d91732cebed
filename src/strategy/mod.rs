//! Yield engine and workflow orchestration

pub mod orchestrator;
pub mod yields;

pub use orchestrator::Orchestrator;
pub use yields::{AllocationRecommendation, RiskLevel, YieldEngine, YieldOpportunity};
