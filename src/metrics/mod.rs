//! Per-attribute evaluation metrics.

pub mod confusion;
pub mod evaluator;

pub use confusion::{ConfusionStats, ConfusionSummary, DerivedMetrics, Metric};
pub use evaluator::{EvaluationPass, EvaluationReport, MetricEvaluator};
