//! The epoch loop: train, validate, keep the best parameters, report.

pub mod history;
pub mod solver;

pub use history::{EpochRecord, RunHistory};
pub use solver::{BestModel, RunState, RunSummary, TrainingLoop};
