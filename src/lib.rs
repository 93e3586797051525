//! # faceattr - Multi-Attribute Facial Attribute Classifier
//!
//! faceattr trains a classifier that predicts several independent binary
//! facial attributes (for example "Smiling", "Male", "Young") for one image,
//! and evaluates it per attribute.
//!
//! ## Key Features
//!
//! - **Per-attribute losses**: weighted binary cross-entropy and focal loss
//! - **Metrics**: accuracy plus TP/FP/TN/FN, precision, recall, TPR, FPR and F1,
//!   with undefined ratios reported as such
//! - **Training loop**: explicit run states, best-model tracking on mean
//!   validation accuracy, checkpoint and CSV/JSON reports
//! - **Data**: CelebA attribute/partition files or in-memory arrays
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faceattr::config::RunConfig;
//! use faceattr::data::CelebADataSource;
//! use faceattr::trainer::TrainingLoop;
//!
//! # fn main() -> faceattr::error::Result<()> {
//! let config = RunConfig::load("config.json")?;
//! let data = CelebADataSource::from_config(&config);
//! let mut run = TrainingLoop::new(config, data)?;
//! let summary = run.fit()?;
//! println!("best mean accuracy {:.2}%", summary.best_mean_accuracy);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions (ReLU, Sigmoid, ...)
//! - [`attributes`] - Attribute sets and index-keyed per-attribute maps
//! - [`config`] - Run configuration and strategy selectors
//! - [`data`] - Data sources, splits and image transforms
//! - [`debug`] - Numerical checks on losses and parameters
//! - [`error`] - Error types and result handling
//! - [`inference`] - Single-image prediction from a checkpoint
//! - [`layers`] - Dense layers and weight initialization
//! - [`loss`] - Per-attribute loss strategies
//! - [`metrics`] - Confusion statistics and the metric evaluator
//! - [`model`] - Predictor trait, network and checkpoints
//! - [`optimizer`] - SGD with momentum and Adam
//! - [`report`] - CSV/JSON artifacts and ASCII curves
//! - [`tensorboard`] - Scalar and histogram logs
//! - [`trainer`] - The training loop state machine

pub mod activations;
pub mod attributes;
pub mod config;
pub mod data;
pub mod debug;
pub mod error;
pub mod inference;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod report;
pub mod tensorboard;
pub mod trainer;

#[cfg(test)]
mod tests;
