//! Loss aggregation across attribute heads.
//!
//! Every strategy reduces a `[batch, attributes]` score matrix and its label
//! matrix to one scalar by summing per-element losses over attributes and over
//! the batch, and provides the gradient of that scalar w.r.t. each score.

pub mod functions;

pub use functions::{AttributeLoss, FocalLoss, LossAggregator, WeightedBce, PROBABILITY_EPSILON};
