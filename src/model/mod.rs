//! Multi-attribute predictors.
//!
//! The training loop only sees the [`AttributePredictor`] trait: a forward
//! pass producing per-attribute scores in [0, 1], gradient accumulation, an
//! optimizer step, and parameter snapshots for best-model tracking.
//! [`AttributeNetwork`] is the bundled implementation: a dense backbone
//! followed by one sigmoid head per attribute.

pub mod checkpoint;
pub mod network;

use std::path::Path;
use ndarray::{Array2, ArrayView2};
use tracing::info;

use crate::attributes::AttributeSet;
use crate::config::ModelType;
use crate::error::{FaceAttrError, Result};
use crate::optimizer::Optimizer;

pub use checkpoint::{name_layers, Checkpoint, LayerParams, LayerView, ParameterSnapshot};
pub use network::AttributeNetwork;

/// Whether the predictor records what `backward` needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

pub trait AttributePredictor {
    /// Flattened length of one input image.
    fn input_dim(&self) -> usize;

    fn num_attributes(&self) -> usize;

    fn set_mode(&mut self, mode: Mode);

    fn mode(&self) -> Mode;

    /// Scores `[sample, attribute]` in [0, 1] for a batch `[sample, feature]`.
    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Discard accumulated gradients.
    fn zero_grad(&mut self);

    /// Accumulate gradients for the most recent train-mode `forward`, given
    /// dLoss/dScore for every `[sample, attribute]`.
    fn backward(&mut self, loss_gradient: ArrayView2<f32>) -> Result<()>;

    /// Apply the accumulated gradients with `optimizer`.
    fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, learning_rate: f32) -> Result<()>;

    /// Borrow every live layer, named `backbone.<i>` then `head.<k>`.
    fn layers(&self) -> Vec<(String, LayerView<'_>)>;

    fn snapshot(&self) -> ParameterSnapshot;

    fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<()>;

    fn parameter_count(&self) -> usize;
}

/// Build the predictor for `model_type`, optionally initializing its backbone
/// from a pretrained checkpoint.
pub fn build_predictor(
    model_type: ModelType,
    attributes: &AttributeSet,
    input_dim: usize,
    pretrained: Option<&Path>,
) -> Result<Box<dyn AttributePredictor>> {
    let mut network = AttributeNetwork::new(model_type, input_dim, attributes.len());

    if let Some(path) = pretrained {
        let checkpoint = Checkpoint::load(path)?;
        if checkpoint.model_type != model_type || checkpoint.input_dim != input_dim {
            return Err(FaceAttrError::config(
                "pretrained_path",
                format!(
                    "{} holds a {} backbone for {} inputs, expected {} for {} inputs",
                    path.display(),
                    checkpoint.model_type,
                    checkpoint.input_dim,
                    model_type,
                    input_dim
                ),
            ));
        }
        network.load_backbone(&checkpoint.parameters.backbone)?;
        info!(path = %path.display(), "initialized backbone from pretrained checkpoint");
    }

    info!(
        model = %model_type,
        attributes = attributes.len(),
        parameters = network.parameter_count(),
        "built predictor"
    );
    Ok(Box::new(network))
}
