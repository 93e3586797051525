use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{FaceAttrError, Result};
use super::initialization::WeightInit;

/// A fully connected (dense) layer.
///
/// `forward_batch` caches the inputs and pre-activation outputs that
/// `backward_batch` needs; `infer_batch` leaves the cache untouched and is what
/// evaluation and prediction use.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a layer initialized for its activation (He for ReLU, Xavier otherwise).
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self::with_init(input_size, output_size, activation, WeightInit::for_activation(&activation))
    }

    pub fn with_init(input_size: usize, output_size: usize, activation: Activation, init: WeightInit) -> Self {
        DenseLayer {
            weights: init.initialize_weights((input_size, output_size)),
            biases: init.initialize_biases(output_size),
            activation,
            pre_activation_output: None,
            inputs: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn check_input(&self, inputs: &ArrayView2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{}", inputs.ncols()),
            ));
        }
        Ok(())
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }

    /// Forward pass for a batch, caching what the backward pass needs.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let mut outputs = self.affine(inputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        Ok(outputs)
    }

    /// Forward pass without caching.
    pub fn infer_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let mut outputs = self.affine(inputs);
        self.activation.apply_batch(&mut outputs);
        Ok(outputs)
    }

    /// Backward pass for a batch of output errors (dL/d output).
    ///
    /// Returns `(input_error, weight_gradients, bias_gradients)` where
    /// `input_error` is dL/d input, ready for the previous layer.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<(Array2<f32>, Array2<f32>, Array1<f32>)> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(FaceAttrError::TrainingError(
                    "backward_batch() called without a preceding forward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = &output_errors * &activation_deriv;
        let weight_gradients = inputs.t().dot(&adjusted_error);
        let bias_gradients = adjusted_error.sum_axis(Axis(0));
        let input_error = adjusted_error.dot(&self.weights.t());

        Ok((input_error, weight_gradients, bias_gradients))
    }

    /// Drop the cached activations.
    pub fn clear_cache(&mut self) {
        self.inputs = None;
        self.pre_activation_output = None;
    }
}
