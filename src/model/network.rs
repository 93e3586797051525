use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::activations::Activation;
use crate::config::ModelType;
use crate::error::{FaceAttrError, Result};
use crate::layers::DenseLayer;
use crate::optimizer::Optimizer;
use super::{name_layers, AttributePredictor, Checkpoint, LayerParams, LayerView, Mode, ParameterSnapshot};

/// Dense ReLU backbone shared by all attributes, then one sigmoid unit per
/// attribute reading the backbone features.
///
/// Optimizer slots are assigned in order: backbone layers first, then heads.
#[derive(Debug, Clone)]
pub struct AttributeNetwork {
    model_type: ModelType,
    input_dim: usize,
    backbone: Vec<DenseLayer>,
    heads: Vec<DenseLayer>,
    gradients: Vec<Option<(Array2<f32>, Array1<f32>)>>,
    mode: Mode,
}

impl AttributeNetwork {
    pub fn new(model_type: ModelType, input_dim: usize, num_attributes: usize) -> Self {
        let mut backbone = Vec::new();
        let mut features = input_dim;
        for &hidden in model_type.hidden_sizes() {
            backbone.push(DenseLayer::new(features, hidden, Activation::Relu));
            features = hidden;
        }
        let heads = (0..num_attributes)
            .map(|_| DenseLayer::new(features, 1, Activation::Sigmoid))
            .collect();

        let mut network = AttributeNetwork {
            model_type,
            input_dim,
            backbone,
            heads,
            gradients: Vec::new(),
            mode: Mode::Train,
        };
        network.zero_grad();
        network
    }

    /// Rebuild the network stored in a checkpoint, ready for inference.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<Self> {
        let mut network = Self::new(checkpoint.model_type, checkpoint.input_dim, checkpoint.attributes.len());
        network.restore(&checkpoint.parameters)?;
        network.set_mode(Mode::Eval);
        Ok(network)
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Replace the backbone parameters, leaving the heads as initialized.
    pub fn load_backbone(&mut self, backbone: &[LayerParams]) -> Result<()> {
        check_layers(&self.backbone, backbone, "backbone")?;
        assign_layers(&mut self.backbone, backbone);
        Ok(())
    }

    fn layer_count(&self) -> usize {
        self.backbone.len() + self.heads.len()
    }

    fn accumulate(&mut self, slot: usize, weights: Array2<f32>, biases: Array1<f32>) {
        match &mut self.gradients[slot] {
            Some((w, b)) => {
                *w += &weights;
                *b += &biases;
            }
            empty => *empty = Some((weights, biases)),
        }
    }
}

fn check_layers(layers: &[DenseLayer], params: &[LayerParams], part: &str) -> Result<()> {
    if layers.len() != params.len() {
        return Err(FaceAttrError::dimension_mismatch(
            format!("{} {} layers", layers.len(), part),
            format!("{}", params.len()),
        ));
    }
    for (layer, p) in layers.iter().zip(params) {
        if layer.weights.dim() != p.weights.dim() || layer.biases.dim() != p.biases.dim() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("{} layer of shape {:?}", part, layer.weights.dim()),
                format!("{:?}", p.weights.dim()),
            ));
        }
    }
    Ok(())
}

fn assign_layers(layers: &mut [DenseLayer], params: &[LayerParams]) {
    for (layer, p) in layers.iter_mut().zip(params) {
        layer.weights.assign(&p.weights);
        layer.biases.assign(&p.biases);
        layer.clear_cache();
    }
}

fn layer_view(layer: &DenseLayer) -> LayerView<'_> {
    LayerView { weights: layer.weights.view(), biases: layer.biases.view() }
}

fn layer_params(layers: &[DenseLayer]) -> Vec<LayerParams> {
    layers
        .iter()
        .map(|l| LayerParams { weights: l.weights.clone(), biases: l.biases.clone() })
        .collect()
}

impl AttributePredictor for AttributeNetwork {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn num_attributes(&self) -> usize {
        self.heads.len()
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Eval {
            for layer in self.backbone.iter_mut().chain(self.heads.iter_mut()) {
                layer.clear_cache();
            }
        }
        self.mode = mode;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut scores = Array2::zeros((inputs.nrows(), self.heads.len()));
        match self.mode {
            Mode::Train => {
                let mut features = inputs.to_owned();
                for layer in self.backbone.iter_mut() {
                    features = layer.forward_batch(features.view())?;
                }
                for (k, head) in self.heads.iter_mut().enumerate() {
                    let out = head.forward_batch(features.view())?;
                    scores.column_mut(k).assign(&out.column(0));
                }
            }
            Mode::Eval => {
                let mut features = inputs.to_owned();
                for layer in self.backbone.iter() {
                    features = layer.infer_batch(features.view())?;
                }
                for (k, head) in self.heads.iter().enumerate() {
                    let out = head.infer_batch(features.view())?;
                    scores.column_mut(k).assign(&out.column(0));
                }
            }
        }
        Ok(scores)
    }

    fn zero_grad(&mut self) {
        self.gradients = vec![None; self.layer_count()];
    }

    fn backward(&mut self, loss_gradient: ArrayView2<f32>) -> Result<()> {
        if self.mode != Mode::Train {
            return Err(FaceAttrError::TrainingError("backward() requires train mode".to_string()));
        }
        if loss_gradient.ncols() != self.heads.len() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("{} attribute columns", self.heads.len()),
                format!("{}", loss_gradient.ncols()),
            ));
        }

        let offset = self.backbone.len();
        let mut feature_error: Option<Array2<f32>> = None;
        let mut head_grads = Vec::with_capacity(self.heads.len());
        for (k, head) in self.heads.iter().enumerate() {
            let output_error = loss_gradient.column(k).insert_axis(Axis(1));
            let (input_error, weight_grads, bias_grads) = head.backward_batch(output_error)?;
            feature_error = Some(match feature_error {
                Some(acc) => acc + &input_error,
                None => input_error,
            });
            head_grads.push((weight_grads, bias_grads));
        }
        for (k, (w, b)) in head_grads.into_iter().enumerate() {
            self.accumulate(offset + k, w, b);
        }

        let mut error = match feature_error {
            Some(error) => error,
            None => return Ok(()),
        };
        for slot in (0..self.backbone.len()).rev() {
            let (input_error, weight_grads, bias_grads) = self.backbone[slot].backward_batch(error.view())?;
            self.accumulate(slot, weight_grads, bias_grads);
            error = input_error;
        }
        Ok(())
    }

    fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, learning_rate: f32) -> Result<()> {
        if self.gradients.iter().all(Option::is_none) {
            return Err(FaceAttrError::TrainingError("apply_gradients() called before backward()".to_string()));
        }
        optimizer.begin_step();
        let offset = self.backbone.len();
        for slot in 0..self.layer_count() {
            let (weight_grads, bias_grads) = match self.gradients[slot].take() {
                Some(grads) => grads,
                None => continue,
            };
            let layer = if slot < offset { &mut self.backbone[slot] } else { &mut self.heads[slot - offset] };
            optimizer.update_weights(slot, &mut layer.weights, &weight_grads, learning_rate);
            optimizer.update_biases(slot, &mut layer.biases, &bias_grads, learning_rate);
        }
        Ok(())
    }

    fn layers(&self) -> Vec<(String, LayerView<'_>)> {
        name_layers(self.backbone.iter().map(layer_view), self.heads.iter().map(layer_view))
    }

    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            backbone: layer_params(&self.backbone),
            heads: layer_params(&self.heads),
        }
    }

    fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        check_layers(&self.backbone, &snapshot.backbone, "backbone")?;
        check_layers(&self.heads, &snapshot.heads, "head")?;
        assign_layers(&mut self.backbone, &snapshot.backbone);
        assign_layers(&mut self.heads, &snapshot.heads);
        self.zero_grad();
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        self.backbone.iter().chain(self.heads.iter()).map(DenseLayer::parameter_count).sum()
    }
}
