use ndarray::{Array1, Array2, ArrayView2, Zip};

use crate::attributes::AttributeSet;
use crate::config::{LossType, RunConfig};
use crate::error::{FaceAttrError, Result};

/// Probabilities are clamped to `[ε, 1 - ε]` before taking logarithms.
pub const PROBABILITY_EPSILON: f32 = 1e-7;

/// Trait defining the interface for per-attribute loss strategies
pub trait AttributeLoss: Send + Sync {
    /// Total loss of a batch of scores in [0, 1] against binary labels
    fn compute(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32>;

    /// Gradient of `compute` with respect to every score
    fn gradient(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<Array2<f32>>;
}

fn check_shapes(predictions: &ArrayView2<f32>, labels: &ArrayView2<f32>, weights: &Array1<f32>) -> Result<()> {
    if predictions.dim() != labels.dim() {
        return Err(FaceAttrError::dimension_mismatch(
            format!("labels of shape {:?}", predictions.dim()),
            format!("{:?}", labels.dim()),
        ));
    }
    if predictions.ncols() != weights.len() {
        return Err(FaceAttrError::dimension_mismatch(
            format!("{} attribute columns", weights.len()),
            format!("{}", predictions.ncols()),
        ));
    }
    Ok(())
}

fn clamp_probability(p: f32) -> f32 {
    p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON)
}

/// Weighted binary cross-entropy: `-w·(y·ln p + (1-y)·ln(1-p))`.
#[derive(Debug, Clone)]
pub struct WeightedBce {
    pub weights: Array1<f32>,
}

impl WeightedBce {
    pub fn new(weights: Array1<f32>) -> Self {
        WeightedBce { weights }
    }

    /// Equal weight for every attribute.
    pub fn unweighted(num_attributes: usize) -> Self {
        WeightedBce { weights: Array1::ones(num_attributes) }
    }
}

impl AttributeLoss for WeightedBce {
    fn compute(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
        check_shapes(&predictions, &labels, &self.weights)?;
        let mut total = 0.0;
        for (pred_row, label_row) in predictions.rows().into_iter().zip(labels.rows()) {
            for ((&p, &y), &w) in pred_row.iter().zip(label_row.iter()).zip(self.weights.iter()) {
                let p = clamp_probability(p);
                total += -w * (y * p.ln() + (1.0 - y) * (1.0 - p).ln());
            }
        }
        Ok(total)
    }

    fn gradient(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_shapes(&predictions, &labels, &self.weights)?;
        let mut grad = Array2::zeros(predictions.dim());
        Zip::indexed(&mut grad)
            .and(&predictions)
            .and(&labels)
            .for_each(|(_, j), g, &p, &y| {
                let p = clamp_probability(p);
                *g = self.weights[j] * (p - y) / (p * (1.0 - p));
            });
        Ok(grad)
    }
}

/// Focal loss: `-w·α_t·(1 - p_t)^γ·ln p_t`, which down-weights samples the
/// heads already classify confidently.
#[derive(Debug, Clone)]
pub struct FocalLoss {
    pub weights: Array1<f32>,
    pub gamma: f32,
    pub alpha: f32,
}

impl FocalLoss {
    pub fn new(weights: Array1<f32>, gamma: f32, alpha: f32) -> Self {
        FocalLoss { weights, gamma, alpha }
    }

    // (p_t, α_t) for one score/label pair.
    fn terms(&self, p: f32, y: f32) -> (f32, f32) {
        let p_t = y * p + (1.0 - y) * (1.0 - p);
        let alpha_t = y * self.alpha + (1.0 - y) * (1.0 - self.alpha);
        (p_t, alpha_t)
    }
}

impl AttributeLoss for FocalLoss {
    fn compute(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
        check_shapes(&predictions, &labels, &self.weights)?;
        let mut total = 0.0;
        for (pred_row, label_row) in predictions.rows().into_iter().zip(labels.rows()) {
            for ((&p, &y), &w) in pred_row.iter().zip(label_row.iter()).zip(self.weights.iter()) {
                let (p_t, alpha_t) = self.terms(clamp_probability(p), y);
                total += -w * alpha_t * (1.0 - p_t).powf(self.gamma) * p_t.ln();
            }
        }
        Ok(total)
    }

    fn gradient(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_shapes(&predictions, &labels, &self.weights)?;
        let gamma = self.gamma;
        let mut grad = Array2::zeros(predictions.dim());
        Zip::indexed(&mut grad)
            .and(&predictions)
            .and(&labels)
            .for_each(|(_, j), g, &p, &y| {
                let (p_t, alpha_t) = self.terms(clamp_probability(p), y);
                let q = 1.0 - p_t;
                // d/dp_t of -(1-p_t)^γ ln p_t; dp_t/dp = 2y - 1
                let focusing = if gamma == 0.0 { 0.0 } else { gamma * q.powf(gamma - 1.0) * p_t.ln() };
                let d_pt = focusing - q.powf(gamma) / p_t;
                *g = self.weights[j] * alpha_t * d_pt * (2.0 * y - 1.0);
            });
        Ok(grad)
    }
}

/// The loss strategy selected for a run.
#[derive(Debug, Clone)]
pub enum LossAggregator {
    WeightedBce(WeightedBce),
    Focal(FocalLoss),
}

impl LossAggregator {
    pub fn new(loss_type: LossType, attributes: &AttributeSet, focal_gamma: f32, focal_alpha: f32) -> Self {
        let weights = Array1::from_vec(attributes.loss_weights().as_slice().to_vec());
        match loss_type {
            LossType::WeightedBce => LossAggregator::WeightedBce(WeightedBce::new(weights)),
            LossType::Focal => LossAggregator::Focal(FocalLoss::new(weights, focal_gamma, focal_alpha)),
        }
    }

    /// Resolve `config.loss_type`; unsupported names are configuration errors.
    pub fn from_config(config: &RunConfig, attributes: &AttributeSet) -> Result<Self> {
        let loss_type = config.loss()?;
        Ok(Self::new(loss_type, attributes, config.focal_gamma, config.focal_alpha))
    }

    pub fn kind(&self) -> LossType {
        match self {
            LossAggregator::WeightedBce(_) => LossType::WeightedBce,
            LossAggregator::Focal(_) => LossType::Focal,
        }
    }
}

impl AttributeLoss for LossAggregator {
    fn compute(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
        match self {
            LossAggregator::WeightedBce(loss) => loss.compute(predictions, labels),
            LossAggregator::Focal(loss) => loss.compute(predictions, labels),
        }
    }

    fn gradient(&self, predictions: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<Array2<f32>> {
        match self {
            LossAggregator::WeightedBce(loss) => loss.gradient(predictions, labels),
            LossAggregator::Focal(loss) => loss.gradient(predictions, labels),
        }
    }
}
