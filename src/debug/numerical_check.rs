use tracing::warn;

use crate::error::{FaceAttrError, Result};
use crate::model::LayerView;

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { layer: String, count: usize },
    Infinity { layer: String, count: usize },
}

/// Scan named layers for NaN and infinite values.
pub fn check_parameters(layers: &[(String, LayerView<'_>)]) -> Vec<NumericalIssue> {
    let mut issues = Vec::new();

    for (name, layer) in layers {
        let mut nan_count = 0;
        let mut inf_count = 0;
        for &value in layer.weights.iter().chain(layer.biases.iter()) {
            if value.is_nan() {
                nan_count += 1;
            } else if value.is_infinite() {
                inf_count += 1;
            }
        }

        if nan_count > 0 {
            warn!(layer = %name, count = nan_count, "NaN values in parameters");
            issues.push(NumericalIssue::NaN { layer: name.clone(), count: nan_count });
        }
        if inf_count > 0 {
            warn!(layer = %name, count = inf_count, "infinite values in parameters");
            issues.push(NumericalIssue::Infinity { layer: name.clone(), count: inf_count });
        }
    }

    issues
}

/// Fail with `TrainingDiverged` when a batch loss is NaN or infinite.
pub fn ensure_finite_loss(loss: f32, epoch: usize, batch: usize) -> Result<()> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(FaceAttrError::TrainingDiverged { epoch, batch, loss })
    }
}
