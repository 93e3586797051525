use ndarray::ArrayView2;
use serde::Serialize;
use tracing::debug;

use crate::attributes::{AttrMap, AttributeSet};
use crate::data::{DataSource, Split};
use crate::error::{FaceAttrError, Result};
use crate::model::{AttributePredictor, Mode};
use super::{ConfusionStats, ConfusionSummary};

/// Counters for one pass over a split. Created empty, so every pass starts
/// from zero.
#[derive(Debug, Clone)]
pub struct EvaluationPass {
    thresholds: AttrMap<f32>,
    stats: AttrMap<ConfusionStats>,
    samples: usize,
}

impl EvaluationPass {
    pub fn new(attributes: &AttributeSet) -> Self {
        EvaluationPass {
            thresholds: attributes.thresholds(),
            stats: AttrMap::from_fn(attributes.len(), |_| ConfusionStats::default()),
            samples: 0,
        }
    }

    /// Record a batch: an attribute is predicted when its score is strictly
    /// above the threshold, and present when its label is above 0.5.
    pub fn observe(&mut self, scores: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<()> {
        if scores.dim() != labels.dim() || scores.ncols() != self.stats.len() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("({}, {})", labels.nrows(), self.stats.len()),
                format!("scores {:?}, labels {:?}", scores.dim(), labels.dim()),
            ));
        }
        for (score_row, label_row) in scores.rows().into_iter().zip(labels.rows()) {
            for (k, (&score, &label)) in score_row.iter().zip(label_row.iter()).enumerate() {
                if let Some(stats) = self.stats.get_mut(k) {
                    stats.record(score > self.thresholds[k], label > 0.5);
                }
            }
        }
        self.samples += scores.nrows();
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn finish(self, split: Split) -> Result<EvaluationReport> {
        if self.samples == 0 {
            return Err(FaceAttrError::EmptySplit(split));
        }
        let n = self.samples as f32;
        Ok(EvaluationReport {
            split,
            samples: self.samples,
            accuracy: self.stats.map(|s| s.correct() as f32 * 100.0 / n),
            confusion: self.stats.map(|s| ConfusionSummary::from(*s)),
        })
    }
}

/// Per-attribute accuracy (percent) and confusion statistics of one split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub split: Split,
    pub samples: usize,
    pub accuracy: AttrMap<f32>,
    pub confusion: AttrMap<ConfusionSummary>,
}

impl EvaluationReport {
    /// Unweighted mean of the per-attribute accuracies.
    pub fn mean_accuracy(&self) -> f32 {
        if self.accuracy.is_empty() {
            return 0.0;
        }
        self.accuracy.iter().sum::<f32>() / self.accuracy.len() as f32
    }
}

/// Runs a predictor over a split without touching its parameters.
#[derive(Debug, Clone)]
pub struct MetricEvaluator {
    attributes: AttributeSet,
}

impl MetricEvaluator {
    pub fn new(attributes: &AttributeSet) -> Self {
        MetricEvaluator { attributes: attributes.clone() }
    }

    pub fn evaluate<D: DataSource + ?Sized>(
        &self,
        predictor: &mut dyn AttributePredictor,
        data: &mut D,
        split: Split,
        batch_size: usize,
    ) -> Result<EvaluationReport> {
        predictor.set_mode(Mode::Eval);
        let mut pass = EvaluationPass::new(&self.attributes);
        for batch in data.batches(split, batch_size)? {
            let batch = batch?;
            let scores = predictor.forward(batch.images.view())?;
            pass.observe(scores.view(), batch.labels.view())?;
        }
        debug!(split = %split, samples = pass.samples(), "evaluation pass complete");
        pass.finish(split)
    }
}
