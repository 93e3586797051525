use serde::Serialize;

use crate::attributes::AttrMap;
use crate::error::{FaceAttrError, Result};

/// Summary of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Mean over batches of each batch's summed loss.
    pub train_loss: f32,
    /// Total loss divided by the number of training samples.
    pub train_loss_per_sample: f32,
    pub batches: usize,
    /// Validation accuracy per attribute, in percent.
    pub accuracy: AttrMap<f32>,
    pub mean_accuracy: f32,
    /// Best mean accuracy after this epoch.
    pub best_mean_accuracy: f32,
    pub improved: bool,
}

/// Append-only list of epoch records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunHistory {
    records: Vec<EpochRecord>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; epochs must arrive in increasing order.
    pub fn push(&mut self, record: EpochRecord) -> Result<()> {
        if let Some(last) = self.records.last() {
            if record.epoch <= last.epoch {
                return Err(FaceAttrError::TrainingError(format!(
                    "epoch {} recorded after epoch {}",
                    record.epoch, last.epoch
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn loss_curve(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.train_loss).collect()
    }

    pub fn accuracy_curve(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.mean_accuracy).collect()
    }
}
