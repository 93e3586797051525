use std::collections::HashMap;
use ndarray::{Array2, s};

use crate::error::{FaceAttrError, Result};
use super::{Batch, Batches, DataSource, Split};

/// Pre-transformed samples held in memory, served in order. A split that was
/// never registered holds no samples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    splits: HashMap<Split, (Array2<f32>, Array2<f32>)>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the samples of one split.
    pub fn with_split(mut self, split: Split, images: Array2<f32>, labels: Array2<f32>) -> Result<Self> {
        let batch = Batch::new(images, labels)?;
        self.splits.insert(split, (batch.images, batch.labels));
        Ok(self)
    }

    fn split_data(&self, split: Split) -> Option<&(Array2<f32>, Array2<f32>)> {
        self.splits
            .get(&split)
            .or_else(|| if split == Split::Predict { self.splits.get(&Split::Test) } else { None })
    }
}

impl DataSource for InMemoryDataSource {
    fn len(&mut self, split: Split) -> Result<usize> {
        Ok(self.split_data(split).map_or(0, |(images, _)| images.nrows()))
    }

    fn batches(&mut self, split: Split, batch_size: usize) -> Result<Batches<'_>> {
        if batch_size == 0 {
            return Err(FaceAttrError::config("batch_size", "must be at least 1"));
        }
        let Some((images, labels)) = self.split_data(split) else {
            return Ok(Box::new(std::iter::empty::<Result<Batch>>()));
        };
        let n = images.nrows();
        let iter = (0..n).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(n);
            Batch::new(
                images.slice(s![start..end, ..]).to_owned(),
                labels.slice(s![start..end, ..]).to_owned(),
            )
        });
        Ok(Box::new(iter))
    }
}
