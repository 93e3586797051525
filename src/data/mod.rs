//! Data sources.
//!
//! A [`DataSource`] hands out [`Batch`]es for one [`Split`] at a time. Images
//! arrive already transformed and flattened, so a batch is two sample-major
//! matrices: `images[sample, feature]` and `labels[sample, attribute]`.

pub mod celeba;
pub mod memory;
pub mod transform;

use std::fmt;
use ndarray::Array2;
use serde::{Serialize, Deserialize};

use crate::error::{FaceAttrError, Result};

pub use celeba::CelebADataSource;
pub use memory::InMemoryDataSource;
pub use transform::{ImageTransform, IMAGENET_MEAN, IMAGENET_STD};

/// A partition of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Validate,
    Test,
    Predict,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Validate => "validate",
            Split::Test => "test",
            Split::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Transformed images and their binary labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array2<f32>,
    pub labels: Array2<f32>,
}

impl Batch {
    pub fn new(images: Array2<f32>, labels: Array2<f32>) -> Result<Self> {
        if images.nrows() != labels.nrows() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("{} label rows", images.nrows()),
                format!("{}", labels.nrows()),
            ));
        }
        Ok(Batch { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.images.nrows() == 0
    }
}

pub type Batches<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// Produces batches of (image, multi-attribute label) pairs per split.
pub trait DataSource {
    /// Number of samples in `split`.
    fn len(&mut self, split: Split) -> Result<usize>;

    /// Iterate over `split` in batches of `batch_size`; the last may be short.
    fn batches(&mut self, split: Split, batch_size: usize) -> Result<Batches<'_>>;
}
