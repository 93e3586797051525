//! Single-image prediction from a persisted best-model checkpoint.

use std::path::{Path, PathBuf};
use image::DynamicImage;
use ndarray::Axis;
use serde::Serialize;
use tracing::info;

use crate::attributes::{AttrMap, AttributeSet};
use crate::config::RunConfig;
use crate::data::{ImageTransform, Split};
use crate::error::{FaceAttrError, Result};
use crate::model::{AttributeNetwork, AttributePredictor, Checkpoint};

/// An attribute judged present, with its raw score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeScore {
    pub name: String,
    pub score: f32,
}

enum ClassifierState {
    Unloaded,
    Loaded(Box<AttributeNetwork>),
}

/// Loads the checkpoint on first use and keeps it for later predictions.
pub struct AttributeClassifier {
    checkpoint_path: PathBuf,
    attributes: AttributeSet,
    transform: ImageTransform,
    state: ClassifierState,
}

impl AttributeClassifier {
    pub fn new<P: Into<PathBuf>>(checkpoint_path: P, attributes: AttributeSet, image_size: [u32; 2]) -> Self {
        AttributeClassifier {
            checkpoint_path: checkpoint_path.into(),
            attributes,
            transform: ImageTransform::for_split(Split::Predict, image_size),
            state: ClassifierState::Unloaded,
        }
    }

    /// Classifier for the best model of the run described by `config`.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let attributes = AttributeSet::from_config(config)?;
        Ok(Self::new(config.best_model_path(), attributes, config.image_size))
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ClassifierState::Loaded(_))
    }

    fn ensure_loaded(&mut self) -> Result<&mut AttributeNetwork> {
        if let ClassifierState::Unloaded = self.state {
            if !self.checkpoint_path.exists() {
                return Err(FaceAttrError::ModelNotReady(format!(
                    "no checkpoint at {}",
                    self.checkpoint_path.display()
                )));
            }
            let checkpoint = Checkpoint::load(&self.checkpoint_path)?;
            if checkpoint.attributes != self.attributes.names() {
                return Err(FaceAttrError::config(
                    "selected_attrs",
                    format!(
                        "checkpoint {} was trained for {:?}",
                        self.checkpoint_path.display(),
                        checkpoint.attributes
                    ),
                ));
            }
            let thresholds = self.attributes.thresholds();
            if checkpoint.thresholds.as_slice() != thresholds.as_slice() {
                return Err(FaceAttrError::config(
                    "attr_threshold",
                    format!(
                        "checkpoint {} was validated with thresholds {:?}, configured {:?}",
                        self.checkpoint_path.display(),
                        checkpoint.thresholds,
                        thresholds.as_slice()
                    ),
                ));
            }
            if checkpoint.input_dim != self.transform.output_dim() {
                return Err(FaceAttrError::config(
                    "image_size",
                    format!(
                        "checkpoint expects {:?} images, configured {}x{}",
                        checkpoint.image_size, self.transform.width, self.transform.height
                    ),
                ));
            }
            let network = AttributeNetwork::from_checkpoint(&checkpoint)?;
            info!(
                path = %self.checkpoint_path.display(),
                epoch = ?checkpoint.epoch,
                mean_accuracy = checkpoint.mean_accuracy,
                "loaded checkpoint"
            );
            self.state = ClassifierState::Loaded(Box::new(network));
        }
        match &mut self.state {
            ClassifierState::Loaded(network) => Ok(network.as_mut()),
            ClassifierState::Unloaded => Err(FaceAttrError::ModelNotReady("checkpoint not loaded".to_string())),
        }
    }

    /// Score of every attribute for one image.
    pub fn scores(&mut self, image: &DynamicImage) -> Result<AttrMap<f32>> {
        let input = self.transform.apply_deterministic(image).insert_axis(Axis(0));
        let network = self.ensure_loaded()?;
        let scores = network.forward(input.view())?;
        Ok(AttrMap::from_vec(scores.row(0).to_vec()))
    }

    /// Attributes whose score is above their threshold, in attribute order.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<Vec<AttributeScore>> {
        let scores = self.scores(image)?;
        Ok(self
            .attributes
            .iter()
            .zip(scores.iter())
            .filter(|&(attr, &score)| score > attr.threshold)
            .map(|(attr, &score)| AttributeScore { name: attr.name.clone(), score })
            .collect())
    }

    pub fn predict_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<AttributeScore>> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| FaceAttrError::ImageError(format!("{}: {}", path.display(), e)))?;
        self.predict(&image)
    }
}
