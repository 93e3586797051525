use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Serialize, Deserialize};
use bincode::{serialize, deserialize};

use crate::config::ModelType;
use crate::error::{FaceAttrError, Result};

/// Weights and biases of one dense layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl LayerParams {
    pub fn view(&self) -> LayerView<'_> {
        LayerView { weights: self.weights.view(), biases: self.biases.view() }
    }
}

/// Borrowed weights and biases of one layer, live or snapshotted.
#[derive(Debug, Clone, Copy)]
pub struct LayerView<'a> {
    pub weights: ArrayView2<'a, f32>,
    pub biases: ArrayView1<'a, f32>,
}

impl LayerView<'_> {
    /// L2 norm of the weight matrix.
    pub fn weight_norm(&self) -> f32 {
        self.weights.iter().map(|w| w * w).sum::<f32>().sqrt()
    }
}

/// Name layers `backbone.<i>` then `head.<k>`.
pub fn name_layers<'a, B, H>(backbone: B, heads: H) -> Vec<(String, LayerView<'a>)>
where
    B: IntoIterator<Item = LayerView<'a>>,
    H: IntoIterator<Item = LayerView<'a>>,
{
    backbone
        .into_iter()
        .enumerate()
        .map(|(i, layer)| (format!("backbone.{}", i), layer))
        .chain(heads.into_iter().enumerate().map(|(k, layer)| (format!("head.{}", k), layer)))
        .collect()
}

/// A deep copy of every trainable parameter of a predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub backbone: Vec<LayerParams>,
    /// One layer per attribute, in attribute order.
    pub heads: Vec<LayerParams>,
}

impl ParameterSnapshot {
    pub fn layers(&self) -> Vec<(String, LayerView<'_>)> {
        name_layers(self.backbone.iter().map(LayerParams::view), self.heads.iter().map(LayerParams::view))
    }
}

/// The persisted best model: parameters plus what is needed to rebuild the
/// predictor and interpret its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model_type: ModelType,
    pub input_dim: usize,
    pub image_size: [u32; 2],
    pub attributes: Vec<String>,
    pub thresholds: Vec<f32>,
    /// Epoch that produced these parameters; `None` for the initial weights.
    pub epoch: Option<usize>,
    pub mean_accuracy: f32,
    pub parameters: ParameterSnapshot,
}

impl Checkpoint {
    /// Write the checkpoint next to `path` and rename it into place, so a
    /// reader never sees a partial file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serialize(self)?;
        let tmp = temp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serialized)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .map_err(|e| FaceAttrError::IoError(format!("{}: {}", path.display(), e)))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let checkpoint: Self = deserialize(&buffer)?;
        if checkpoint.attributes.len() != checkpoint.parameters.heads.len() {
            return Err(FaceAttrError::SerializationError(format!(
                "{}: {} attributes but {} heads",
                path.display(),
                checkpoint.attributes.len(),
                checkpoint.parameters.heads.len()
            )));
        }
        Ok(checkpoint)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
