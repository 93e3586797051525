//! Run configuration.
//!
//! A [`RunConfig`] is read once from a JSON file and never mutated
//! afterwards. Strategy names are
//! kept as strings here and resolved into [`ModelType`], [`OptimType`] and
//! [`LossType`] when the training loop is constructed, so an unsupported name
//! fails before any batch is processed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::attributes::AttributeSet;
use crate::error::{FaceAttrError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub epoches: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub momentum: f32,
    pub selected_attrs: Vec<String>,
    /// Accelerator id; training always runs on the CPU.
    pub device: usize,
    pub image_dir: PathBuf,
    pub attr_path: PathBuf,
    /// Optional CelebA `list_eval_partition.txt`.
    pub partition_path: Option<PathBuf>,
    pub pretrained: bool,
    /// Checkpoint whose backbone initializes the model when `pretrained` is set.
    pub pretrained_path: Option<PathBuf>,
    pub model_type: String,
    pub optim_type: String,
    pub loss_type: String,
    pub attr_loss_weight: Vec<f32>,
    pub attr_threshold: Vec<f32>,
    pub focal_gamma: f32,
    pub focal_alpha: f32,
    /// Images are resized to `[width, height]` before flattening.
    pub image_size: [u32; 2],
    pub exp_version: String,
    pub log_dir: PathBuf,
    pub use_tensorboard: bool,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            epoches: 100,
            batch_size: 64,
            learning_rate: 0.01,
            momentum: 0.9,
            selected_attrs: Vec::new(),
            device: 0,
            image_dir: PathBuf::from("./Img"),
            attr_path: PathBuf::from("./Anno/list_attr_celeba.txt"),
            partition_path: None,
            pretrained: false,
            pretrained_path: None,
            model_type: "Mlp".to_string(),
            optim_type: "SGD".to_string(),
            loss_type: "BCE_loss".to_string(),
            attr_loss_weight: Vec::new(),
            attr_threshold: Vec::new(),
            focal_gamma: 2.0,
            focal_alpha: 0.25,
            image_size: [64, 64],
            exp_version: "v1".to_string(),
            log_dir: PathBuf::from("./logs"),
            use_tensorboard: false,
            seed: None,
        }
    }
}

impl RunConfig {
    /// Read and validate a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let config: RunConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Check field ranges and per-attribute list lengths.
    ///
    /// Strategy names are checked as well so `load` rejects a bad file early.
    pub fn validate(&self) -> Result<()> {
        AttributeSet::from_config(self)?;

        if self.batch_size == 0 {
            return Err(FaceAttrError::config("batch_size", "must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(FaceAttrError::config("learning_rate", "must be a positive number"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(FaceAttrError::config("momentum", "must be in [0, 1)"));
        }
        if self.image_size[0] == 0 || self.image_size[1] == 0 {
            return Err(FaceAttrError::config("image_size", "width and height must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.focal_alpha) {
            return Err(FaceAttrError::config("focal_alpha", "must be in [0, 1]"));
        }
        if !(self.focal_gamma.is_finite() && self.focal_gamma >= 0.0) {
            return Err(FaceAttrError::config("focal_gamma", "must be non-negative"));
        }
        if self.pretrained && self.pretrained_path.is_none() {
            return Err(FaceAttrError::config("pretrained", "pretrained backbone requested but pretrained_path is unset"));
        }
        if self.exp_version.trim().is_empty() {
            return Err(FaceAttrError::config("exp_version", "must not be empty"));
        }

        self.model()?;
        self.optimizer()?;
        self.loss()?;
        Ok(())
    }

    pub fn model(&self) -> Result<ModelType> {
        self.model_type.parse()
    }

    pub fn optimizer(&self) -> Result<OptimType> {
        self.optim_type.parse()
    }

    pub fn loss(&self) -> Result<LossType> {
        self.loss_type.parse()
    }

    /// Flattened input length: three channels of `image_size`.
    pub fn input_dim(&self) -> usize {
        3 * self.image_size[0] as usize * self.image_size[1] as usize
    }

    /// The pretrained checkpoint, if the backbone should be initialized from one.
    pub fn pretrained_backbone(&self) -> Option<&Path> {
        if self.pretrained {
            self.pretrained_path.as_deref()
        } else {
            None
        }
    }

    /// `<exp_version>-<model_type>`, the prefix of every artifact of this run.
    pub fn run_name(&self) -> String {
        let model = self.model().map(|m| m.to_string()).unwrap_or_else(|_| self.model_type.clone());
        format!("{}-{}", self.exp_version, model)
    }

    pub fn best_model_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}-best_model.pth", self.run_name()))
    }
}

/// Backbone selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Heads read the normalized pixels directly.
    Linear,
    /// Two hidden ReLU layers (256, 128).
    Mlp,
    /// Three hidden ReLU layers (512, 256, 128).
    DeepMlp,
}

impl ModelType {
    pub fn hidden_sizes(&self) -> &'static [usize] {
        match self {
            ModelType::Linear => &[],
            ModelType::Mlp => &[256, 128],
            ModelType::DeepMlp => &[512, 256, 128],
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Linear => "Linear",
            ModelType::Mlp => "Mlp",
            ModelType::DeepMlp => "DeepMlp",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelType {
    type Err = FaceAttrError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "linear" => Ok(ModelType::Linear),
            "mlp" => Ok(ModelType::Mlp),
            "deepmlp" => Ok(ModelType::DeepMlp),
            _ => Err(FaceAttrError::config(
                "model_type",
                format!("unsupported model type '{}' (expected Linear, Mlp or DeepMlp)", s),
            )),
        }
    }
}

/// Optimizer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimType {
    Sgd,
    Adam,
}

impl fmt::Display for OptimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimType::Sgd => f.write_str("SGD"),
            OptimType::Adam => f.write_str("Adam"),
        }
    }
}

impl FromStr for OptimType {
    type Err = FaceAttrError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "sgd" => Ok(OptimType::Sgd),
            "adam" => Ok(OptimType::Adam),
            _ => Err(FaceAttrError::config(
                "optim_type",
                format!("unsupported optimizer '{}' (expected SGD or Adam)", s),
            )),
        }
    }
}

/// Loss strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossType {
    WeightedBce,
    Focal,
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossType::WeightedBce => f.write_str("BCE_loss"),
            LossType::Focal => f.write_str("focal_loss"),
        }
    }
}

impl FromStr for LossType {
    type Err = FaceAttrError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "bce" | "bceloss" | "weightedbce" => Ok(LossType::WeightedBce),
            "focal" | "focalloss" => Ok(LossType::Focal),
            _ => Err(FaceAttrError::config(
                "loss_type",
                format!("unsupported loss type '{}' (expected BCE_loss or focal_loss)", s),
            )),
        }
    }
}

// "BCE_loss", "bce-loss" and "BceLoss" all select the same strategy.
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
