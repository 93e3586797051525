use std::path::Path;
use image::DynamicImage;
use ndarray::{Array1, Array2, ArrayView2};
use tempfile::tempdir;
use crate::config::RunConfig;
use crate::data::{Batches, DataSource, InMemoryDataSource, Split};
use crate::error::{FaceAttrError, Result};
use crate::model::{name_layers, AttributeNetwork, AttributePredictor, LayerParams, LayerView, Mode, ParameterSnapshot};
use crate::config::ModelType;
use crate::optimizer::Optimizer;
use crate::trainer::{RunState, TrainingLoop};

const INPUT_DIM: usize = 12;

// Smiling follows feature 0, Male follows feature 1.
fn toy_split(n: usize, offset: usize) -> (Array2<f32>, Array2<f32>) {
    let images = Array2::from_shape_fn((n, INPUT_DIM), |(i, j)| {
        let i = i + offset;
        match j {
            0 => if i % 2 == 0 { 1.0 } else { -1.0 },
            1 => if (i / 2) % 2 == 0 { 1.0 } else { -1.0 },
            _ => ((i * 7 + j) % 5) as f32 * 0.05 - 0.1,
        }
    });
    let labels = Array2::from_shape_fn((n, 2), |(i, j)| {
        let i = i + offset;
        let positive = if j == 0 { i % 2 == 0 } else { (i / 2) % 2 == 0 };
        if positive { 1.0 } else { 0.0 }
    });
    (images, labels)
}

fn toy_source() -> InMemoryDataSource {
    let (train_x, train_y) = toy_split(32, 0);
    let (val_x, val_y) = toy_split(8, 32);
    let (test_x, test_y) = toy_split(8, 40);
    InMemoryDataSource::new()
        .with_split(Split::Train, train_x, train_y)
        .and_then(|d| d.with_split(Split::Validate, val_x, val_y))
        .and_then(|d| d.with_split(Split::Test, test_x, test_y))
        .unwrap()
}

fn toy_config(log_dir: &Path) -> RunConfig {
    RunConfig {
        selected_attrs: vec!["Smiling".to_string(), "Male".to_string()],
        image_size: [2, 2],
        model_type: "Linear".to_string(),
        batch_size: 8,
        epoches: 5,
        learning_rate: 0.05,
        momentum: 0.9,
        log_dir: log_dir.to_path_buf(),
        seed: Some(1),
        ..RunConfig::default()
    }
}

/// Returns the same score for every sample and attribute. Each optimizer
/// step adds one to the shared head bias.
struct ConstantPredictor {
    attributes: usize,
    score: f32,
    mode: Mode,
    head: LayerParams,
}

impl ConstantPredictor {
    fn new(attributes: usize, score: f32) -> Self {
        let head = LayerParams { weights: Array2::zeros((INPUT_DIM, 1)), biases: Array1::zeros(1) };
        ConstantPredictor { attributes, score, mode: Mode::Train, head }
    }
}

impl AttributePredictor for ConstantPredictor {
    fn input_dim(&self) -> usize {
        INPUT_DIM
    }

    fn num_attributes(&self) -> usize {
        self.attributes
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(Array2::from_elem((inputs.nrows(), self.attributes), self.score))
    }

    fn zero_grad(&mut self) {}

    fn backward(&mut self, _loss_gradient: ArrayView2<f32>) -> Result<()> {
        Ok(())
    }

    fn apply_gradients(&mut self, _optimizer: &mut dyn Optimizer, _learning_rate: f32) -> Result<()> {
        self.head.biases += 1.0;
        Ok(())
    }

    fn layers(&self) -> Vec<(String, LayerView<'_>)> {
        name_layers(Vec::new(), (0..self.attributes).map(|_| self.head.view()))
    }

    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot { backbone: vec![], heads: vec![self.head.clone(); self.attributes] }
    }

    fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.head = snapshot.heads[0].clone();
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

struct UnreachableSource;

impl DataSource for UnreachableSource {
    fn len(&mut self, _split: Split) -> Result<usize> {
        panic!("no data access expected")
    }

    fn batches(&mut self, _split: Split, _batch_size: usize) -> Result<Batches<'_>> {
        panic!("no data access expected")
    }
}

#[test]
fn test_fit_trains_and_persists_reports() {
    let dir = tempdir().unwrap();
    let mut run = TrainingLoop::new(toy_config(dir.path()), toy_source()).unwrap();
    assert_eq!(run.state(), RunState::Initialized);

    let summary = run.fit().unwrap();
    assert_eq!(run.state(), RunState::Done);
    assert_eq!(summary.epochs, 5);
    assert!(summary.best_mean_accuracy >= 75.0, "{}", summary.best_mean_accuracy);
    assert!(summary.best_epoch.is_some());
    assert_eq!(summary.checkpoint, dir.path().join("v1-Linear-best_model.pth"));
    assert!(summary.checkpoint.exists());
    assert_eq!(summary.test.as_ref().map(|t| t.samples), Some(8));

    for file in [
        "train_loss.csv",
        "eval_accuracy.csv",
        "eval_confusion_matrix.csv",
        "test_accuracy.csv",
        "test_confusion_matrix.csv",
        "history.json",
    ] {
        assert!(dir.path().join(format!("v1-Linear-{}", file)).exists(), "{}", file);
    }

    let losses = std::fs::read_to_string(dir.path().join("v1-Linear-train_loss.csv")).unwrap();
    assert_eq!(losses.lines().count(), 6);
}

#[test]
fn test_best_accuracy_never_decreases() {
    let dir = tempdir().unwrap();
    let mut run = TrainingLoop::new(toy_config(dir.path()), toy_source()).unwrap();
    run.fit().unwrap();

    let records = run.history().records();
    assert_eq!(records.len(), 5);
    let mut best = 0.0f32;
    for (epoch, record) in records.iter().enumerate() {
        assert_eq!(record.epoch, epoch);
        assert!(record.best_mean_accuracy >= best);
        assert_eq!(record.improved, record.mean_accuracy > best);
        best = record.best_mean_accuracy;
        assert!(record.train_loss >= record.train_loss_per_sample);
    }
    let max = records.iter().map(|r| r.mean_accuracy).fold(0.0, f32::max);
    assert_eq!(best, max);
}

#[test]
fn test_improvement_snapshots_live_parameters() {
    let dir = tempdir().unwrap();
    // Every score is positive, so both attributes are right on half of validation.
    let predictor = Box::new(ConstantPredictor::new(2, 0.9));
    let mut run = TrainingLoop::with_predictor(toy_config(dir.path()), toy_source(), predictor).unwrap();
    let initial = run.predictor().snapshot();
    assert_eq!(run.best().map(|b| &b.parameters), Some(&initial));
    assert_eq!(run.best().and_then(|b| b.epoch), None);

    let record = run.run_epoch().unwrap();
    assert_eq!(run.state(), RunState::Evaluating { epoch: 0 });
    assert!(record.improved);
    assert_eq!(record.mean_accuracy, 50.0);
    let at_improvement = run.predictor().snapshot();
    assert_eq!(at_improvement.heads[0].biases[0], 4.0);
    let best = run.best().unwrap();
    assert_eq!(best.epoch, Some(0));
    assert_eq!(best.parameters, at_improvement);
    assert!(best.confusion.is_some());

    // Equal accuracy is not an improvement; training keeps moving the live parameters.
    for _ in 0..2 {
        assert!(!run.run_epoch().unwrap().improved);
    }
    let best = run.best().unwrap();
    assert_eq!(best.epoch, Some(0));
    assert_eq!(best.parameters, at_improvement);
    let live = run.predictor().snapshot();
    assert_eq!(live.heads[0].biases[0], 12.0);
    assert_ne!(live, best.parameters);

    let summary = run.finalize().unwrap();
    assert_eq!(summary.best_epoch, Some(0));
    assert_eq!(run.predictor().snapshot(), at_improvement);
}

#[test]
fn test_nan_loss_aborts_without_checkpoint() {
    let dir = tempdir().unwrap();
    let config = toy_config(dir.path());
    let checkpoint = config.best_model_path();
    let predictor = Box::new(ConstantPredictor::new(2, f32::NAN));
    let mut run = TrainingLoop::with_predictor(config, toy_source(), predictor).unwrap();

    let err = run.fit().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, FaceAttrError::TrainingDiverged { epoch: 0, batch: 0, .. }));
    assert!(!checkpoint.exists());
    assert!(!dir.path().join("v1-Linear-train_loss.csv").exists());
    assert!(run.history().is_empty());
}

#[test]
fn test_predict_requires_finished_run() {
    let dir = tempdir().unwrap();
    let mut run = TrainingLoop::new(toy_config(dir.path()), toy_source()).unwrap();
    let image = DynamicImage::new_rgb8(2, 2);
    assert!(matches!(run.predict(&image).unwrap_err(), FaceAttrError::ModelNotReady(_)));
    run.run_epoch().unwrap();
    assert!(matches!(run.predict(&image).unwrap_err(), FaceAttrError::ModelNotReady(_)));
}

#[test]
fn test_predict_applies_thresholds() {
    let dir = tempdir().unwrap();
    let config = RunConfig { epoches: 2, attr_threshold: vec![0.0, 1.0], ..toy_config(dir.path()) };
    let mut run = TrainingLoop::new(config, toy_source()).unwrap();
    run.fit().unwrap();

    let image = DynamicImage::new_rgb8(5, 3);
    let predicted = run.predict(&image).unwrap();
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].name, "Smiling");
    assert!(predicted[0].score > 0.0 && predicted[0].score <= 1.0);
    assert_eq!(run.predict(&image).unwrap(), predicted);
}

#[test]
fn test_no_training_after_done() {
    let dir = tempdir().unwrap();
    let config = RunConfig { epoches: 1, ..toy_config(dir.path()) };
    let mut run = TrainingLoop::new(config, toy_source()).unwrap();
    run.fit().unwrap();
    assert!(matches!(run.run_epoch().unwrap_err(), FaceAttrError::TrainingError(_)));
    assert!(matches!(run.finalize().unwrap_err(), FaceAttrError::TrainingError(_)));
    assert!(run.best().is_none());
}

#[test]
fn test_zero_epochs_persist_initial_parameters() {
    let dir = tempdir().unwrap();
    let config = RunConfig { epoches: 0, ..toy_config(dir.path()) };
    let mut run = TrainingLoop::new(config, toy_source()).unwrap();
    let initial = run.predictor().snapshot();
    let summary = run.fit().unwrap();

    assert_eq!(summary.epochs, 0);
    assert_eq!(summary.best_epoch, None);
    assert_eq!(summary.best_mean_accuracy, 0.0);
    let checkpoint = crate::model::Checkpoint::load(&summary.checkpoint).unwrap();
    assert_eq!(checkpoint.parameters, initial);
    assert!(!dir.path().join("v1-Linear-eval_confusion_matrix.csv").exists());
}

#[test]
fn test_unknown_loss_type_fails_before_any_batch() {
    let dir = tempdir().unwrap();
    let config = RunConfig { loss_type: "hinge".to_string(), ..toy_config(dir.path()) };
    let err = TrainingLoop::new(config, UnreachableSource).err().unwrap();
    assert!(matches!(err, FaceAttrError::Config { ref name, .. } if name == "loss_type"));
}

#[test]
fn test_predictor_must_match_attributes() {
    let dir = tempdir().unwrap();
    let predictor = Box::new(AttributeNetwork::new(ModelType::Linear, INPUT_DIM, 3));
    let err = TrainingLoop::with_predictor(toy_config(dir.path()), toy_source(), predictor).err().unwrap();
    assert!(matches!(err, FaceAttrError::DimensionMismatch { .. }));
}

#[test]
fn test_missing_train_split() {
    let dir = tempdir().unwrap();
    let (x, y) = toy_split(4, 0);
    let data = InMemoryDataSource::new().with_split(Split::Train, Array2::zeros((0, INPUT_DIM)), Array2::zeros((0, 2))).unwrap();
    let data = data.with_split(Split::Validate, x, y).unwrap();
    let mut run = TrainingLoop::new(toy_config(dir.path()), data).unwrap();
    assert!(matches!(run.run_epoch().unwrap_err(), FaceAttrError::EmptySplit(Split::Train)));
}

#[test]
fn test_tensorboard_scalars() {
    let dir = tempdir().unwrap();
    let config = RunConfig { epoches: 2, use_tensorboard: true, ..toy_config(dir.path()) };
    let mut run = TrainingLoop::new(config, toy_source()).unwrap();
    run.fit().unwrap();
    let scalars = std::fs::read_to_string(dir.path().join("v1-Linear").join("scalars.csv")).unwrap();
    assert!(scalars.lines().any(|l| l.starts_with("0,train/loss,")));
    assert!(scalars.lines().any(|l| l.starts_with("1,val/mean_accuracy,")));
    assert!(scalars.lines().any(|l| l.starts_with("1,val/accuracy/Male,")));
    assert!(scalars.lines().any(|l| l.starts_with("1,head.0/weight_norm,")));
}

#[test]
fn test_run_without_test_split_finishes() {
    let dir = tempdir().unwrap();
    let (train_x, train_y) = toy_split(32, 0);
    let (val_x, val_y) = toy_split(8, 32);
    let data = InMemoryDataSource::new()
        .with_split(Split::Train, train_x, train_y)
        .and_then(|d| d.with_split(Split::Validate, val_x, val_y))
        .unwrap();
    let config = RunConfig { epoches: 2, ..toy_config(dir.path()) };
    let mut run = TrainingLoop::new(config, data).unwrap();

    let summary = run.fit().unwrap();
    assert_eq!(run.state(), RunState::Done);
    assert!(summary.test.is_none());
    assert!(summary.checkpoint.exists());
    assert!(!dir.path().join("v1-Linear-test_accuracy.csv").exists());
    assert!(run.predict(&DynamicImage::new_rgb8(2, 2)).is_ok());
}

#[test]
fn test_train_step_opens_an_epoch() {
    let dir = tempdir().unwrap();
    let predictor = Box::new(ConstantPredictor::new(2, 0.9));
    let mut run = TrainingLoop::with_predictor(toy_config(dir.path()), toy_source(), predictor).unwrap();
    let (x, y) = toy_split(4, 0);
    let batch = crate::data::Batch::new(x, y).unwrap();

    let loss = run.train_step(&batch).unwrap();
    assert!(loss > 0.0);
    assert_eq!(run.state(), RunState::Training { epoch: 0 });
    assert!(matches!(run.finalize().unwrap_err(), FaceAttrError::TrainingError(_)));
    assert_eq!(run.best().and_then(|b| b.epoch), None);

    run.train_step(&batch).unwrap();
    assert_eq!(run.state(), RunState::Training { epoch: 0 });
    let record = run.run_epoch().unwrap();
    assert_eq!(record.epoch, 0);
    assert_eq!(run.state(), RunState::Evaluating { epoch: 0 });
    // Two manual steps plus four batches of the train split.
    assert_eq!(run.best().map(|b| b.parameters.heads[0].biases[0]), Some(6.0));

    run.train_step(&batch).unwrap();
    assert_eq!(run.state(), RunState::Training { epoch: 1 });
}

