use std::path::PathBuf;
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::attributes::{AttrMap, AttributeSet};
use crate::config::RunConfig;
use crate::data::{Batch, DataSource, Split};
use crate::debug::{check_parameters, ensure_finite_loss};
use crate::error::{FaceAttrError, Result};
use crate::inference::{AttributeClassifier, AttributeScore};
use crate::loss::{AttributeLoss, LossAggregator};
use crate::metrics::{ConfusionSummary, EvaluationReport, MetricEvaluator};
use crate::model::{build_predictor, AttributePredictor, Checkpoint, Mode, ParameterSnapshot};
use crate::optimizer::{Optimizer, OptimizerWrapper};
use crate::report::{epoch_summary, plot_series, ReportWriter};
use crate::tensorboard::TensorboardWriter;
use super::{EpochRecord, RunHistory};

/// Lifecycle of a [`TrainingLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Training { epoch: usize },
    Evaluating { epoch: usize },
    Finalizing,
    Done,
}

/// Parameters with the highest mean validation accuracy seen so far.
#[derive(Debug, Clone)]
pub struct BestModel {
    /// `None` while the initial parameters are still the best.
    pub epoch: Option<usize>,
    pub mean_accuracy: f32,
    pub parameters: ParameterSnapshot,
    pub confusion: Option<AttrMap<ConfusionSummary>>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub epochs: usize,
    pub best_epoch: Option<usize>,
    pub best_mean_accuracy: f32,
    pub checkpoint: PathBuf,
    pub test: Option<EvaluationReport>,
}

/// Drives training and validation for one run.
pub struct TrainingLoop<D: DataSource> {
    config: RunConfig,
    attributes: AttributeSet,
    data: D,
    predictor: Box<dyn AttributePredictor>,
    loss: LossAggregator,
    optimizer: OptimizerWrapper,
    evaluator: MetricEvaluator,
    state: RunState,
    history: RunHistory,
    best: Option<BestModel>,
    reports: ReportWriter,
    tensorboard: Option<TensorboardWriter>,
    classifier: AttributeClassifier,
}

impl<D: DataSource> TrainingLoop<D> {
    /// Validate `config`, resolve its strategies and build the predictor.
    pub fn new(config: RunConfig, data: D) -> Result<Self> {
        config.validate()?;
        let attributes = AttributeSet::from_config(&config)?;
        let predictor = build_predictor(config.model()?, &attributes, config.input_dim(), config.pretrained_backbone())?;
        Self::with_predictor(config, data, predictor)
    }

    /// Like [`new`](Self::new) with a caller-supplied predictor.
    pub fn with_predictor(config: RunConfig, data: D, predictor: Box<dyn AttributePredictor>) -> Result<Self> {
        config.validate()?;
        let attributes = AttributeSet::from_config(&config)?;
        if predictor.num_attributes() != attributes.len() {
            return Err(FaceAttrError::dimension_mismatch(
                format!("predictor with {} outputs", attributes.len()),
                format!("{}", predictor.num_attributes()),
            ));
        }

        let loss = LossAggregator::from_config(&config, &attributes)?;
        let optimizer = OptimizerWrapper::from_type(config.optimizer()?, config.momentum);
        if config.device != 0 {
            warn!(device = config.device, "accelerator devices are not supported, training on the CPU");
        }

        let run_name = config.run_name();
        let reports = ReportWriter::new(config.log_dir.clone(), &run_name);
        let tensorboard = if config.use_tensorboard {
            Some(TensorboardWriter::new(&config.log_dir, &run_name)?)
        } else {
            None
        };
        let classifier = AttributeClassifier::new(reports.checkpoint_path(), attributes.clone(), config.image_size);

        let best = BestModel {
            epoch: None,
            mean_accuracy: 0.0,
            parameters: predictor.snapshot(),
            confusion: None,
        };

        info!(
            run = %run_name,
            loss = %loss.kind(),
            optimizer = %optimizer.kind(),
            attributes = ?attributes.names(),
            "training loop initialized"
        );

        Ok(TrainingLoop {
            evaluator: MetricEvaluator::new(&attributes),
            config,
            attributes,
            data,
            predictor,
            loss,
            optimizer,
            state: RunState::Initialized,
            history: RunHistory::new(),
            best: Some(best),
            reports,
            tensorboard,
            classifier,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn predictor(&self) -> &dyn AttributePredictor {
        self.predictor.as_ref()
    }

    /// The current best model; `None` once it has been handed to finalization.
    pub fn best(&self) -> Option<&BestModel> {
        self.best.as_ref()
    }

    pub fn best_mean_accuracy(&self) -> f32 {
        self.best.as_ref().map_or(0.0, |b| b.mean_accuracy)
    }

    fn next_epoch(&self) -> Result<usize> {
        match self.state {
            RunState::Initialized => Ok(0),
            RunState::Training { epoch } => Ok(epoch),
            RunState::Evaluating { epoch } => Ok(epoch + 1),
            state => Err(FaceAttrError::TrainingError(format!("cannot start an epoch in state {:?}", state))),
        }
    }

    /// One optimization step on a single batch; returns its summed loss.
    ///
    /// The step opens the next epoch, so the run cannot be finalized until
    /// [`run_epoch`](Self::run_epoch) has validated the updated parameters.
    pub fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let epoch = self.next_epoch()?;
        self.state = RunState::Training { epoch };
        self.predictor.set_mode(Mode::Train);
        step(self.predictor.as_mut(), &self.loss, &mut self.optimizer, self.config.learning_rate, batch, epoch, 0)
    }

    /// Train over the whole train split. Returns `(mean batch loss, mean sample loss, batches)`.
    fn train_epoch(&mut self, epoch: usize) -> Result<(f32, f32, usize)> {
        let TrainingLoop { data, predictor, loss, optimizer, config, .. } = self;
        predictor.set_mode(Mode::Train);

        let mut total = 0.0f64;
        let mut batches = 0usize;
        let mut samples = 0usize;
        for batch in data.batches(Split::Train, config.batch_size)? {
            let batch = batch?;
            let batch_loss = step(predictor.as_mut(), loss, &mut *optimizer, config.learning_rate, &batch, epoch, batches)?;
            debug!(epoch, batch = batches, loss = batch_loss, "train step");
            total += batch_loss as f64;
            batches += 1;
            samples += batch.len();
        }

        if samples == 0 {
            return Err(FaceAttrError::EmptySplit(Split::Train));
        }
        Ok(((total / batches as f64) as f32, (total / samples as f64) as f32, batches))
    }

    /// Evaluate the live parameters on `split`.
    pub fn evaluate(&mut self, split: Split) -> Result<EvaluationReport> {
        self.evaluator
            .evaluate(self.predictor.as_mut(), &mut self.data, split, self.config.batch_size)
    }

    /// Train one epoch, validate, and update the best model.
    pub fn run_epoch(&mut self) -> Result<EpochRecord> {
        let epoch = self.next_epoch()?;
        self.state = RunState::Training { epoch };
        let (train_loss, train_loss_per_sample, batches) = self.train_epoch(epoch)?;

        if !check_parameters(&self.predictor.layers()).is_empty() {
            return Err(FaceAttrError::TrainingDiverged { epoch, batch: batches, loss: train_loss });
        }

        self.state = RunState::Evaluating { epoch };
        let report = self.evaluate(Split::Validate)?;
        let mean_accuracy = report.mean_accuracy();

        let best = self.best.as_ref().map_or(0.0, |b| b.mean_accuracy);
        let improved = mean_accuracy > best;
        if improved {
            // Drop the previous best before copying, so at most two parameter sets exist.
            self.best = None;
            self.best = Some(BestModel {
                epoch: Some(epoch),
                mean_accuracy,
                parameters: self.predictor.snapshot(),
                confusion: Some(report.confusion.clone()),
            });
        }

        let record = EpochRecord {
            epoch,
            train_loss,
            train_loss_per_sample,
            batches,
            accuracy: report.accuracy.clone(),
            mean_accuracy,
            best_mean_accuracy: if improved { mean_accuracy } else { best },
            improved,
        };
        self.history.push(record.clone())?;
        info!("{}", epoch_summary(&record, &self.attributes));

        if let Some(writer) = self.tensorboard.as_mut() {
            writer.set_step(epoch as i64);
            writer.add_scalar("train/loss", train_loss)?;
            writer.add_scalar("val/mean_accuracy", mean_accuracy)?;
            let per_attr: Vec<(String, f32)> = self
                .attributes
                .named(&report.accuracy)
                .map(|(name, acc)| (name.to_string(), *acc))
                .collect();
            writer.add_scalars("val/accuracy", &per_attr)?;
            writer.add_parameter_stats(&self.predictor.layers())?;
            writer.flush()?;
        }

        Ok(record)
    }

    /// Run every configured epoch, then finalize.
    pub fn fit(&mut self) -> Result<RunSummary> {
        for _ in 0..self.config.epoches {
            if let Err(err) = self.run_epoch() {
                if err.is_fatal() {
                    warn!(error = %err, "run aborted, nothing persisted");
                }
                return Err(err);
            }
        }
        self.finalize()
    }

    /// Restore the best parameters, persist the checkpoint and reports,
    /// then evaluate the test split.
    pub fn finalize(&mut self) -> Result<RunSummary> {
        match self.state {
            RunState::Initialized | RunState::Evaluating { .. } => {}
            state => return Err(FaceAttrError::TrainingError(format!("cannot finalize in state {:?}", state))),
        }
        let best = self
            .best
            .take()
            .ok_or_else(|| FaceAttrError::TrainingError("best model already consumed".to_string()))?;
        self.state = RunState::Finalizing;

        self.predictor.restore(&best.parameters)?;
        let checkpoint_path = self.reports.checkpoint_path();
        let checkpoint = Checkpoint {
            model_type: self.config.model()?,
            input_dim: self.predictor.input_dim(),
            image_size: self.config.image_size,
            attributes: self.attributes.names(),
            thresholds: self.attributes.thresholds().as_slice().to_vec(),
            epoch: best.epoch,
            mean_accuracy: best.mean_accuracy,
            parameters: best.parameters,
        };
        checkpoint.save(&checkpoint_path)?;
        info!(path = %checkpoint_path.display(), epoch = ?best.epoch, mean_accuracy = best.mean_accuracy, "saved best model");

        self.reports.write_train_loss(&self.history)?;
        self.reports.write_eval_accuracy(&self.attributes, &self.history)?;
        match &best.confusion {
            Some(confusion) => {
                self.reports.write_confusion("eval_confusion_matrix.csv", &self.attributes, confusion)?;
            }
            None => warn!("no epoch improved on the initial parameters, skipping validation confusion table"),
        }
        self.reports.write_history(&self.attributes, &self.history)?;

        info!("\n{}", plot_series(&self.history.loss_curve(), "Train loss", 60, 12));
        info!("\n{}", plot_series(&self.history.accuracy_curve(), "Validation accuracy (%)", 60, 12));

        let test = match self.evaluate(Split::Test) {
            Ok(report) => {
                self.reports.write_accuracy("test_accuracy.csv", &self.attributes, &report)?;
                self.reports.write_confusion("test_confusion_matrix.csv", &self.attributes, &report.confusion)?;
                info!(mean_accuracy = report.mean_accuracy(), samples = report.samples, "test evaluation");
                Some(report)
            }
            Err(FaceAttrError::EmptySplit(split)) => {
                warn!(split = %split, "no test samples, skipping test evaluation");
                None
            }
            Err(err) => return Err(err),
        };

        self.state = RunState::Done;
        Ok(RunSummary {
            epochs: self.history.len(),
            best_epoch: checkpoint.epoch,
            best_mean_accuracy: checkpoint.mean_accuracy,
            checkpoint: checkpoint_path,
            test,
        })
    }

    /// Classify one image with the persisted best model.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<Vec<AttributeScore>> {
        if self.state != RunState::Done {
            return Err(FaceAttrError::ModelNotReady(format!("run is {:?}, not done", self.state)));
        }
        self.classifier.predict(image)
    }
}

fn step(
    predictor: &mut dyn AttributePredictor,
    loss: &LossAggregator,
    optimizer: &mut dyn Optimizer,
    learning_rate: f32,
    batch: &Batch,
    epoch: usize,
    batch_index: usize,
) -> Result<f32> {
    predictor.zero_grad();
    let scores = predictor.forward(batch.images.view())?;
    let batch_loss = loss.compute(scores.view(), batch.labels.view())?;
    ensure_finite_loss(batch_loss, epoch, batch_index)?;
    let gradient = loss.gradient(scores.view(), batch.labels.view())?;
    predictor.backward(gradient.view())?;
    predictor.apply_gradients(optimizer, learning_rate)?;
    Ok(batch_loss)
}
