use ndarray::{array, Array2};
use crate::attributes::AttributeSet;
use crate::data::{InMemoryDataSource, Split};
use crate::error::FaceAttrError;
use crate::metrics::{ConfusionStats, EvaluationPass, Metric, MetricEvaluator};
use crate::model::{AttributeNetwork, AttributePredictor, Mode};
use crate::config::ModelType;

fn smiling_male() -> AttributeSet {
    AttributeSet::new(&["Smiling", "Male"]).unwrap()
}

#[test]
fn test_two_sample_scenario() {
    let mut pass = EvaluationPass::new(&smiling_male());
    pass.observe(array![[0.6, 0.4], [0.7, 0.7]].view(), array![[1.0, 0.0], [0.0, 1.0]].view()).unwrap();
    let report = pass.finish(Split::Validate).unwrap();

    assert_eq!(report.samples, 2);
    assert_eq!(report.accuracy.as_slice(), &[50.0, 100.0]);
    assert_eq!(report.mean_accuracy(), 75.0);

    let male = report.confusion[1];
    assert_eq!(male.counts, ConfusionStats { tp: 1, fp: 0, tn: 1, fn_: 0 });
    assert_eq!(male.derived.precision, Metric::Value(1.0));
    assert_eq!(male.derived.recall, Metric::Value(1.0));
    assert_eq!(male.derived.tpr, Metric::Value(1.0));
    assert_eq!(male.derived.fpr, Metric::Value(0.0));
    assert_eq!(male.derived.f1, Metric::Value(1.0));
}

#[test]
fn test_sample_major_scoring() {
    let mut pass = EvaluationPass::new(&smiling_male());
    pass.observe(array![[0.6, 0.4], [0.3, 0.7]].view(), array![[1.0, 0.0], [0.0, 1.0]].view()).unwrap();
    let report = pass.finish(Split::Validate).unwrap();
    assert_eq!(report.accuracy.as_slice(), &[100.0, 100.0]);
}

#[test]
fn test_score_equal_to_threshold_is_negative() {
    let attributes = AttributeSet::with_parameters(&["Smiling", "Male"], &[0.5, 0.7], &[]).unwrap();
    let mut pass = EvaluationPass::new(&attributes);
    pass.observe(array![[0.5, 0.7]].view(), array![[1.0, 1.0]].view()).unwrap();
    let report = pass.finish(Split::Test).unwrap();
    for summary in report.confusion.iter() {
        assert_eq!(summary.counts, ConfusionStats { tp: 0, fp: 0, tn: 0, fn_: 1 });
    }
}

#[test]
fn test_no_positive_predictions_leaves_precision_undefined() {
    let stats = ConfusionStats { tp: 0, fp: 0, tn: 4, fn_: 2 };
    let derived = stats.derive();
    assert_eq!(derived.precision, Metric::Undefined);
    assert_eq!(derived.recall, Metric::Value(0.0));
    assert_eq!(derived.f1, Metric::Undefined);
    assert_eq!(derived.precision.to_string(), "undefined");
}

#[test]
fn test_zero_denominators() {
    let only_negatives = ConfusionStats { tp: 0, fp: 1, tn: 3, fn_: 0 }.derive();
    assert_eq!(only_negatives.recall, Metric::Undefined);
    assert_eq!(only_negatives.tpr, Metric::Undefined);
    assert_eq!(only_negatives.fpr, Metric::Value(0.25));

    let only_positives = ConfusionStats { tp: 2, fp: 0, tn: 0, fn_: 1 }.derive();
    assert_eq!(only_positives.fpr, Metric::Undefined);
    assert!((only_positives.f1.value().unwrap() - 0.8).abs() < 1e-6);
}

#[test]
fn test_counts_sum_to_samples() {
    let attributes = AttributeSet::new(&["A", "B", "C"]).unwrap();
    let mut pass = EvaluationPass::new(&attributes);
    pass.observe(
        array![[0.9, 0.1, 0.5], [0.2, 0.8, 0.51], [0.6, 0.6, 0.0]].view(),
        array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 1.0]].view(),
    )
    .unwrap();
    pass.observe(array![[0.4, 0.4, 0.4]].view(), array![[0.0, 1.0, 0.0]].view()).unwrap();
    let report = pass.finish(Split::Validate).unwrap();
    for summary in report.confusion.iter() {
        assert_eq!(summary.counts.total(), 4);
    }
}

#[test]
fn test_empty_pass_is_an_error() {
    let pass = EvaluationPass::new(&smiling_male());
    let err = pass.finish(Split::Validate).unwrap_err();
    assert!(matches!(err, FaceAttrError::EmptySplit(Split::Validate)));
}

#[test]
fn test_observe_rejects_wrong_width() {
    let mut pass = EvaluationPass::new(&smiling_male());
    let err = pass.observe(array![[0.5]].view(), array![[1.0]].view()).unwrap_err();
    assert!(matches!(err, FaceAttrError::DimensionMismatch { .. }));
}

fn validation_data() -> InMemoryDataSource {
    let images = Array2::from_shape_fn((7, 4), |(i, j)| ((i * 3 + j) % 5) as f32 - 2.0);
    let labels = Array2::from_shape_fn((7, 2), |(i, j)| ((i + j) % 2) as f32);
    InMemoryDataSource::new().with_split(Split::Validate, images, labels).unwrap()
}

#[test]
fn test_evaluation_is_repeatable_and_leaves_eval_mode() {
    let attributes = smiling_male();
    let mut network = AttributeNetwork::new(ModelType::Mlp, 4, 2);
    network.set_mode(Mode::Train);
    let before = network.snapshot();
    let mut data = validation_data();
    let evaluator = MetricEvaluator::new(&attributes);

    let first = evaluator.evaluate(&mut network, &mut data, Split::Validate, 3).unwrap();
    let second = evaluator.evaluate(&mut network, &mut data, Split::Validate, 2).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.samples, 7);
    assert_eq!(network.mode(), Mode::Eval);
    assert_eq!(network.snapshot(), before);
}

#[test]
fn test_evaluating_an_empty_split() {
    let attributes = smiling_male();
    let mut network = AttributeNetwork::new(ModelType::Linear, 4, 2);
    let mut data = InMemoryDataSource::new()
        .with_split(Split::Test, Array2::zeros((0, 4)), Array2::zeros((0, 2)))
        .unwrap();
    let err = MetricEvaluator::new(&attributes)
        .evaluate(&mut network, &mut data, Split::Test, 4)
        .unwrap_err();
    assert!(matches!(err, FaceAttrError::EmptySplit(Split::Test)));
}
