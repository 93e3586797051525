use ndarray::{array, Array2};
use crate::activations::Activation;
use crate::error::FaceAttrError;
use crate::layers::{DenseLayer, WeightInit};

fn fixed_layer() -> DenseLayer {
    let mut layer = DenseLayer::new(2, 1, Activation::Relu);
    layer.weights = array![[1.0], [2.0]];
    layer.biases = array![0.5];
    layer
}

#[test]
fn test_dense_layer_shapes() {
    let layer = DenseLayer::new(12, 4, Activation::Relu);
    assert_eq!(layer.input_size(), 12);
    assert_eq!(layer.output_size(), 4);
    assert_eq!(layer.parameter_count(), 12 * 4 + 4);
    assert!(layer.biases.iter().all(|&b| b == 0.0));
}

#[test]
fn test_forward_and_infer_agree() {
    let mut layer = fixed_layer();
    let inputs = array![[1.0, 1.0], [0.0, -1.0]];
    let inferred = layer.infer_batch(inputs.view()).unwrap();
    let forward = layer.forward_batch(inputs.view()).unwrap();
    assert_eq!(inferred, array![[3.5], [0.0]]);
    assert_eq!(forward, inferred);
}

#[test]
fn test_backward_gradients() {
    let mut layer = fixed_layer();
    layer.forward_batch(array![[1.0, 1.0]].view()).unwrap();
    let (input_error, weight_grads, bias_grads) = layer.backward_batch(array![[1.0]].view()).unwrap();
    assert_eq!(input_error, array![[1.0, 2.0]]);
    assert_eq!(weight_grads, array![[1.0], [1.0]]);
    assert_eq!(bias_grads, array![1.0]);
}

#[test]
fn test_backward_without_forward_fails() {
    let layer = fixed_layer();
    let err = layer.backward_batch(array![[1.0]].view()).unwrap_err();
    assert!(matches!(err, FaceAttrError::TrainingError(_)));
}

#[test]
fn test_infer_does_not_fill_cache() {
    let mut layer = fixed_layer();
    layer.infer_batch(array![[1.0, 1.0]].view()).unwrap();
    assert!(layer.backward_batch(array![[1.0]].view()).is_err());

    layer.forward_batch(array![[1.0, 1.0]].view()).unwrap();
    layer.clear_cache();
    assert!(layer.backward_batch(array![[1.0]].view()).is_err());
}

#[test]
fn test_input_dimension_mismatch() {
    let layer = fixed_layer();
    let err = layer.infer_batch(Array2::zeros((1, 3)).view()).unwrap_err();
    assert!(matches!(err, FaceAttrError::DimensionMismatch { .. }));
}

#[test]
fn test_he_init_bounds() {
    let weights = WeightInit::HeUniform.initialize_weights((6, 3));
    let limit = 1.0;
    assert!(weights.iter().all(|w| w.abs() <= limit));
    assert_eq!(WeightInit::for_activation(&Activation::Sigmoid), WeightInit::XavierUniform);
}
