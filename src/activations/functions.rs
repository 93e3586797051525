use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

/// Activation applied after a dense layer's affine transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Sigmoid,
}

impl Activation {
    /// Apply the activation to a batch in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        match self {
            Activation::Relu => {
                inputs.mapv_inplace(|v| v.max(0.0));
            }
            Activation::Sigmoid => {
                inputs.mapv_inplace(sigmoid);
            }
        }
    }

    /// Derivative w.r.t. the pre-activation values of a batch.
    pub fn derivative_batch(&self, pre_activation: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => {
                pre_activation.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
            }
            Activation::Sigmoid => {
                pre_activation.mapv(|v| {
                    let s = sigmoid(v);
                    s * (1.0 - s)
                })
            }
        }
    }
}

/// Logistic function, evaluated without overflowing `exp` for large |x|.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
