//! Parameter update rules.
//!
//! Each trainable tensor is addressed by a parameter slot (the index of its
//! layer in the predictor). Stateful optimizers keep their moments per slot,
//! created on the first update of that slot.

use std::collections::HashMap;
use ndarray::{Array1, Array2, Dimension, Array};

use crate::config::OptimType;

pub trait Optimizer {
    /// Called once per training step, before any slot is updated.
    fn begin_step(&mut self) {}

    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32);

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32);
}

#[derive(Debug, Clone)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl OptimizerWrapper {
    /// Build the optimizer selected by `optim_type`; `momentum` only applies to SGD.
    pub fn from_type(optim_type: OptimType, momentum: f32) -> Self {
        match optim_type {
            OptimType::Sgd => OptimizerWrapper::SGD(SGD::with_momentum(momentum)),
            OptimType::Adam => OptimizerWrapper::Adam(Adam::default()),
        }
    }

    pub fn kind(&self) -> OptimType {
        match self {
            OptimizerWrapper::SGD(_) => OptimType::Sgd,
            OptimizerWrapper::Adam(_) => OptimType::Adam,
        }
    }
}

impl Optimizer for OptimizerWrapper {
    fn begin_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.begin_step(),
        }
    }

    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_weights(slot, weights, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_weights(slot, weights, gradients, learning_rate),
        }
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_biases(slot, biases, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_biases(slot, biases, gradients, learning_rate),
        }
    }
}

/// Stochastic gradient descent with heavy-ball momentum: `v = μv + g; p -= lr·v`.
#[derive(Debug, Clone)]
pub struct SGD {
    pub momentum: f32,
    velocity_weights: HashMap<usize, Array2<f32>>,
    velocity_biases: HashMap<usize, Array1<f32>>,
}

impl SGD {
    pub fn with_momentum(momentum: f32) -> SGD {
        SGD {
            momentum,
            velocity_weights: HashMap::new(),
            velocity_biases: HashMap::new(),
        }
    }
}

fn momentum_step<D: Dimension>(
    velocity: &mut Array<f32, D>,
    params: &mut Array<f32, D>,
    gradients: &Array<f32, D>,
    momentum: f32,
    learning_rate: f32,
) {
    velocity.zip_mut_with(gradients, |v, &g| *v = momentum * *v + g);
    params.zip_mut_with(velocity, |p, &v| *p -= learning_rate * v);
}

impl Optimizer for SGD {
    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        if self.momentum == 0.0 {
            weights.zip_mut_with(gradients, |w, &g| *w -= learning_rate * g);
            return;
        }
        let velocity = moment_for(&mut self.velocity_weights, slot, weights.raw_dim());
        momentum_step(velocity, weights, gradients, self.momentum, learning_rate);
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        if self.momentum == 0.0 {
            biases.zip_mut_with(gradients, |b, &g| *b -= learning_rate * g);
            return;
        }
        let velocity = moment_for(&mut self.velocity_biases, slot, biases.raw_dim());
        momentum_step(velocity, biases, gradients, self.momentum, learning_rate);
    }
}

/// Adam with bias-corrected first and second moments.
#[derive(Debug, Clone)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub t: i32,
    m_weights: HashMap<usize, Array2<f32>>,
    v_weights: HashMap<usize, Array2<f32>>,
    m_biases: HashMap<usize, Array1<f32>>,
    v_biases: HashMap<usize, Array1<f32>>,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            t: 0,
            m_weights: HashMap::new(),
            v_weights: HashMap::new(),
            m_biases: HashMap::new(),
            v_biases: HashMap::new(),
        }
    }

    fn adam_step<D: Dimension>(
        &self,
        m: &mut Array<f32, D>,
        v: &mut Array<f32, D>,
        params: &mut Array<f32, D>,
        gradients: &Array<f32, D>,
        learning_rate: f32,
    ) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let t = self.t.max(1);
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);

        m.zip_mut_with(gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        ndarray::Zip::from(params)
            .and(&*m)
            .and(&*v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        let mut m = take_moment(&mut self.m_weights, slot, weights.raw_dim());
        let mut v = take_moment(&mut self.v_weights, slot, weights.raw_dim());
        self.adam_step(&mut m, &mut v, weights, gradients, learning_rate);
        self.m_weights.insert(slot, m);
        self.v_weights.insert(slot, v);
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        let mut m = take_moment(&mut self.m_biases, slot, biases.raw_dim());
        let mut v = take_moment(&mut self.v_biases, slot, biases.raw_dim());
        self.adam_step(&mut m, &mut v, biases, gradients, learning_rate);
        self.m_biases.insert(slot, m);
        self.v_biases.insert(slot, v);
    }
}

// Zeroed state for a slot seen for the first time, or whose shape changed.
fn moment_for<D: Dimension>(
    states: &mut HashMap<usize, Array<f32, D>>,
    slot: usize,
    dim: D,
) -> &mut Array<f32, D> {
    let state = states.entry(slot).or_insert_with(|| Array::zeros(dim.clone()));
    if state.raw_dim() != dim {
        *state = Array::zeros(dim);
    }
    state
}

fn take_moment<D: Dimension>(
    states: &mut HashMap<usize, Array<f32, D>>,
    slot: usize,
    dim: D,
) -> Array<f32, D> {
    match states.remove(&slot) {
        Some(state) if state.raw_dim() == dim => state,
        _ => Array::zeros(dim),
    }
}
