//! # Activation Functions Module
//!
//! Element-wise activations used by the backbone and the attribute heads.
//!
//! - **ReLU**: `max(0, x)` for hidden backbone layers
//! - **LeakyReLU**: ReLU with a small negative slope
//! - **Sigmoid**: `1 / (1 + e^(-x))`, turns each head's logit into a score in (0, 1)
//! - **Linear**: identity
//!
//! Activations work on whole batches (`[batch, units]`); the derivative is taken
//! with respect to the stored pre-activation values.

pub mod functions;

pub use functions::Activation;
