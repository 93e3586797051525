pub mod numerical_check;

pub use numerical_check::{check_parameters, ensure_finite_loss, NumericalIssue};
