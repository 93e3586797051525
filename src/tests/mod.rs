pub mod test_layers;
pub mod test_metrics;
pub mod test_trainer;
