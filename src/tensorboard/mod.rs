//! Scalar and histogram logs for a training run.
//!
//! Events are appended to `scalars.csv` and `histograms.csv` under
//! `<log_dir>/<run_name>/`, one row per value, in a layout that plots directly
//! or converts to TensorBoard event files.

use std::fs::{File, create_dir_all};
use std::io::{Write, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::LayerView;

/// Tensorboard writer for logging metrics and model data
pub struct TensorboardWriter {
    log_dir: PathBuf,
    step: i64,
    start_time: u64,
    scalar_writer: BufWriter<File>,
    histogram_writer: BufWriter<File>,
}

impl TensorboardWriter {
    /// Create a writer; existing logs of the same run are truncated.
    pub fn new<P: AsRef<Path>>(log_dir: P, run_name: &str) -> std::io::Result<Self> {
        let log_path = log_dir.as_ref().join(run_name);
        create_dir_all(&log_path)?;

        let mut scalar_writer = BufWriter::new(File::create(log_path.join("scalars.csv"))?);
        let mut histogram_writer = BufWriter::new(File::create(log_path.join("histograms.csv"))?);

        writeln!(scalar_writer, "step,tag,value,wall_time")?;
        writeln!(histogram_writer, "step,tag,count,min,max,mean,std,wall_time")?;

        Ok(Self {
            log_dir: log_path,
            step: 0,
            start_time: unix_seconds(),
            scalar_writer,
            histogram_writer,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log a scalar value at the current step
    pub fn add_scalar(&mut self, tag: &str, value: f32) -> std::io::Result<()> {
        let wall_time = self.wall_time();
        writeln!(self.scalar_writer, "{},{},{},{}", self.step, tag, value, wall_time)
    }

    /// Log `main_tag/tag` for every pair
    pub fn add_scalars(&mut self, main_tag: &str, tag_scalar_dict: &[(String, f32)]) -> std::io::Result<()> {
        for (tag, value) in tag_scalar_dict {
            self.add_scalar(&format!("{}/{}", main_tag, tag), *value)?;
        }
        Ok(())
    }

    /// Log count, range, mean and standard deviation of `values`
    pub fn add_histogram<'a, I>(&mut self, tag: &str, values: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let values: Vec<f32> = values.into_iter().copied().collect();
        if values.is_empty() {
            return Ok(());
        }

        let count = values.len();
        let min = values.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mean = values.iter().sum::<f32>() / count as f32;
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / count as f32;
        let std = variance.sqrt();

        let wall_time = self.wall_time();
        writeln!(
            self.histogram_writer,
            "{},{},{},{},{},{},{},{}",
            self.step, tag, count, min, max, mean, std, wall_time
        )
    }

    /// Weight and bias distributions plus the weight norm of one layer
    pub fn add_layer_stats(&mut self, layer_name: &str, layer: LayerView<'_>) -> std::io::Result<()> {
        self.add_histogram(&format!("{}/weights", layer_name), layer.weights.iter())?;
        self.add_histogram(&format!("{}/biases", layer_name), layer.biases.iter())?;
        self.add_scalar(&format!("{}/weight_norm", layer_name), layer.weight_norm())
    }

    /// [`add_layer_stats`](Self::add_layer_stats) for every named layer
    pub fn add_parameter_stats(&mut self, layers: &[(String, LayerView<'_>)]) -> std::io::Result<()> {
        for (name, layer) in layers {
            self.add_layer_stats(name, *layer)?;
        }
        Ok(())
    }

    pub fn set_step(&mut self, step: i64) {
        self.step = step;
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    fn wall_time(&self) -> u64 {
        unix_seconds().saturating_sub(self.start_time)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.scalar_writer.flush()?;
        self.histogram_writer.flush()
    }
}

impl Drop for TensorboardWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use crate::model::LayerParams;
    use tempfile::tempdir;

    #[test]
    fn test_scalars_are_written_with_step() {
        let dir = tempdir().unwrap();
        {
            let mut writer = TensorboardWriter::new(dir.path(), "v1-Mlp").unwrap();
            writer.set_step(3);
            writer.add_scalar("train/loss", 0.25).unwrap();
            writer.add_scalars("val/accuracy", &[("Smiling".to_string(), 75.0)]).unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join("v1-Mlp").join("scalars.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,tag,value,wall_time");
        assert!(lines[1].starts_with("3,train/loss,0.25,"));
        assert!(lines[2].starts_with("3,val/accuracy/Smiling,75,"));
    }

    #[test]
    fn test_layer_stats() {
        let dir = tempdir().unwrap();
        let layer = LayerParams { weights: arr2(&[[3.0], [4.0]]), biases: arr1(&[0.0]) };
        {
            let mut writer = TensorboardWriter::new(dir.path(), "run").unwrap();
            writer.add_layer_stats("head.0", layer.view()).unwrap();
        }
        let scalars = std::fs::read_to_string(dir.path().join("run").join("scalars.csv")).unwrap();
        assert!(scalars.contains("0,head.0/weight_norm,5,"));
        let histograms = std::fs::read_to_string(dir.path().join("run").join("histograms.csv")).unwrap();
        assert!(histograms.contains("0,head.0/weights,2,3,4,3.5,0.5,"));
    }
}
