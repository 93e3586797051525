use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use serde::Serialize;

use crate::attributes::{AttrMap, AttributeSet};
use crate::error::Result;
use crate::metrics::{ConfusionSummary, EvaluationReport};
use crate::trainer::{EpochRecord, RunHistory};

/// Writes the artifacts of one run as `<log_dir>/<run_name>-<file>`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    log_dir: PathBuf,
    run_name: String,
}

#[derive(Serialize)]
struct HistoryFile<'a> {
    run: &'a str,
    attributes: Vec<String>,
    epochs: &'a [EpochRecord],
}

impl ReportWriter {
    pub fn new<P: Into<PathBuf>>(log_dir: P, run_name: &str) -> Self {
        ReportWriter { log_dir: log_dir.into(), run_name: run_name.to_string() }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.log_dir.join(format!("{}-{}", self.run_name, file))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.path("best_model.pth")
    }

    fn create(&self, file: &str) -> Result<BufWriter<File>> {
        fs::create_dir_all(&self.log_dir)?;
        Ok(BufWriter::new(File::create(self.path(file))?))
    }

    /// `epoch,train_loss,train_loss_per_sample` per epoch.
    pub fn write_train_loss(&self, history: &RunHistory) -> Result<PathBuf> {
        let mut out = self.create("train_loss.csv")?;
        writeln!(out, "epoch,train_loss,train_loss_per_sample")?;
        for record in history.records() {
            writeln!(out, "{},{},{}", record.epoch, record.train_loss, record.train_loss_per_sample)?;
        }
        out.flush()?;
        Ok(self.path("train_loss.csv"))
    }

    /// Validation accuracy per attribute and epoch, plus the mean.
    pub fn write_eval_accuracy(&self, attributes: &AttributeSet, history: &RunHistory) -> Result<PathBuf> {
        let mut out = self.create("eval_accuracy.csv")?;
        writeln!(out, "epoch,{},mean", attributes.names().join(","))?;
        for record in history.records() {
            let row = record.accuracy.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(",");
            writeln!(out, "{},{},{}", record.epoch, row, record.mean_accuracy)?;
        }
        out.flush()?;
        Ok(self.path("eval_accuracy.csv"))
    }

    /// `attribute,accuracy` for one evaluation.
    pub fn write_accuracy(&self, file: &str, attributes: &AttributeSet, report: &EvaluationReport) -> Result<PathBuf> {
        let mut out = self.create(file)?;
        writeln!(out, "attribute,accuracy")?;
        for (name, accuracy) in attributes.named(&report.accuracy) {
            writeln!(out, "{},{}", name, accuracy)?;
        }
        writeln!(out, "mean,{}", report.mean_accuracy())?;
        out.flush()?;
        Ok(self.path(file))
    }

    /// Confusion counts and derived ratios per attribute.
    pub fn write_confusion(
        &self,
        file: &str,
        attributes: &AttributeSet,
        confusion: &AttrMap<ConfusionSummary>,
    ) -> Result<PathBuf> {
        let mut out = self.create(file)?;
        writeln!(out, "attribute,tp,fp,tn,fn,precision,recall,tpr,fpr,f1")?;
        for (name, summary) in attributes.named(confusion) {
            let c = &summary.counts;
            let d = &summary.derived;
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{}",
                name, c.tp, c.fp, c.tn, c.fn_, d.precision, d.recall, d.tpr, d.fpr, d.f1
            )?;
        }
        out.flush()?;
        Ok(self.path(file))
    }

    pub fn write_history(&self, attributes: &AttributeSet, history: &RunHistory) -> Result<PathBuf> {
        let file = HistoryFile {
            run: &self.run_name,
            attributes: attributes.names(),
            epochs: history.records(),
        };
        let mut out = self.create("history.json")?;
        serde_json::to_writer_pretty(&mut out, &file)?;
        out.flush()?;
        Ok(self.path("history.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ConfusionStats;
    use tempfile::tempdir;

    #[test]
    fn test_confusion_table_writes_undefined() {
        let dir = tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "v1-Mlp");
        let attributes = AttributeSet::new(&["Smiling", "Male"]).unwrap();
        let confusion = AttrMap::from_vec(vec![
            ConfusionSummary::from(ConfusionStats { tp: 0, fp: 0, tn: 3, fn_: 1 }),
            ConfusionSummary::from(ConfusionStats { tp: 2, fp: 0, tn: 2, fn_: 0 }),
        ]);
        let path = writer.write_confusion("eval_confusion_matrix.csv", &attributes, &confusion).unwrap();
        assert_eq!(path, dir.path().join("v1-Mlp-eval_confusion_matrix.csv"));

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "attribute,tp,fp,tn,fn,precision,recall,tpr,fpr,f1");
        assert_eq!(lines[1], "Smiling,0,0,3,1,undefined,0.0000,0.0000,0.0000,undefined");
        assert_eq!(lines[2], "Male,2,0,2,0,1.0000,1.0000,1.0000,0.0000,1.0000");
    }

    #[test]
    fn test_checkpoint_path_uses_run_prefix() {
        let writer = ReportWriter::new("logs", "v2-DeepMlp");
        assert_eq!(writer.checkpoint_path(), PathBuf::from("logs/v2-DeepMlp-best_model.pth"));
    }
}
