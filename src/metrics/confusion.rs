use std::fmt;
use serde::{Serialize, Serializer};

/// A ratio that may have a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Value(f32),
    Undefined,
}

impl Metric {
    pub fn ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Metric::Undefined
        } else {
            Metric::Value(numerator as f32 / denominator as f32)
        }
    }

    pub fn value(&self) -> Option<f32> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Metric::Undefined)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => write!(f, "{:.4}", v),
            Metric::Undefined => f.write_str("undefined"),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => serializer.serialize_f32(*v),
            Metric::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

/// Binary confusion counts for one attribute over one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionStats {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl ConfusionStats {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fn_ += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn correct(&self) -> u64 {
        self.tp + self.tn
    }

    pub fn derive(&self) -> DerivedMetrics {
        let precision = Metric::ratio(self.tp, self.tp + self.fp);
        let recall = Metric::ratio(self.tp, self.tp + self.fn_);
        let fpr = Metric::ratio(self.fp, self.fp + self.tn);
        let f1 = match (precision, recall) {
            (Metric::Value(p), Metric::Value(r)) if p + r > 0.0 => Metric::Value(2.0 * p * r / (p + r)),
            _ => Metric::Undefined,
        };
        DerivedMetrics { precision, recall, tpr: recall, fpr, f1 }
    }
}

/// Ratios computed once from the final counts of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub precision: Metric,
    pub recall: Metric,
    pub tpr: Metric,
    pub fpr: Metric,
    pub f1: Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfusionSummary {
    #[serde(flatten)]
    pub counts: ConfusionStats,
    #[serde(flatten)]
    pub derived: DerivedMetrics,
}

impl From<ConfusionStats> for ConfusionSummary {
    fn from(counts: ConfusionStats) -> Self {
        ConfusionSummary { counts, derived: counts.derive() }
    }
}
