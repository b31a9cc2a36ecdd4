// ============================================================
// Layer 3 — Tasks, Class Labels and Predictions
// ============================================================
// Plain types shared by the trainer, the exported graph and
// the scorer. Nothing here knows how a model is built.
//
// Reference: Rust Book §6 (Enums and Pattern Matching)

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of model a domain trains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification,
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => write!(f, "classification"),
            Task::Regression     => write!(f, "regression"),
        }
    }
}

/// The ordered class labels of a classifier.
/// Class index `i` of a prediction refers to entry `i` here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassLabels {
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl ClassLabels {
    pub fn len(&self) -> usize {
        match self {
            ClassLabels::Int(v)  => v.len(),
            ClassLabels::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Printable form of class `index`
    pub fn label(&self, index: usize) -> String {
        match self {
            ClassLabels::Int(v)  => v[index].to_string(),
            ClassLabels::Text(v) => v[index].clone(),
        }
    }
}

/// Output of any predictor over a batch of feature rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// One probability vector per row, aligned with `classes`
    Classification {
        classes:       ClassLabels,
        probabilities: Vec<Vec<f64>>,
    },
    /// One value per row
    Regression(Vec<f64>),
}

impl Prediction {
    pub fn len(&self) -> usize {
        match self {
            Prediction::Classification { probabilities, .. } => probabilities.len(),
            Prediction::Regression(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Winning class index per row (first maximum wins ties).
    /// Empty for a regression prediction.
    pub fn class_indices(&self) -> Vec<usize> {
        match self {
            Prediction::Classification { probabilities, .. } => {
                probabilities.iter().map(|p| argmax(p)).collect()
            }
            Prediction::Regression(_) => Vec::new(),
        }
    }

    /// Printable prediction per row
    pub fn display_values(&self) -> Vec<String> {
        match self {
            Prediction::Classification { classes, .. } => self
                .class_indices()
                .into_iter()
                .map(|i| classes.label(i))
                .collect(),
            Prediction::Regression(v) => v.iter().map(|x| x.to_string()).collect(),
        }
    }
}

pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
