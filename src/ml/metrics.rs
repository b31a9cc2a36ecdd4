// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Scores a fitted model on the held-out test partition.
//
// Classification:
//   accuracy   = correct / total
//   confusion  = counts[true class][predicted class]
//   precision  = TP / (TP + FP)    per class
//   recall     = TP / (TP + FN)    per class
//   f1         = 2·P·R / (P + R)   per class
//
// Regression:
//   MAE  = mean |y - ŷ|
//   MSE  = mean (y - ŷ)²
//   RMSE = √MSE
//   R²   = 1 - SS_res / SS_tot
//
// Any ratio with a zero denominator is reported as 0.0, except
// R² on a constant truth: 1.0 for a perfect prediction, else 0.0.
//
// Reference: Rust Book §13 (Iterators)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::prediction::ClassLabels;

/// Fraction of positions where `truth` and `pred` agree
pub fn accuracy(truth: &[usize], pred: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(pred).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

pub fn mae(truth: &[f64], pred: &[f64]) -> f64 {
    mean(truth.iter().zip(pred).map(|(t, p)| (t - p).abs()), truth.len())
}

pub fn mse(truth: &[f64], pred: &[f64]) -> f64 {
    mean(truth.iter().zip(pred).map(|(t, p)| (t - p) * (t - p)), truth.len())
}

pub fn rmse(truth: &[f64], pred: &[f64]) -> f64 {
    mse(truth, pred).sqrt()
}

/// Coefficient of determination
pub fn r2_score(truth: &[f64], pred: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let m = mean(truth.iter().copied(), truth.len());
    let ss_tot: f64 = truth.iter().map(|t| (t - m) * (t - m)).sum();
    let ss_res: f64 = truth.iter().zip(pred).map(|(t, p)| (t - p) * (t - p)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

// ─── Confusion Matrix ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Printable class names, indexed like the counts
    pub labels: Vec<String>,

    /// counts[t][p] = rows of true class t predicted as class p
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(classes: &ClassLabels, truth: &[usize], pred: &[usize]) -> Self {
        let k = classes.len();
        let mut counts = vec![vec![0; k]; k];
        for (&t, &p) in truth.iter().zip(pred) {
            counts[t][p] += 1;
        }
        Self {
            labels: (0..k).map(|i| classes.label(i)).collect(),
            counts,
        }
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts[class][class]
    }

    /// Rows whose true class is `class`
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Rows predicted as `class`
    pub fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.predicted(class))
    }

    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.support(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    /// Per-class precision / recall / F1 / support table
    pub fn report(&self) -> ClassificationReport<'_> {
        ClassificationReport(self)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain(self.counts.iter().flatten().map(|c| c.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        write!(f, "{:>width$}", "")?;
        for label in &self.labels {
            write!(f, " {label:>width$}")?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{label:>width$}")?;
            for c in row {
                write!(f, " {c:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Display adapter for the per-class report of a confusion matrix
pub struct ClassificationReport<'a>(&'a ConfusionMatrix);

impl fmt::Display for ClassificationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cm = self.0;
        let width = cm.labels.iter().map(String::len).max().unwrap_or(0).max(5);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "class", "precision", "recall", "f1-score", "support"
        )?;
        for i in 0..cm.n_classes() {
            writeln!(
                f,
                "{:>width$} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                cm.labels[i],
                cm.precision(i),
                cm.recall(i),
                cm.f1(i),
                cm.support(i)
            )?;
        }
        Ok(())
    }
}

// ─── Evaluation Summary ───────────────────────────────────────────────────────
/// Test-partition scores of one trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Evaluation {
    Classification {
        /// Fraction of test rows classified correctly, in [0, 1]
        accuracy:  f64,
        confusion: ConfusionMatrix,
    },
    Regression {
        /// At most 1.0; negative when worse than predicting the mean
        r2:   f64,
        mae:  f64,
        rmse: f64,
    },
}

impl Evaluation {
    pub fn classification(classes: &ClassLabels, truth: &[usize], pred: &[usize]) -> Self {
        Evaluation::Classification {
            accuracy:  accuracy(truth, pred),
            confusion: ConfusionMatrix::new(classes, truth, pred),
        }
    }

    pub fn regression(truth: &[f64], pred: &[f64]) -> Self {
        Evaluation::Regression {
            r2:   r2_score(truth, pred),
            mae:  mae(truth, pred),
            rmse: rmse(truth, pred),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Classification { accuracy, confusion } => {
                writeln!(f, "Accuracy: {accuracy:.4}")?;
                writeln!(f)?;
                write!(f, "{}", confusion.report())?;
                writeln!(f)?;
                writeln!(f, "Confusion matrix (rows = true, columns = predicted):")?;
                write!(f, "{confusion}")
            }
            Evaluation::Regression { r2, mae, rmse } => {
                writeln!(f, "R2 Score: {r2:.4}")?;
                writeln!(f, "MAE: {mae:.4}")?;
                writeln!(f, "RMSE: {rmse:.4}")
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_regression_errors() {
        let t = [1.0, 2.0, 3.0];
        let p = [1.0, 2.0, 5.0];
        assert!((mae(&t, &p) - 2.0 / 3.0).abs() < 1e-12);
        assert!((mse(&t, &p) - 4.0 / 3.0).abs() < 1e-12);
        assert!((rmse(&t, &p) - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_r2_perfect_and_mean() {
        let t = [1.0, 2.0, 3.0];
        assert_eq!(r2_score(&t, &t), 1.0);
        assert_eq!(r2_score(&t, &[2.0, 2.0, 2.0]), 0.0);
        assert!(r2_score(&t, &[3.0, 2.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_r2_constant_truth() {
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&[5.0, 5.0], &[4.0, 5.0]), 0.0);
    }

    #[test]
    fn test_confusion_matrix_and_report() {
        let classes = ClassLabels::Int(vec![0, 1]);
        let cm = ConfusionMatrix::new(&classes, &[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0]);
        assert_eq!(cm.counts, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(cm.support(1), 3);
        assert!((cm.precision(1) - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall(0) - 0.5).abs() < 1e-12);

        let text = cm.report().to_string();
        assert!(text.contains("precision"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_class_never_predicted_has_zero_precision() {
        let classes = ClassLabels::Text(vec!["a".into(), "b".into()]);
        let cm = ConfusionMatrix::new(&classes, &[0, 1], &[0, 0]);
        assert_eq!(cm.precision(1), 0.0);
        assert_eq!(cm.f1(1), 0.0);
    }

    #[test]
    fn test_evaluation_display() {
        let e = Evaluation::regression(&[1.0, 2.0], &[1.0, 2.0]);
        assert!(e.to_string().starts_with("R2 Score: 1.0000"));

        let c = Evaluation::classification(&ClassLabels::Int(vec![0, 1]), &[0, 1], &[0, 1]);
        assert!(c.to_string().starts_with("Accuracy: 1.0000"));
    }
}
