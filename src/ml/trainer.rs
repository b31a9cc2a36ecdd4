// ============================================================
// Layer 5 — Trainer
// ============================================================
// Fits one random forest on prepared splits and scores it on
// the held-out partition:
//
//   classification:
//     1. collect the class labels of both partitions
//     2. map every target to its class index
//     3. fit a RandomForestClassifier on the training rows
//     4. accuracy, per-class report, confusion matrix on test
//
//   regression:
//     1. fit a RandomForestRegressor on the training rows
//     2. R², MAE, RMSE on test
//
// A numeric classification target becomes integer class labels
// when every value is a whole number. Anything else (fractions,
// missing targets) cannot name a class and is rejected.
//
// Reference: Rust Book §6 (Enums), §9 (Error Handling)

use anyhow::{bail, Result};
use std::collections::BTreeSet;

use crate::data::scaler::StandardScaler;
use crate::data::splitter::{Splits, Target};
use crate::domain::prediction::{ClassLabels, Task};
use crate::domain::traits::Predictor;
use crate::infra::onnx::{self, ModelProto};
use crate::ml::forest::{ForestParams, RandomForestClassifier, RandomForestRegressor};
use crate::ml::metrics::Evaluation;

/// How many importances the console report lists
pub const TOP_IMPORTANCES: usize = 10;

/// A fitted forest of either kind
#[derive(Debug, Clone)]
pub enum TrainedModel {
    Classifier(RandomForestClassifier),
    Regressor(RandomForestRegressor),
}

impl TrainedModel {
    pub fn task(&self) -> Task {
        match self {
            TrainedModel::Classifier(_) => Task::Classification,
            TrainedModel::Regressor(_)  => Task::Regression,
        }
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        match self {
            TrainedModel::Classifier(m) => m.feature_importances(),
            TrainedModel::Regressor(m)  => m.feature_importances(),
        }
    }

    /// Export graph taking unscaled rows in `feature_names` order
    pub fn to_onnx(&self, scaler: &StandardScaler, feature_names: &[String], name: &str) -> Result<ModelProto> {
        match self {
            TrainedModel::Classifier(m) => onnx::export_classifier(m, scaler, feature_names, name),
            TrainedModel::Regressor(m)  => onnx::export_regressor(m, scaler, feature_names, name),
        }
    }
}

/// Everything one training run produced
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model:       TrainedModel,
    pub evaluation:  Evaluation,
    /// (feature, importance), most important first
    pub importances: Vec<(String, f64)>,
}

impl TrainOutcome {
    pub fn top_importances(&self) -> &[(String, f64)] {
        &self.importances[..self.importances.len().min(TOP_IMPORTANCES)]
    }

    /// Print metrics and the top feature importances
    pub fn print_report(&self) {
        print!("{}", self.evaluation);
        println!();
        println!("Top {} feature importances:", self.top_importances().len());
        let width = self.top_importances().iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, value) in self.top_importances() {
            println!("  {name:<width$}  {value:.4}");
        }
    }
}

/// Fit the forest `task` calls for on `splits` and evaluate it.
pub fn fit_and_evaluate(task: Task, splits: &Splits, params: ForestParams) -> Result<TrainOutcome> {
    let (model, evaluation) = match task {
        Task::Classification => {
            let classes = class_labels(&splits.train_target, &splits.test_target)?;
            let y_train = class_indices(&classes, &splits.train_target)?;
            let y_test  = class_indices(&classes, &splits.test_target)?;
            tracing::info!("Training classifier on {} classes", classes.len());

            let forest = RandomForestClassifier::fit(&splits.train_features, &y_train, classes.clone(), params)?;
            let pred   = forest.predict(&splits.test_features)?.class_indices();
            let eval   = Evaluation::classification(&classes, &y_test, &pred);
            (TrainedModel::Classifier(forest), eval)
        }
        Task::Regression => {
            let y_train = numeric_target(&splits.train_target)?;
            let y_test  = numeric_target(&splits.test_target)?;

            let forest = RandomForestRegressor::fit(&splits.train_features, y_train, params)?;
            let pred   = forest.predict_values(&splits.test_features);
            let eval   = Evaluation::regression(y_test, &pred);
            (TrainedModel::Regressor(forest), eval)
        }
    };

    let mut importances: Vec<(String, f64)> = splits
        .feature_names
        .iter()
        .cloned()
        .zip(model.feature_importances())
        .collect();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(TrainOutcome { model, evaluation, importances })
}

/// Sorted distinct labels over both partitions
pub fn class_labels(train: &Target, test: &Target) -> Result<ClassLabels> {
    match (train, test) {
        (Target::Numeric(a), Target::Numeric(b)) => {
            let mut seen = BTreeSet::new();
            for &v in a.iter().chain(b) {
                seen.insert(integral_label(v)?);
            }
            Ok(ClassLabels::Int(seen.into_iter().collect()))
        }
        (Target::Labels(a), Target::Labels(b)) => {
            let mut seen = BTreeSet::new();
            for v in a.iter().chain(b) {
                match v {
                    Some(label) => seen.insert(label.clone()),
                    None => bail!("Classification target has missing values"),
                };
            }
            Ok(ClassLabels::Text(seen.into_iter().collect()))
        }
        _ => bail!("Train and test targets have different types"),
    }
}

/// Class index of every target value
pub fn class_indices(classes: &ClassLabels, target: &Target) -> Result<Vec<usize>> {
    let lookup = |found: Option<usize>, shown: &dyn std::fmt::Display| -> Result<usize> {
        match found {
            Some(i) => Ok(i),
            None => bail!("Target value '{}' is not a known class", shown),
        }
    };
    match (classes, target) {
        (ClassLabels::Int(labels), Target::Numeric(values)) => values
            .iter()
            .map(|&v| {
                let label = integral_label(v)?;
                lookup(labels.binary_search(&label).ok(), &label)
            })
            .collect(),
        (ClassLabels::Text(labels), Target::Labels(values)) => values
            .iter()
            .map(|v| match v {
                Some(label) => lookup(labels.binary_search(label).ok(), label),
                None => bail!("Classification target has missing values"),
            })
            .collect(),
        _ => bail!("Class labels and target have different types"),
    }
}

fn integral_label(v: f64) -> Result<i64> {
    if v.is_nan() {
        bail!("Classification target has missing values");
    }
    if !v.is_finite() || v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        bail!("Classification target value {} is not a whole number", v);
    }
    Ok(v as i64)
}

fn numeric_target(target: &Target) -> Result<&[f64]> {
    match target {
        Target::Numeric(v) => Ok(v.as_slice()),
        Target::Labels(_) => bail!("Regression target must be numeric"),
    }
}
