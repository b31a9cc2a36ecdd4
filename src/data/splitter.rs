// ============================================================
// Layer 4 — Train/Test Splitter
// ============================================================
// Turns a prepared table into model-ready partitions:
//
//   1. take the target column out of the table
//   2. keep every other numeric column, minus identifier columns
//   3. shuffle the row order with a seeded RNG
//   4. cut off ceil(n * test_fraction) rows as the test set
//   5. fit a StandardScaler on the training rows only and
//      apply it to both partitions
//
// The seed comes from the pipeline config, so two runs over the
// same table produce the same partitions and the same values.
// There is no stratification: class balance can differ between
// the two partitions.
//
// Feature order is the table's column order at step 2. That
// order is recorded in the metadata file and is the order the
// exported model expects its inputs in.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::application::train_use_case::PipelineConfig;
use crate::data::scaler::StandardScaler;
use crate::domain::fleet::IDENTIFIER_COLUMNS;
use crate::domain::table::{Column, Table};

/// The label column of a split, typed after the table column it came from
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Numeric(Vec<f64>),
    Labels(Vec<Option<String>>),
}

impl Target {
    pub fn len(&self) -> usize {
        match self {
            Target::Numeric(v) => v.len(),
            Target::Labels(v)  => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, indices: &[usize]) -> Target {
        match self {
            Target::Numeric(v) => Target::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Target::Labels(v)  => Target::Labels(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// Everything a trainer needs from one table
#[derive(Debug, Clone)]
pub struct Splits {
    pub train_features: Vec<Vec<f32>>,
    pub test_features:  Vec<Vec<f32>>,
    pub train_target:   Target,
    pub test_target:    Target,
    pub scaler:         StandardScaler,
    pub feature_names:  Vec<String>,
}

/// Split `table` into scaled train/test partitions around `target_col`.
pub fn prepare_splits(table: &Table, target_col: &str, config: &PipelineConfig) -> Result<Splits> {
    let target = match table.column(target_col) {
        Some(Column::Numeric(v)) => Target::Numeric(v.clone()),
        Some(Column::Text(v))    => Target::Labels(v.clone()),
        Some(Column::Date(_))    => bail!("Target column '{}' holds dates", target_col),
        None => bail!(
            "Target column '{}' not found (columns: {})",
            target_col,
            table.column_names().join(", ")
        ),
    };

    let (feature_names, rows) = feature_matrix(table, target_col);
    if feature_names.is_empty() {
        bail!("No numeric feature columns left besides '{}'", target_col);
    }

    let indices: Vec<usize> = (0..table.n_rows()).collect();
    let (train_idx, test_idx) = split_train_test(indices, config.test_fraction, config.seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        bail!(
            "Cannot split {} rows with test fraction {}: one partition would be empty",
            table.n_rows(),
            config.test_fraction
        );
    }

    let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
    let test_rows:  Vec<Vec<f64>> = test_idx.iter().map(|&i| rows[i].clone()).collect();

    let scaler = StandardScaler::fit(&train_rows, feature_names.len());
    let train_features = scaler.transform(&train_rows).context("Scaling training rows")?;
    let test_features  = scaler.transform(&test_rows).context("Scaling test rows")?;

    tracing::info!(
        "Split '{}': {} features, {} train rows, {} test rows",
        target_col,
        feature_names.len(),
        train_features.len(),
        test_features.len()
    );

    Ok(Splits {
        train_features,
        test_features,
        train_target: target.take(&train_idx),
        test_target:  target.take(&test_idx),
        scaler,
        feature_names,
    })
}

/// Numeric columns other than the target and identifiers, in table order,
/// as row-major values.
pub fn feature_matrix(table: &Table, target_col: &str) -> (Vec<String>, Vec<Vec<f64>>) {
    let selected: Vec<(&str, &[f64])> = table
        .iter()
        .filter(|(name, _)| *name != target_col && !IDENTIFIER_COLUMNS.contains(name))
        .filter_map(|(name, col)| col.as_numeric().map(|v| (name, v)))
        .collect();

    let names = selected.iter().map(|(n, _)| n.to_string()).collect();
    let rows = (0..table.n_rows())
        .map(|i| selected.iter().map(|(_, v)| v[i]).collect())
        .collect();
    (names, rows)
}

/// Shuffle `samples` with a seeded RNG and split into (train, test).
///
/// The test side gets `ceil(len * test_fraction)` items, clamped to
/// the number of samples.
pub fn split_train_test<T>(mut samples: Vec<T>, test_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total  = samples.len();
    let n_test = ((total as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.min(total);

    // split_off(n) leaves [0..n) in `samples` and returns [n..total)
    let test = samples.split_off(total - n_test);

    tracing::debug!(
        "Dataset split: {} training, {} test ({}% / {}%)",
        samples.len(),
        test.len(),
        (samples.len() * 100) / total.max(1),
        (test.len() * 100) / total.max(1),
    );

    (samples, test)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn table(n: usize) -> Table {
        let mut t = Table::new();
        t.insert("Vehicle_ID", Column::Numeric((0..n).map(|i| i as f64).collect())).unwrap();
        t.insert("Mileage", Column::Numeric((0..n).map(|i| (i * 100) as f64).collect())).unwrap();
        t.insert("Model", Column::Text(vec![Some("a".into()); n])).unwrap();
        t.insert("Vehicle_Age", Column::Numeric((0..n).map(|i| (i % 7) as f64).collect())).unwrap();
        t.insert("Need_Maintenance", Column::Numeric((0..n).map(|i| (i % 2) as f64).collect())).unwrap();
        t
    }

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, test) = split_train_test(items, 0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
    }

    #[test]
    fn test_test_side_rounds_up() {
        let items: Vec<usize> = (0..11).collect();
        let (train, test) = split_train_test(items, 0.2, 42);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, test) = split_train_test(items, 0.3, 7);
        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dataset() {
        let (train, test) = split_train_test(Vec::<usize>::new(), 0.2, 42);
        assert!(train.is_empty());
        assert!(test.is_empty());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_train_test((0..40).collect::<Vec<usize>>(), 0.2, 42);
        let b = split_train_test((0..40).collect::<Vec<usize>>(), 0.2, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_features_exclude_target_ids_and_text() {
        let s = prepare_splits(&table(30), "Need_Maintenance", &config()).unwrap();
        assert_eq!(s.feature_names, vec!["Mileage", "Vehicle_Age"]);
        assert_eq!(s.train_features[0].len(), 2);
    }

    #[test]
    fn test_partition_sizes_add_up() {
        let s = prepare_splits(&table(57), "Need_Maintenance", &config()).unwrap();
        assert_eq!(s.train_features.len() + s.test_features.len(), 57);
        assert_eq!(s.test_features.len(), 12);
        assert_eq!(s.train_target.len(), s.train_features.len());
        assert_eq!(s.test_target.len(), s.test_features.len());
    }

    #[test]
    fn test_prepare_splits_is_deterministic() {
        let t = table(40);
        let a = prepare_splits(&t, "Need_Maintenance", &config()).unwrap();
        let b = prepare_splits(&t, "Need_Maintenance", &config()).unwrap();
        assert_eq!(a.train_features, b.train_features);
        assert_eq!(a.test_features, b.test_features);
        assert_eq!(a.train_target, b.train_target);
        assert_eq!(a.scaler, b.scaler);
    }

    #[test]
    fn test_scaler_fit_on_train_only() {
        let s = prepare_splits(&table(40), "Need_Maintenance", &config()).unwrap();
        let n = s.train_features.len() as f32;
        let mean: f32 = s.train_features.iter().map(|r| r[0]).sum::<f32>() / n;
        assert!(mean.abs() < 1e-4);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let err = prepare_splits(&table(10), "Nope", &config()).unwrap_err();
        assert!(err.to_string().contains("Target column 'Nope' not found"));
    }

    #[test]
    fn test_single_row_cannot_be_split() {
        assert!(prepare_splits(&table(1), "Need_Maintenance", &config()).is_err());
    }
}
