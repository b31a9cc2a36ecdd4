// ============================================================
// Layer 4 — Standard Scaler
// ============================================================
// Rescales every feature to zero mean and unit variance:
//
//   z = (x - mean) * (1 / std)
//
// The statistics are fit on the training partition only and
// then applied unchanged to any other rows, so nothing about
// the test partition leaks into training.
//
// Details:
//   - std is the population standard deviation (divide by n)
//   - non-finite values are left out of the statistics and pass
//     through the transform as they are
//   - a feature with zero variance gets scale 1.0, which turns it
//     into a constant 0 column
//
// The transform is evaluated in f32, in exactly the form the
// exported graph's Scaler node uses, so a row scored by the
// exported model sees the same numbers the forest was fit on.
//
// Reference: Rust Book §13 (Iterators)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std:  Vec<f64>,
}

impl StandardScaler {
    /// Fit per-feature statistics on row-major `rows`
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Self {
        let mut mean = vec![0.0; n_features];
        let mut std  = vec![0.0; n_features];

        for j in 0..n_features {
            let finite: Vec<f64> = rows
                .iter()
                .map(|r| r[j])
                .filter(|v| v.is_finite())
                .collect();
            if finite.is_empty() {
                continue;
            }
            let n = finite.len() as f64;
            let m = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
            mean[j] = m;
            std[j]  = var.sqrt();
        }

        Self { mean, std }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Offsets as stored in the exported graph
    pub fn offsets(&self) -> Vec<f32> {
        self.mean.iter().map(|m| *m as f32).collect()
    }

    /// Multipliers as stored in the exported graph
    pub fn scales(&self) -> Vec<f32> {
        self.std
            .iter()
            .map(|s| {
                let inv = (1.0 / s) as f32;
                if *s > 0.0 && inv.is_finite() { inv } else { 1.0 }
            })
            .collect()
    }

    /// Standardize rows into f32 feature vectors
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
        let offsets = self.offsets();
        let scales  = self.scales();
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != offsets.len() {
                    bail!(
                        "Row {} has {} features, scaler was fit on {}",
                        i,
                        row.len(),
                        offsets.len()
                    );
                }
                Ok(row
                    .iter()
                    .zip(offsets.iter().zip(scales.iter()))
                    .map(|(x, (o, s))| standardize(*x as f32, *o, *s))
                    .collect())
            })
            .collect()
    }
}

/// One scaled value, as the Scaler operator computes it.
/// Scales are always positive, so ±inf and NaN keep their value.
pub fn standardize(x: f32, offset: f32, scale: f32) -> f32 {
    (x - offset) * scale
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_population_stats() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let s = StandardScaler::fit(&rows, 2);
        assert_eq!(s.mean(), &[2.0, 10.0]);
        assert_eq!(s.std(), &[1.0, 0.0]);
    }

    #[test]
    fn test_transform_zero_mean_unit_variance() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let s = StandardScaler::fit(&rows, 1);
        let z: Vec<f32> = s.transform(&rows).unwrap().into_iter().map(|r| r[0]).collect();
        let mean: f32 = z.iter().sum::<f32>() / 4.0;
        let var: f32  = z.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_feature_becomes_zero() {
        let rows = vec![vec![5.0], vec![5.0]];
        let s = StandardScaler::fit(&rows, 1);
        assert_eq!(s.transform(&rows).unwrap(), vec![vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_non_finite_passes_through() {
        let rows = vec![vec![1.0], vec![3.0], vec![f64::INFINITY]];
        let s = StandardScaler::fit(&rows, 1);
        assert_eq!(s.mean(), &[2.0]);
        let z = s.transform(&rows).unwrap();
        assert_eq!(z[2][0], f32::INFINITY);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let s = StandardScaler::fit(&[vec![1.0, 2.0]], 2);
        assert!(s.transform(&[vec![1.0]]).is_err());
    }
}
