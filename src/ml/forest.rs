// ============================================================
// Layer 5 — Random Forests
// ============================================================
// Bagged ensembles of CART trees:
//
//   for each of n_estimators trees:
//     draw a bootstrap sample (n rows, with replacement)
//     grow a fully developed tree on it, looking at a random
//     subset of features at every split
//
//   classifier: average the trees' class-probability vectors,
//               predict the class with the highest mean
//   regressor:  average the trees' leaf means
//
// Randomness comes from one master StdRng seeded from the
// config seed; each tree gets its own child RNG drawn from it,
// so a fixed seed gives the same forest on every run.
//
// Reference: Breiman (2001) Random Forests
//            rand crate documentation

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::prediction::{ClassLabels, Prediction};
use crate::domain::traits::Predictor;
use crate::ml::tree::{DecisionTree, MaxFeatures, TreeParams, TreeTarget};

/// Settings shared by both forest kinds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth:    Option<usize>,
    pub seed:         u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth:    None,
            seed:         42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    params:     ForestParams,
    classes:    ClassLabels,
    trees:      Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForestClassifier {
    /// Fit on rows `x` with class indices `y` into `classes`
    pub fn fit(x: &[Vec<f32>], y: &[usize], classes: ClassLabels, params: ForestParams) -> Result<Self> {
        check_shapes(x, y.len(), params)?;
        if classes.is_empty() {
            bail!("Cannot fit a classifier without classes");
        }
        if let Some(bad) = y.iter().find(|&&c| c >= classes.len()) {
            bail!("Class index {} out of range for {} classes", bad, classes.len());
        }

        let tree_params = TreeParams {
            max_depth:    params.max_depth,
            max_features: MaxFeatures::Sqrt,
            ..TreeParams::default()
        };
        let target = TreeTarget::Classes { y, n_classes: classes.len() };
        let trees  = grow_trees(x, target, &tree_params, params);

        tracing::info!(
            "Fitted random forest classifier: {} trees, {} classes, max depth {}",
            trees.len(),
            classes.len(),
            trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
        );
        Ok(Self { params, classes, trees, n_features: x[0].len() })
    }

    pub fn classes(&self) -> &ClassLabels {
        &self.classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Mean class-probability vector per row
    pub fn predict_proba(&self, rows: &[Vec<f32>]) -> Vec<Vec<f64>> {
        let n_classes = self.classes.len();
        let n_trees   = self.trees.len() as f64;
        rows.iter()
            .map(|row| {
                let mut acc = vec![0.0; n_classes];
                for tree in &self.trees {
                    for (a, p) in acc.iter_mut().zip(tree.predict_row(row)) {
                        *a += p;
                    }
                }
                acc.iter_mut().for_each(|a| *a /= n_trees);
                acc
            })
            .collect()
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        feature_importances(&self.trees, self.n_features)
    }
}

impl Predictor for RandomForestClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Result<Prediction> {
        check_width(rows, self.n_features)?;
        Ok(Prediction::Classification {
            classes:       self.classes.clone(),
            probabilities: self.predict_proba(rows),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    params:     ForestParams,
    trees:      Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForestRegressor {
    pub fn fit(x: &[Vec<f32>], y: &[f64], params: ForestParams) -> Result<Self> {
        check_shapes(x, y.len(), params)?;
        if y.iter().any(|v| !v.is_finite()) {
            bail!("Regression target contains missing or non-finite values");
        }

        let tree_params = TreeParams {
            max_depth:    params.max_depth,
            max_features: MaxFeatures::All,
            ..TreeParams::default()
        };
        let trees = grow_trees(x, TreeTarget::Values(y), &tree_params, params);

        tracing::info!(
            "Fitted random forest regressor: {} trees, max depth {}",
            trees.len(),
            trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
        );
        Ok(Self { params, trees, n_features: x[0].len() })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub fn predict_values(&self, rows: &[Vec<f32>]) -> Vec<f64> {
        let n_trees = self.trees.len() as f64;
        rows.iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)[0]).sum::<f64>() / n_trees)
            .collect()
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        feature_importances(&self.trees, self.n_features)
    }
}

impl Predictor for RandomForestRegressor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Result<Prediction> {
        check_width(rows, self.n_features)?;
        Ok(Prediction::Regression(self.predict_values(rows)))
    }
}

fn grow_trees(
    x:           &[Vec<f32>],
    target:      TreeTarget<'_>,
    tree_params: &TreeParams,
    params:      ForestParams,
) -> Vec<DecisionTree> {
    let n = x.len();
    let mut master = StdRng::seed_from_u64(params.seed);

    (0..params.n_estimators)
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let tree = DecisionTree::fit(x, target, sample, tree_params, &mut rng);
            tracing::debug!("Tree {}: {} nodes, depth {}", i, tree.nodes().len(), tree.depth());
            tree
        })
        .collect()
}

/// Mean over trees of each tree's normalized impurity decrease,
/// renormalized to sum to 1 (all zeros when no tree ever split).
fn feature_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut total = vec![0.0; n_features];
    for tree in trees {
        let decrease = tree.impurity_decrease();
        let sum: f64 = decrease.iter().sum();
        if sum > 0.0 {
            for (t, d) in total.iter_mut().zip(decrease) {
                *t += d / sum;
            }
        }
    }
    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        total.iter_mut().for_each(|t| *t /= sum);
    }
    total
}

fn check_shapes(x: &[Vec<f32>], n_targets: usize, params: ForestParams) -> Result<()> {
    if x.is_empty() {
        bail!("Cannot fit a forest on zero rows");
    }
    if x.len() != n_targets {
        bail!("{} feature rows but {} targets", x.len(), n_targets);
    }
    if params.n_estimators == 0 {
        bail!("A forest needs at least one tree");
    }
    check_width(x, x[0].len())
}

fn check_width(rows: &[Vec<f32>], n_features: usize) -> Result<()> {
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_features) {
        bail!("Row {} has {} features, model expects {}", i, row.len(), n_features);
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: usize) -> ForestParams {
        ForestParams { n_estimators: n, ..ForestParams::default() }
    }

    // Two well separated blobs plus a noise feature
    fn blobs() -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let noise = (i % 5) as f32;
            if i < 20 {
                x.push(vec![i as f32 * 0.1, noise]);
                y.push(0);
            } else {
                x.push(vec![10.0 + i as f32 * 0.1, noise]);
                y.push(1);
            }
        }
        (x, y)
    }

    #[test]
    fn test_classifier_separates_blobs() {
        let (x, y) = blobs();
        let rf = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(20)).unwrap();
        assert_eq!(rf.trees().len(), 20);

        let pred = rf.predict(&x).unwrap();
        assert_eq!(pred.class_indices(), y);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs();
        let rf = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(10)).unwrap();
        for p in rf.predict_proba(&x) {
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs();
        let a = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(5)).unwrap();
        let b = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(5)).unwrap();
        assert_eq!(a.trees(), b.trees());
    }

    #[test]
    fn test_importances_favor_signal() {
        let (x, y) = blobs();
        let rf = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(30)).unwrap();
        let imp = rf.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_regressor_tracks_linear_target() {
        let x: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32]).collect();
        let y: Vec<f64> = (0..50).map(|i| 2.0 * i as f64 + 1.0).collect();
        let rf = RandomForestRegressor::fit(&x, &y, params(25)).unwrap();
        let pred = rf.predict_values(&[vec![25.0]]);
        assert!((pred[0] - 51.0).abs() < 5.0, "got {}", pred[0]);
    }

    #[test]
    fn test_regressor_rejects_nan_target() {
        let x = vec![vec![1.0], vec![2.0]];
        assert!(RandomForestRegressor::fit(&x, &[1.0, f64::NAN], params(2)).is_err());
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = blobs();
        let rf = RandomForestClassifier::fit(&x, &y, ClassLabels::Int(vec![0, 1]), params(3)).unwrap();
        assert!(rf.predict(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_mismatched_rows_and_targets() {
        let x = vec![vec![1.0], vec![2.0]];
        assert!(RandomForestClassifier::fit(&x, &[0], ClassLabels::Int(vec![0]), params(1)).is_err());
    }
}
