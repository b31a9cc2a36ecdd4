// ============================================================
// Layer 5 — Decision Tree (CART)
// ============================================================
// A binary decision tree grown greedily, one node at a time:
//
//   1. compute the node's impurity and leaf value
//   2. stop if the node is pure, too small, or at max depth
//   3. draw a random subset of candidate features
//   4. for each candidate, sort the node's rows by that feature
//      and scan every boundary between two distinct values
//   5. keep the boundary with the lowest weighted child impurity
//   6. push both children onto the work stack
//
// Impurity:
//   Gini          1 - Σ p_k²            (classification)
//   Squared error E[y²] - E[y]²         (regression)
//
// Routing rule: `x <= threshold` goes left, everything else
// (including NaN) goes right. The exported graph uses the same
// rule (BRANCH_LEQ), so both evaluate identically.
//
// Nodes live in a flat arena indexed by node id; the root is
// node 0. The work stack replaces recursion, so very deep trees
// cannot overflow the call stack.
//
// Reference: Breiman et al. (1984) Classification and Regression Trees
//            Rust Book §8 (Vectors)

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::cmp::Ordering;

/// Below this an impurity counts as zero
const PURE: f64 = 1e-12;

/// How many features each split may look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFeatures {
    All,
    Sqrt,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::All  => n_features,
            MaxFeatures::Sqrt => ((n_features as f64).sqrt() as usize).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth:         Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf:  usize,
    pub max_features:      MaxFeatures,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth:         None,
            min_samples_split: 2,
            min_samples_leaf:  1,
            max_features:      MaxFeatures::All,
        }
    }
}

/// What the tree is fit against
#[derive(Debug, Clone, Copy)]
pub enum TreeTarget<'a> {
    /// Class index per row, and the number of classes
    Classes { y: &'a [usize], n_classes: usize },
    /// Continuous value per row
    Values(&'a [f64]),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Split {
        feature:   usize,
        threshold: f32,
        left:      usize,
        right:     usize,
    },
    /// Class probabilities (classification) or a single mean (regression)
    Leaf { value: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind:      NodeKind,
    pub n_samples: usize,
    pub impurity:  f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes:      Vec<Node>,
    n_features: usize,
}

struct Candidate {
    feature:   usize,
    threshold: f32,
    left:      Vec<usize>,
    right:     Vec<usize>,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `sample` (duplicates allowed,
    /// as produced by bootstrap sampling).
    pub fn fit(
        x:      &[Vec<f32>],
        target: TreeTarget<'_>,
        sample: Vec<usize>,
        params: &TreeParams,
        rng:    &mut StdRng,
    ) -> Self {
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let n_candidates = params.max_features.resolve(n_features);
        let mut features: Vec<usize> = (0..n_features).collect();

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<(usize, Vec<usize>, usize)> = Vec::new();

        nodes.push(placeholder());
        stack.push((0, sample, 0));

        while let Some((id, rows, depth)) = stack.pop() {
            let (value, impurity) = node_stats(&target, &rows);
            let n = rows.len();

            let stop = impurity <= PURE
                || n < params.min_samples_split
                || n < 2 * params.min_samples_leaf
                || params.max_depth.is_some_and(|d| depth >= d);

            let split = if stop {
                None
            } else {
                features.shuffle(rng);
                best_split(x, &target, &rows, &features, n_candidates, params)
            };

            match split {
                Some(c) => {
                    let left  = nodes.len();
                    let right = left + 1;
                    nodes.push(placeholder());
                    nodes.push(placeholder());
                    nodes[id] = Node {
                        kind: NodeKind::Split {
                            feature:   c.feature,
                            threshold: c.threshold,
                            left,
                            right,
                        },
                        n_samples: n,
                        impurity,
                    };
                    stack.push((right, c.right, depth + 1));
                    stack.push((left, c.left, depth + 1));
                }
                None => {
                    nodes[id] = Node {
                        kind: NodeKind::Leaf { value },
                        n_samples: n,
                        impurity,
                    };
                }
            }
        }

        Self { nodes, n_features }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Depth of the deepest leaf (a lone root has depth 0)
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            if let NodeKind::Split { left, right, .. } = self.nodes[id].kind {
                stack.push((left, d + 1));
                stack.push((right, d + 1));
            }
        }
        deepest
    }

    /// Leaf value reached by one row
    pub fn predict_row(&self, row: &[f32]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id].kind {
                NodeKind::Leaf { value } => return value,
                NodeKind::Split { feature, threshold, left, right } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Unnormalized mean-decrease-in-impurity per feature
    pub fn impurity_decrease(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.n_features];
        for node in &self.nodes {
            if let NodeKind::Split { feature, left, right, .. } = node.kind {
                let l = &self.nodes[left];
                let r = &self.nodes[right];
                out[feature] += node.n_samples as f64 * node.impurity
                    - l.n_samples as f64 * l.impurity
                    - r.n_samples as f64 * r.impurity;
            }
        }
        out
    }
}

fn placeholder() -> Node {
    Node {
        kind:      NodeKind::Leaf { value: Vec::new() },
        n_samples: 0,
        impurity:  0.0,
    }
}

/// Leaf value and impurity of a set of rows
fn node_stats(target: &TreeTarget<'_>, rows: &[usize]) -> (Vec<f64>, f64) {
    let n = rows.len().max(1) as f64;
    match target {
        TreeTarget::Classes { y, n_classes } => {
            let mut counts = vec![0.0; *n_classes];
            for &r in rows {
                counts[y[r]] += 1.0;
            }
            let probs: Vec<f64> = counts.iter().map(|c| c / n).collect();
            let gini = 1.0 - probs.iter().map(|p| p * p).sum::<f64>();
            (probs, gini)
        }
        TreeTarget::Values(y) => {
            let sum: f64 = rows.iter().map(|&r| y[r]).sum();
            let sq:  f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
            let mean = sum / n;
            (vec![mean], (sq / n - mean * mean).max(0.0))
        }
    }
}

/// Search the shuffled feature list for the best split.
///
/// The first `n_candidates` features are always evaluated. If none of
/// them yields a valid split, the search carries on through the
/// remaining features until one does. A split is taken even when it
/// does not lower the impurity, so that interactions two levels down
/// can still be found.
fn best_split(
    x:            &[Vec<f32>],
    target:       &TreeTarget<'_>,
    rows:         &[usize],
    features:     &[usize],
    n_candidates: usize,
    params:       &TreeParams,
) -> Option<Candidate> {
    let mut best: Option<(usize, f32, f64)> = None;
    let mut sorted = rows.to_vec();

    for (visited, &f) in features.iter().enumerate() {
        if visited >= n_candidates && best.is_some() {
            break;
        }
        sorted.sort_by(|a, b| cmp_nan_last(x[*a][f], x[*b][f]));
        if let Some((threshold, score)) = scan_feature(x, target, &sorted, f, params) {
            if best.map_or(true, |(_, _, s)| score < s) {
                best = Some((f, threshold, score));
            }
        }
    }

    let (feature, threshold, _) = best?;
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&r| x[r][feature] <= threshold);
    Some(Candidate { feature, threshold, left, right })
}

/// Best (threshold, weighted child impurity) for one feature,
/// with `sorted` ordered by that feature (NaN last).
fn scan_feature(
    x:      &[Vec<f32>],
    target: &TreeTarget<'_>,
    sorted: &[usize],
    f:      usize,
    params: &TreeParams,
) -> Option<(f32, f64)> {
    let n = sorted.len();
    if n < 2 {
        return None;
    }
    let min_leaf = params.min_samples_leaf.max(1);
    let mut best: Option<(f32, f64)> = None;

    let mut scan = SplitScan::new(target, sorted);
    for i in 0..n - 1 {
        scan.move_left(target, sorted[i]);

        let lo = x[sorted[i]][f];
        let hi = x[sorted[i + 1]][f];
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            continue;
        }
        let n_left = i + 1;
        if n_left < min_leaf || n - n_left < min_leaf {
            continue;
        }

        let score = scan.weighted_impurity();
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((threshold_between(lo, hi), score));
        }
    }
    best
}

/// Midpoint of two adjacent distinct values, or the lower value when
/// the midpoint does not fall strictly between them.
fn threshold_between(lo: f32, hi: f32) -> f32 {
    let mid = lo / 2.0 + hi / 2.0;
    if mid.is_finite() && mid >= lo && mid < hi {
        mid
    } else {
        lo
    }
}

fn cmp_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true)   => Ordering::Equal,
        (true, false)  => Ordering::Greater,
        (false, true)  => Ordering::Less,
    }
}

/// Running left/right sufficient statistics while scanning a sorted feature
enum SplitScan {
    Classes { left: Vec<f64>, right: Vec<f64>, n_left: f64, n_right: f64 },
    Values { left_sum: f64, left_sq: f64, right_sum: f64, right_sq: f64, n_left: f64, n_right: f64 },
}

impl SplitScan {
    fn new(target: &TreeTarget<'_>, rows: &[usize]) -> Self {
        match target {
            TreeTarget::Classes { y, n_classes } => {
                let mut right = vec![0.0; *n_classes];
                for &r in rows {
                    right[y[r]] += 1.0;
                }
                SplitScan::Classes {
                    left: vec![0.0; *n_classes],
                    right,
                    n_left: 0.0,
                    n_right: rows.len() as f64,
                }
            }
            TreeTarget::Values(y) => SplitScan::Values {
                left_sum:  0.0,
                left_sq:   0.0,
                right_sum: rows.iter().map(|&r| y[r]).sum(),
                right_sq:  rows.iter().map(|&r| y[r] * y[r]).sum(),
                n_left:    0.0,
                n_right:   rows.len() as f64,
            },
        }
    }

    fn move_left(&mut self, target: &TreeTarget<'_>, row: usize) {
        match (self, target) {
            (SplitScan::Classes { left, right, n_left, n_right }, TreeTarget::Classes { y, .. }) => {
                left[y[row]]  += 1.0;
                right[y[row]] -= 1.0;
                *n_left  += 1.0;
                *n_right -= 1.0;
            }
            (
                SplitScan::Values { left_sum, left_sq, right_sum, right_sq, n_left, n_right },
                TreeTarget::Values(y),
            ) => {
                let v = y[row];
                *left_sum  += v;
                *left_sq   += v * v;
                *right_sum -= v;
                *right_sq  -= v * v;
                *n_left  += 1.0;
                *n_right -= 1.0;
            }
            _ => {}
        }
    }

    fn weighted_impurity(&self) -> f64 {
        match self {
            SplitScan::Classes { left, right, n_left, n_right } => {
                let total = n_left + n_right;
                (n_left * gini(left, *n_left) + n_right * gini(right, *n_right)) / total
            }
            SplitScan::Values { left_sum, left_sq, right_sum, right_sq, n_left, n_right } => {
                let total = n_left + n_right;
                let mse = |sum: f64, sq: f64, n: f64| (sq / n - (sum / n) * (sum / n)).max(0.0);
                (n_left * mse(*left_sum, *left_sq, *n_left)
                    + n_right * mse(*right_sum, *right_sq, *n_right))
                    / total
            }
        }
    }
}

fn gini(counts: &[f64], n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn all_rows(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_separable_classes_fit_exactly() {
        let x: Vec<Vec<f32>> = vec![vec![0.0], vec![0.1], vec![0.9], vec![1.0]];
        let y = vec![0, 0, 1, 1];
        let t = DecisionTree::fit(
            &x,
            TreeTarget::Classes { y: &y, n_classes: 2 },
            all_rows(4),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(t.depth(), 1);
        assert_eq!(t.predict_row(&[0.05]), &[1.0, 0.0]);
        assert_eq!(t.predict_row(&[0.95]), &[0.0, 1.0]);
        match &t.nodes()[0].kind {
            NodeKind::Split { threshold, .. } => assert!((*threshold - 0.5).abs() < 1e-6),
            other => panic!("expected a split, got {other:?}"),
        }
    }

    #[test]
    fn test_pure_node_is_a_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![1, 1];
        let t = DecisionTree::fit(
            &x,
            TreeTarget::Classes { y: &y, n_classes: 2 },
            all_rows(2),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(t.nodes().len(), 1);
    }

    #[test]
    fn test_regression_leaf_means() {
        let x = vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]];
        let y = vec![5.0, 5.0, 20.0, 22.0];
        let params = TreeParams { max_depth: Some(1), ..TreeParams::default() };
        let t = DecisionTree::fit(&x, TreeTarget::Values(&y), all_rows(4), &params, &mut rng());
        assert_eq!(t.predict_row(&[0.0]), &[5.0]);
        assert_eq!(t.predict_row(&[12.0]), &[21.0]);
    }

    #[test]
    fn test_nan_goes_right() {
        let x = vec![vec![0.0], vec![1.0], vec![f32::NAN]];
        let y = vec![0, 1, 1];
        let t = DecisionTree::fit(
            &x,
            TreeTarget::Classes { y: &y, n_classes: 2 },
            all_rows(3),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(t.predict_row(&[f32::NAN]), &[0.0, 1.0]);
    }

    #[test]
    fn test_infinite_values_split_on_lower_bound() {
        assert_eq!(threshold_between(3.0, f32::INFINITY), 3.0);
        assert_eq!(threshold_between(1.0, 2.0), 1.5);
    }

    #[test]
    fn test_constant_feature_gives_leaf() {
        let x = vec![vec![1.0], vec![1.0], vec![1.0]];
        let y = vec![0, 1, 0];
        let t = DecisionTree::fit(
            &x,
            TreeTarget::Classes { y: &y, n_classes: 2 },
            all_rows(3),
            &TreeParams::default(),
            &mut rng(),
        );
        assert_eq!(t.nodes().len(), 1);
        let p = t.predict_row(&[1.0]);
        assert!((p[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_importance_goes_to_informative_feature() {
        let x: Vec<Vec<f32>> = (0..20).map(|i| vec![(i % 3) as f32, i as f32]).collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let t = DecisionTree::fit(
            &x,
            TreeTarget::Classes { y: &y, n_classes: 2 },
            all_rows(20),
            &TreeParams::default(),
            &mut rng(),
        );
        let imp = t.impurity_decrease();
        assert!(imp[1] > imp[0]);
    }

    #[test]
    fn test_max_features_sqrt() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
    }
}
