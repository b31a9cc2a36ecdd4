// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Runs an exported model graph without any ONNX runtime.
//
// Loading walks the decoded graph and rebuilds:
//   - the Scaler node's offset/scale vectors
//   - every tree of the TreeEnsemble node, with node ids
//     resolved into positions and leaf weights attached
//
// Scoring a row then mirrors the operators' semantics:
//
//   z      = (x - offset) * scale
//   score  = Σ over trees of the weights of the leaf z reaches
//   label  = class with the highest score (classifier)
//
// Only what the exporter writes is supported: post_transform
// NONE, and SUM / AVERAGE aggregation for regressors. Anything
// else is rejected at load time rather than scored wrongly.
//
// Reference: onnx/defs/traditionalml/defs.cc (TreeEnsemble*)
//            Rust Book §8 (Hash Maps)

use anyhow::{anyhow, bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::data::scaler::standardize;
use crate::domain::prediction::{ClassLabels, Prediction};
use crate::domain::traits::Predictor;
use crate::infra::onnx::{self, ModelProto, NodeProto};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Leq,
    Lt,
    Gte,
    Gt,
    Eq,
    Neq,
}

impl Mode {
    fn parse(text: &str) -> Result<Option<Mode>> {
        Ok(Some(match text {
            "BRANCH_LEQ" => Mode::Leq,
            "BRANCH_LT"  => Mode::Lt,
            "BRANCH_GTE" => Mode::Gte,
            "BRANCH_GT"  => Mode::Gt,
            "BRANCH_EQ"  => Mode::Eq,
            "BRANCH_NEQ" => Mode::Neq,
            "LEAF"       => return Ok(None),
            other        => bail!("Unknown tree node mode '{}'", other),
        }))
    }

    fn test(self, x: f32, threshold: f32) -> bool {
        match self {
            Mode::Leq => x <= threshold,
            Mode::Lt  => x < threshold,
            Mode::Gte => x >= threshold,
            Mode::Gt  => x > threshold,
            Mode::Eq  => x == threshold,
            Mode::Neq => x != threshold,
        }
    }
}

#[derive(Debug, Clone)]
enum GraphNode {
    Branch {
        mode:      Mode,
        feature:   usize,
        threshold: f32,
        if_true:   usize,
        if_false:  usize,
        nan_true:  bool,
    },
    /// (output slot, weight) pairs
    Leaf(Vec<(usize, f64)>),
}

#[derive(Debug, Clone)]
struct GraphTree {
    nodes: Vec<GraphNode>,
    root:  usize,
}

impl GraphTree {
    fn leaf(&self, row: &[f32]) -> &[(usize, f64)] {
        let mut id = self.root;
        loop {
            match &self.nodes[id] {
                GraphNode::Leaf(weights) => return weights,
                GraphNode::Branch { mode, feature, threshold, if_true, if_false, nan_true } => {
                    let x = row[*feature];
                    let go_true = (x.is_nan() && *nan_true) || mode.test(x, *threshold);
                    id = if go_true { *if_true } else { *if_false };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Ensemble {
    Classifier { classes: ClassLabels },
    Regressor { average: bool, base: f64 },
}

/// An exported model graph, ready to score raw feature rows.
#[derive(Debug, Clone)]
pub struct Inferencer {
    n_features: usize,
    offsets:    Vec<f32>,
    scales:     Vec<f32>,
    trees:      Vec<GraphTree>,
    ensemble:   Ensemble,
}

impl Inferencer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read model file '{}'", path.display()))?;
        let inferencer = Self::from_bytes(&bytes)
            .with_context(|| format!("Cannot load model '{}'", path.display()))?;
        tracing::info!(
            "Model loaded from '{}': {} trees, {} features",
            path.display(),
            inferencer.trees.len(),
            inferencer.n_features
        );
        Ok(inferencer)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_model(&onnx::decode(bytes)?)
    }

    pub fn from_model(model: &ModelProto) -> Result<Self> {
        let graph = model.graph.as_ref().context("Model has no graph")?;

        let ensemble_node = graph
            .node
            .iter()
            .find(|n| n.op_type.starts_with("TreeEnsemble"))
            .context("Model has no TreeEnsemble node")?;

        let n_features = input_width(model)?;
        let (offsets, scales) = match graph.node.iter().find(|n| n.op_type == "Scaler") {
            Some(node) => scaler_params(node, n_features)?,
            None       => (vec![0.0; n_features], vec![1.0; n_features]),
        };

        let post = match ensemble_node.attr("post_transform") {
            Some(a) => a.text()?,
            None    => "NONE".to_string(),
        };
        if post != "NONE" {
            bail!("Unsupported post_transform '{}'", post);
        }

        let (trees, ensemble) = match ensemble_node.op_type.as_str() {
            "TreeEnsembleClassifier" => classifier(ensemble_node)?,
            "TreeEnsembleRegressor"  => regressor(ensemble_node)?,
            other => bail!("Unsupported operator '{}'", other),
        };

        if let Some(bad) = trees.iter().flat_map(|t| &t.nodes).find_map(|n| match n {
            GraphNode::Branch { feature, .. } if *feature >= n_features => Some(*feature),
            _ => None,
        }) {
            bail!("Tree splits on feature {} but the input has {} features", bad, n_features);
        }

        Ok(Self { n_features, offsets, scales, trees, ensemble })
    }

    /// Class labels of a classifier graph
    pub fn classes(&self) -> Option<&ClassLabels> {
        match &self.ensemble {
            Ensemble::Classifier { classes } => Some(classes),
            Ensemble::Regressor { .. } => None,
        }
    }

    fn scores(&self, row: &[f32], n_slots: usize) -> Vec<f64> {
        let scaled: Vec<f32> = row
            .iter()
            .zip(self.offsets.iter().zip(&self.scales))
            .map(|(x, (o, s))| standardize(*x, *o, *s))
            .collect();

        let mut scores = vec![0.0; n_slots];
        for tree in &self.trees {
            for &(slot, w) in tree.leaf(&scaled) {
                scores[slot] += w;
            }
        }
        scores
    }
}

impl Predictor for Inferencer {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Result<Prediction> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != self.n_features) {
            bail!("Row {} has {} features, model expects {}", i, row.len(), self.n_features);
        }
        Ok(match &self.ensemble {
            Ensemble::Classifier { classes } => Prediction::Classification {
                classes:       classes.clone(),
                probabilities: rows.iter().map(|r| self.scores(r, classes.len())).collect(),
            },
            Ensemble::Regressor { average, base } => {
                let n_trees = self.trees.len().max(1) as f64;
                Prediction::Regression(
                    rows.iter()
                        .map(|r| {
                            let sum = self.scores(r, 1)[0];
                            base + if *average { sum / n_trees } else { sum }
                        })
                        .collect(),
                )
            }
        })
    }
}

// ─── Graph parsing ────────────────────────────────────────────────────────────
fn input_width(model: &ModelProto) -> Result<usize> {
    use crate::infra::onnx::{tensor_shape_proto::dimension, type_proto};

    let graph = model.graph.as_ref().context("Model has no graph")?;
    let input = graph.input.first().context("Graph has no input")?;
    let Some(type_proto::Value::TensorType(tensor)) = input.r#type.as_ref().and_then(|t| t.value.as_ref()) else {
        bail!("Graph input '{}' is not a tensor", input.name);
    };
    let dims = tensor.shape.as_ref().map(|s| s.dim.as_slice()).unwrap_or_default();
    match dims.get(1).and_then(|d| d.value.as_ref()) {
        Some(dimension::Value::DimValue(v)) if *v > 0 => Ok(*v as usize),
        _ => bail!("Graph input '{}' has no fixed feature dimension", input.name),
    }
}

fn scaler_params(node: &NodeProto, n_features: usize) -> Result<(Vec<f32>, Vec<f32>)> {
    let widen = |name: &str, default: f32| -> Result<Vec<f32>> {
        let values = node.attr(name).map(|a| a.floats.clone()).unwrap_or_default();
        match values.len() {
            0 => Ok(vec![default; n_features]),
            1 => Ok(vec![values[0]; n_features]),
            n if n == n_features => Ok(values),
            n => bail!("Scaler '{}' has {} values for {} features", name, n, n_features),
        }
    };
    Ok((widen("offset", 0.0)?, widen("scale", 1.0)?))
}

fn ints<'a>(node: &'a NodeProto, name: &str) -> Result<&'a [i64]> {
    node.attr(name)
        .map(|a| a.ints.as_slice())
        .ok_or_else(|| anyhow!("{} is missing attribute '{}'", node.op_type, name))
}

fn floats<'a>(node: &'a NodeProto, name: &str) -> Result<&'a [f32]> {
    node.attr(name)
        .map(|a| a.floats.as_slice())
        .ok_or_else(|| anyhow!("{} is missing attribute '{}'", node.op_type, name))
}

/// Trees from the `nodes_*` arrays, with every leaf still empty.
/// Also returns the (tree id, node id) → (tree, position) lookup.
fn build_trees(node: &NodeProto) -> Result<(Vec<GraphTree>, HashMap<(i64, i64), (usize, usize)>)> {
    let tree_ids  = ints(node, "nodes_treeids")?;
    let node_ids  = ints(node, "nodes_nodeids")?;
    let features  = ints(node, "nodes_featureids")?;
    let values    = floats(node, "nodes_values")?;
    let true_ids  = ints(node, "nodes_truenodeids")?;
    let false_ids = ints(node, "nodes_falsenodeids")?;
    let modes     = node
        .attr("nodes_modes")
        .context("Tree ensemble is missing 'nodes_modes'")?
        .texts()?;
    let nan_true  = node
        .attr("nodes_missing_value_tracks_true")
        .map(|a| a.ints.clone())
        .unwrap_or_default();

    let n = tree_ids.len();
    for (name, len) in [
        ("nodes_nodeids", node_ids.len()),
        ("nodes_featureids", features.len()),
        ("nodes_values", values.len()),
        ("nodes_truenodeids", true_ids.len()),
        ("nodes_falsenodeids", false_ids.len()),
        ("nodes_modes", modes.len()),
    ] {
        if len != n {
            bail!("Attribute '{}' has {} entries, expected {}", name, len, n);
        }
    }

    // Position of every node inside its tree
    let mut tree_index: BTreeMap<i64, usize> = BTreeMap::new();
    for &t in tree_ids {
        let next = tree_index.len();
        tree_index.entry(t).or_insert(next);
    }
    let mut sizes = vec![0usize; tree_index.len()];
    let mut lookup = HashMap::with_capacity(n);
    for i in 0..n {
        let t = tree_index[&tree_ids[i]];
        if lookup.insert((tree_ids[i], node_ids[i]), (t, sizes[t])).is_some() {
            bail!("Duplicate node {} in tree {}", node_ids[i], tree_ids[i]);
        }
        sizes[t] += 1;
    }

    let resolve = |tree: i64, id: i64| -> Result<usize> {
        lookup
            .get(&(tree, id))
            .map(|&(_, pos)| pos)
            .ok_or_else(|| anyhow!("Tree {} refers to missing node {}", tree, id))
    };

    let mut nodes: Vec<Vec<GraphNode>> = sizes.iter().map(|&s| Vec::with_capacity(s)).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); sizes.len()];
    for i in 0..n {
        let t = tree_index[&tree_ids[i]];
        let built = match Mode::parse(&modes[i])? {
            None => GraphNode::Leaf(Vec::new()),
            Some(mode) => {
                let if_true  = resolve(tree_ids[i], true_ids[i])?;
                let if_false = resolve(tree_ids[i], false_ids[i])?;
                children[t].extend([if_true, if_false]);
                GraphNode::Branch {
                    mode,
                    feature: usize::try_from(features[i]).context("Negative feature id")?,
                    threshold: values[i],
                    if_true,
                    if_false,
                    nan_true: nan_true.get(i).is_some_and(|&v| v != 0),
                }
            }
        };
        nodes[t].push(built);
    }

    let trees = nodes
        .into_iter()
        .zip(children)
        .map(|(nodes, children)| {
            let root = (0..nodes.len())
                .find(|p| !children.contains(p))
                .context("Tree has no root node")?;
            Ok(GraphTree { nodes, root })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((trees, lookup))
}

fn attach_weights(
    trees:    &mut [GraphTree],
    lookup:   &HashMap<(i64, i64), (usize, usize)>,
    tree_ids: &[i64],
    node_ids: &[i64],
    slots:    &[i64],
    weights:  &[f32],
    n_slots:  usize,
) -> Result<()> {
    if node_ids.len() != tree_ids.len() || slots.len() != tree_ids.len() || weights.len() != tree_ids.len() {
        bail!("Leaf weight attributes have different lengths");
    }
    for i in 0..tree_ids.len() {
        let &(t, pos) = lookup
            .get(&(tree_ids[i], node_ids[i]))
            .ok_or_else(|| anyhow!("Weight refers to missing node {} of tree {}", node_ids[i], tree_ids[i]))?;
        let slot = usize::try_from(slots[i]).ok().filter(|s| *s < n_slots).ok_or_else(|| {
            anyhow!("Weight targets output {} but there are {}", slots[i], n_slots)
        })?;
        match &mut trees[t].nodes[pos] {
            GraphNode::Leaf(w) => w.push((slot, f64::from(weights[i]))),
            GraphNode::Branch { .. } => bail!("Weight attached to branch node {}", node_ids[i]),
        }
    }
    Ok(())
}

fn classifier(node: &NodeProto) -> Result<(Vec<GraphTree>, Ensemble)> {
    let classes = if let Some(a) = node.attr("classlabels_int64s").filter(|a| !a.ints.is_empty()) {
        ClassLabels::Int(a.ints.clone())
    } else if let Some(a) = node.attr("classlabels_strings") {
        ClassLabels::Text(a.texts()?)
    } else {
        bail!("TreeEnsembleClassifier has no class labels");
    };

    let (mut trees, lookup) = build_trees(node)?;
    attach_weights(
        &mut trees,
        &lookup,
        ints(node, "class_treeids")?,
        ints(node, "class_nodeids")?,
        ints(node, "class_ids")?,
        floats(node, "class_weights")?,
        classes.len(),
    )?;
    Ok((trees, Ensemble::Classifier { classes }))
}

fn regressor(node: &NodeProto) -> Result<(Vec<GraphTree>, Ensemble)> {
    let n_targets = node.attr("n_targets").map(|a| a.i).unwrap_or(1);
    if n_targets != 1 {
        bail!("Only single-target regressors are supported, got {}", n_targets);
    }
    let average = match node.attr("aggregate_function") {
        None => false,
        Some(a) => match a.text()?.as_str() {
            "SUM"     => false,
            "AVERAGE" => true,
            other     => bail!("Unsupported aggregate_function '{}'", other),
        },
    };
    let base = node
        .attr("base_values")
        .and_then(|a| a.floats.first().copied())
        .map(f64::from)
        .unwrap_or(0.0);

    let (mut trees, lookup) = build_trees(node)?;
    attach_weights(
        &mut trees,
        &lookup,
        ints(node, "target_treeids")?,
        ints(node, "target_nodeids")?,
        ints(node, "target_ids")?,
        floats(node, "target_weights")?,
        1,
    )?;
    Ok((trees, Ensemble::Regressor { average, base }))
}
