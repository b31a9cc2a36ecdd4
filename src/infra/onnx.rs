// ============================================================
// Layer 6 — ONNX Graph Codec
// ============================================================
// Builds the portable inference graph for a fitted forest.
//
// The graph takes the raw, unscaled feature vector and applies
// the training standardization itself:
//
//   float_input [N, F]
//        │
//        ▼
//   Scaler (ai.onnx.ml)            Y = (X - offset) * scale
//        │
//        ▼
//   TreeEnsembleClassifier  → label [N], probabilities [N, K]
//   TreeEnsembleRegressor   → variable [N, 1]
//
// Every tree is flattened into the parallel `nodes_*` arrays
// the ai.onnx.ml operators expect. Leaves contribute
// value / n_trees, so summing over trees gives the forest mean.
//
// Only the subset of onnx.proto needed for these graphs is
// declared below, with the official field numbers so any ONNX
// runtime can read the result. onnx.proto is a proto2 file, so
// repeated scalars are written unpacked.
//
// Reference: onnx/onnx.proto, onnx/defs/traditionalml/defs.cc
//            prost crate documentation

use anyhow::{bail, Context, Result};
use prost::Message;

use crate::data::scaler::StandardScaler;
use crate::domain::prediction::ClassLabels;
use crate::domain::traits::Predictor;
use crate::ml::forest::{RandomForestClassifier, RandomForestRegressor};
use crate::ml::tree::{DecisionTree, NodeKind};

pub const IR_VERSION:     i64 = 9;
pub const OPSET_DEFAULT:  i64 = 19;
pub const OPSET_ML:       i64 = 1;
pub const ML_DOMAIN:      &str = "ai.onnx.ml";
pub const INPUT_NAME:     &str = "float_input";
pub const SCALED_NAME:    &str = "scaled_input";
pub const LABEL_NAME:     &str = "label";
pub const PROBA_NAME:     &str = "probabilities";
pub const VARIABLE_NAME:  &str = "variable";

/// TensorProto.DataType values used here
pub const ELEM_FLOAT:  i32 = 1;
pub const ELEM_INT64:  i32 = 7;
pub const ELEM_STRING: i32 = 8;

// ─── Protobuf messages ────────────────────────────────────────────────────────
#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(int64, tag = "1")]
    pub ir_version: i64,
    #[prost(string, tag = "2")]
    pub producer_name: String,
    #[prost(string, tag = "3")]
    pub producer_version: String,
    #[prost(string, tag = "4")]
    pub domain: String,
    #[prost(int64, tag = "5")]
    pub model_version: i64,
    #[prost(string, tag = "6")]
    pub doc_string: String,
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
    #[prost(message, repeated, tag = "14")]
    pub metadata_props: Vec<StringStringEntryProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct StringStringEntryProto {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "10")]
    pub doc_string: String,
    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,
    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub op_type: String,
    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,
    #[prost(string, tag = "6")]
    pub doc_string: String,
    #[prost(string, tag = "7")]
    pub domain: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributeProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(float, tag = "2")]
    pub f: f32,
    #[prost(int64, tag = "3")]
    pub i: i64,
    #[prost(bytes = "vec", tag = "4")]
    pub s: Vec<u8>,
    #[prost(float, repeated, packed = "false", tag = "7")]
    pub floats: Vec<f32>,
    #[prost(int64, repeated, packed = "false", tag = "8")]
    pub ints: Vec<i64>,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub strings: Vec<Vec<u8>>,
    #[prost(enumeration = "AttributeType", tag = "20")]
    pub r#type: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AttributeType {
    Undefined = 0,
    Float     = 1,
    Int       = 2,
    String    = 3,
    Floats    = 6,
    Ints      = 7,
    Strings   = 8,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(oneof = "type_proto::Value", tags = "1")]
    pub value: Option<type_proto::Value>,
}

pub mod type_proto {
    use super::TensorShapeProto;

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        TensorType(Tensor),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Tensor {
        #[prost(int32, tag = "1")]
        pub elem_type: i32,
        #[prost(message, optional, tag = "2")]
        pub shape: Option<TensorShapeProto>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<tensor_shape_proto::Dimension>,
}

pub mod tensor_shape_proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Dimension {
        #[prost(oneof = "dimension::Value", tags = "1, 2")]
        pub value: Option<dimension::Value>,
    }

    pub mod dimension {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum Value {
            #[prost(int64, tag = "1")]
            DimValue(i64),
            #[prost(string, tag = "2")]
            DimParam(String),
        }
    }
}

// ─── Attribute helpers ────────────────────────────────────────────────────────
impl AttributeProto {
    pub fn int(name: &str, value: i64) -> Self {
        Self { name: name.into(), i: value, r#type: AttributeType::Int as i32, ..Default::default() }
    }

    pub fn string(name: &str, value: &str) -> Self {
        Self {
            name:   name.into(),
            s:      value.as_bytes().to_vec(),
            r#type: AttributeType::String as i32,
            ..Default::default()
        }
    }

    pub fn floats(name: &str, values: Vec<f32>) -> Self {
        Self { name: name.into(), floats: values, r#type: AttributeType::Floats as i32, ..Default::default() }
    }

    pub fn ints(name: &str, values: Vec<i64>) -> Self {
        Self { name: name.into(), ints: values, r#type: AttributeType::Ints as i32, ..Default::default() }
    }

    pub fn strings<S: AsRef<str>>(name: &str, values: &[S]) -> Self {
        Self {
            name:    name.into(),
            strings: values.iter().map(|s| s.as_ref().as_bytes().to_vec()).collect(),
            r#type:  AttributeType::Strings as i32,
            ..Default::default()
        }
    }

    /// `s` as UTF-8 text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.s.clone())
            .with_context(|| format!("Attribute '{}' is not valid UTF-8", self.name))
    }

    /// `strings` as UTF-8 text
    pub fn texts(&self) -> Result<Vec<String>> {
        self.strings
            .iter()
            .map(|s| {
                String::from_utf8(s.clone())
                    .with_context(|| format!("Attribute '{}' is not valid UTF-8", self.name))
            })
            .collect()
    }
}

impl NodeProto {
    pub fn attr(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|a| a.name == name)
    }
}

fn tensor_info(name: &str, elem_type: i32, dims: &[Option<i64>]) -> ValueInfoProto {
    use tensor_shape_proto::{dimension, Dimension};

    let dim = dims
        .iter()
        .map(|d| Dimension {
            value: Some(match d {
                Some(v) => dimension::Value::DimValue(*v),
                None    => dimension::Value::DimParam("N".into()),
            }),
        })
        .collect();

    ValueInfoProto {
        name:   name.into(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto { dim }),
            })),
        }),
    }
}

// ─── Tree flattening ──────────────────────────────────────────────────────────
/// The `nodes_*` arrays shared by both tree-ensemble operators
#[derive(Default)]
struct FlatNodes {
    treeids:      Vec<i64>,
    nodeids:      Vec<i64>,
    featureids:   Vec<i64>,
    values:       Vec<f32>,
    modes:        Vec<&'static str>,
    truenodeids:  Vec<i64>,
    falsenodeids: Vec<i64>,
}

impl FlatNodes {
    fn from_trees(trees: &[DecisionTree]) -> Self {
        let mut flat = FlatNodes::default();
        for (t, tree) in trees.iter().enumerate() {
            for (n, node) in tree.nodes().iter().enumerate() {
                flat.treeids.push(t as i64);
                flat.nodeids.push(n as i64);
                match node.kind {
                    NodeKind::Split { feature, threshold, left, right } => {
                        flat.featureids.push(feature as i64);
                        flat.values.push(threshold);
                        flat.modes.push("BRANCH_LEQ");
                        flat.truenodeids.push(left as i64);
                        flat.falsenodeids.push(right as i64);
                    }
                    NodeKind::Leaf { .. } => {
                        flat.featureids.push(0);
                        flat.values.push(0.0);
                        flat.modes.push("LEAF");
                        flat.truenodeids.push(0);
                        flat.falsenodeids.push(0);
                    }
                }
            }
        }
        flat
    }

    fn into_attributes(self) -> Vec<AttributeProto> {
        vec![
            AttributeProto::ints("nodes_treeids", self.treeids),
            AttributeProto::ints("nodes_nodeids", self.nodeids),
            AttributeProto::ints("nodes_featureids", self.featureids),
            AttributeProto::floats("nodes_values", self.values),
            AttributeProto::strings("nodes_modes", self.modes.as_slice()),
            AttributeProto::ints("nodes_truenodeids", self.truenodeids),
            AttributeProto::ints("nodes_falsenodeids", self.falsenodeids),
        ]
    }
}

/// (tree id, node id, leaf value) for every leaf of every tree
fn leaves(trees: &[DecisionTree]) -> impl Iterator<Item = (i64, i64, &[f64])> {
    trees.iter().enumerate().flat_map(|(t, tree)| {
        tree.nodes().iter().enumerate().filter_map(move |(n, node)| match &node.kind {
            NodeKind::Leaf { value } => Some((t as i64, n as i64, value.as_slice())),
            NodeKind::Split { .. } => None,
        })
    })
}

// ─── Graph builders ───────────────────────────────────────────────────────────
fn scaler_node(scaler: &StandardScaler) -> NodeProto {
    NodeProto {
        input:     vec![INPUT_NAME.into()],
        output:    vec![SCALED_NAME.into()],
        name:      "Scaler".into(),
        op_type:   "Scaler".into(),
        domain:    ML_DOMAIN.into(),
        attribute: vec![
            AttributeProto::floats("offset", scaler.offsets()),
            AttributeProto::floats("scale", scaler.scales()),
        ],
        ..Default::default()
    }
}

fn check_widths(scaler: &StandardScaler, n_features: usize, feature_names: &[String]) -> Result<()> {
    if scaler.n_features() != n_features || feature_names.len() != n_features {
        bail!(
            "Feature count mismatch: scaler {}, model {}, names {}",
            scaler.n_features(),
            n_features,
            feature_names.len()
        );
    }
    Ok(())
}

fn model(name: &str, doc: String, graph: GraphProto, feature_names: &[String]) -> Result<ModelProto> {
    Ok(ModelProto {
        ir_version:       IR_VERSION,
        producer_name:    env!("CARGO_PKG_NAME").into(),
        producer_version: env!("CARGO_PKG_VERSION").into(),
        model_version:    1,
        doc_string:       doc,
        graph:            Some(GraphProto { name: name.into(), ..graph }),
        opset_import:     vec![
            OperatorSetIdProto { domain: String::new(), version: OPSET_DEFAULT },
            OperatorSetIdProto { domain: ML_DOMAIN.into(), version: OPSET_ML },
        ],
        metadata_props: vec![StringStringEntryProto {
            key:   "feature_names".into(),
            value: serde_json::to_string(feature_names)?,
        }],
        ..Default::default()
    })
}

/// Graph for a fitted classifier, fed with unscaled rows
pub fn export_classifier(
    forest:        &RandomForestClassifier,
    scaler:        &StandardScaler,
    feature_names: &[String],
    name:          &str,
) -> Result<ModelProto> {
    check_widths(scaler, forest.n_features(), feature_names)?;
    let n_trees = forest.trees().len() as f64;

    let mut class_treeids = Vec::new();
    let mut class_nodeids = Vec::new();
    let mut class_ids     = Vec::new();
    let mut class_weights = Vec::new();
    for (t, n, value) in leaves(forest.trees()) {
        for (k, p) in value.iter().enumerate() {
            class_treeids.push(t);
            class_nodeids.push(n);
            class_ids.push(k as i64);
            class_weights.push((p / n_trees) as f32);
        }
    }

    let mut attribute = FlatNodes::from_trees(forest.trees()).into_attributes();
    attribute.extend([
        AttributeProto::ints("class_treeids", class_treeids),
        AttributeProto::ints("class_nodeids", class_nodeids),
        AttributeProto::ints("class_ids", class_ids),
        AttributeProto::floats("class_weights", class_weights),
        AttributeProto::string("post_transform", "NONE"),
    ]);
    let label_type = match forest.classes() {
        ClassLabels::Int(labels) => {
            attribute.push(AttributeProto::ints("classlabels_int64s", labels.clone()));
            ELEM_INT64
        }
        ClassLabels::Text(labels) => {
            attribute.push(AttributeProto::strings("classlabels_strings", labels.as_slice()));
            ELEM_STRING
        }
    };

    let ensemble = NodeProto {
        input:   vec![SCALED_NAME.into()],
        output:  vec![LABEL_NAME.into(), PROBA_NAME.into()],
        name:    "TreeEnsembleClassifier".into(),
        op_type: "TreeEnsembleClassifier".into(),
        domain:  ML_DOMAIN.into(),
        attribute,
        ..Default::default()
    };

    let n_features = forest.n_features() as i64;
    let n_classes  = forest.classes().len() as i64;
    let graph = GraphProto {
        node:   vec![scaler_node(scaler), ensemble],
        input:  vec![tensor_info(INPUT_NAME, ELEM_FLOAT, &[None, Some(n_features)])],
        output: vec![
            tensor_info(LABEL_NAME, label_type, &[None]),
            tensor_info(PROBA_NAME, ELEM_FLOAT, &[None, Some(n_classes)]),
        ],
        ..Default::default()
    };

    let doc = format!(
        "Random forest classifier: {} trees, {} features, {} classes",
        forest.trees().len(),
        n_features,
        n_classes
    );
    model(name, doc, graph, feature_names)
}

/// Graph for a fitted regressor, fed with unscaled rows
pub fn export_regressor(
    forest:        &RandomForestRegressor,
    scaler:        &StandardScaler,
    feature_names: &[String],
    name:          &str,
) -> Result<ModelProto> {
    check_widths(scaler, forest.n_features(), feature_names)?;
    let n_trees = forest.trees().len() as f64;

    let mut target_treeids = Vec::new();
    let mut target_nodeids = Vec::new();
    let mut target_weights = Vec::new();
    for (t, n, value) in leaves(forest.trees()) {
        target_treeids.push(t);
        target_nodeids.push(n);
        target_weights.push((value[0] / n_trees) as f32);
    }
    let target_ids = vec![0; target_treeids.len()];

    let mut attribute = FlatNodes::from_trees(forest.trees()).into_attributes();
    attribute.extend([
        AttributeProto::int("n_targets", 1),
        AttributeProto::ints("target_treeids", target_treeids),
        AttributeProto::ints("target_nodeids", target_nodeids),
        AttributeProto::ints("target_ids", target_ids),
        AttributeProto::floats("target_weights", target_weights),
        AttributeProto::string("aggregate_function", "SUM"),
        AttributeProto::string("post_transform", "NONE"),
    ]);

    let ensemble = NodeProto {
        input:   vec![SCALED_NAME.into()],
        output:  vec![VARIABLE_NAME.into()],
        name:    "TreeEnsembleRegressor".into(),
        op_type: "TreeEnsembleRegressor".into(),
        domain:  ML_DOMAIN.into(),
        attribute,
        ..Default::default()
    };

    let n_features = forest.n_features() as i64;
    let graph = GraphProto {
        node:   vec![scaler_node(scaler), ensemble],
        input:  vec![tensor_info(INPUT_NAME, ELEM_FLOAT, &[None, Some(n_features)])],
        output: vec![tensor_info(VARIABLE_NAME, ELEM_FLOAT, &[None, Some(1)])],
        ..Default::default()
    };

    let doc = format!(
        "Random forest regressor: {} trees, {} features",
        forest.trees().len(),
        n_features
    );
    model(name, doc, graph, feature_names)
}

pub fn encode(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

pub fn decode(bytes: &[u8]) -> Result<ModelProto> {
    ModelProto::decode(bytes).context("Model file is not a valid ONNX protobuf")
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::ForestParams;

    fn fitted() -> (RandomForestClassifier, StandardScaler, Vec<String>) {
        let raw: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let scaler = StandardScaler::fit(&raw, 2);
        let x = scaler.transform(&raw).unwrap();
        let params = ForestParams { n_estimators: 4, ..ForestParams::default() };
        let rf = RandomForestClassifier::fit(&x, &y, ClassLabels::Text(vec!["no".into(), "yes".into()]), params)
            .unwrap();
        (rf, scaler, vec!["a".into(), "b".into()])
    }

    #[test]
    fn test_classifier_graph_layout() {
        let (rf, scaler, names) = fitted();
        let model = export_classifier(&rf, &scaler, &names, "test").unwrap();
        assert_eq!(model.ir_version, IR_VERSION);
        assert_eq!(model.opset_import.len(), 2);

        let graph = model.graph.as_ref().unwrap();
        assert_eq!(graph.node.len(), 2);
        assert_eq!(graph.node[0].op_type, "Scaler");
        assert_eq!(graph.node[1].op_type, "TreeEnsembleClassifier");
        assert_eq!(graph.input[0].name, INPUT_NAME);
        assert_eq!(graph.output[1].name, PROBA_NAME);

        let ens = &graph.node[1];
        let n_nodes: usize = rf.trees().iter().map(|t| t.nodes().len()).sum();
        assert_eq!(ens.attr("nodes_nodeids").unwrap().ints.len(), n_nodes);
        assert_eq!(ens.attr("classlabels_strings").unwrap().texts().unwrap(), vec!["no", "yes"]);
        assert_eq!(ens.attr("post_transform").unwrap().text().unwrap(), "NONE");
    }

    #[test]
    fn test_encode_decode_preserves_model() {
        let (rf, scaler, names) = fitted();
        let model = export_classifier(&rf, &scaler, &names, "test").unwrap();
        let back = decode(&encode(&model)).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_feature_count_mismatch_is_an_error() {
        let (rf, scaler, _) = fitted();
        assert!(export_classifier(&rf, &scaler, &["only_one".into()], "test").is_err());
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
