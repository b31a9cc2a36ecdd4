// ============================================================
// Layer 3 — Label Encoding
// ============================================================
// Maps each distinct categorical label of a column to an
// integer code.
//
// Codes are assigned by sorted label order, so a column with
// k distinct labels always produces exactly {0, .., k-1}:
//
//   ["Good", "Bad", "Good", "Worn"]
//   classes = ["Bad", "Good", "Worn"]
//   codes   = [1, 0, 1, 2]
//
// A missing cell is treated as the label "nan", so every row
// gets a code. Numeric cells are labelled the way a float or an
// integer column prints:
//
//   [1, 4, 4]       → "1", "4", "4"          (all whole, no gaps)
//   [1, NaN, 4]     → "1.0", "nan", "4.0"
//   [1, 2.5]        → "1.0", "2.5"
//
// When encoding, a whole number the encoder knows only in its
// other spelling ("4" against "4.0") still gets that code.
//
// An encoder is fit once per training run. Asking it to encode
// a label it never saw is an error: downstream consumers must
// treat unseen labels the same way.
//
// Reference: Rust Book §8 (Hash Maps), §9 (Error Handling)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::table::Column;

/// Label used for an empty cell
pub const MISSING_LABEL: &str = "nan";

/// A label that is not part of a fitted encoder's classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenLabel {
    pub column: String,
    pub label:  String,
}

impl fmt::Display for UnseenLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "label '{}' in column '{}' was not seen when the encoder was fit",
            self.label, self.column
        )
    }
}

impl std::error::Error for UnseenLabel {}

/// A fitted encoder for one categorical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    column:  String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the labels of a column (sorted, de-duplicated)
    pub fn fit(column: impl Into<String>, values: &Column) -> Self {
        let classes: BTreeSet<String> = labels_of(values).into_iter().collect();
        Self {
            column:  column.into(),
            classes: classes.into_iter().collect(),
        }
    }

    /// Rebuild an encoder from a stored `label -> code` mapping.
    /// Labels are ordered by their code.
    pub fn from_mapping(column: impl Into<String>, mapping: &BTreeMap<String, i64>) -> Self {
        let mut pairs: Vec<(&String, &i64)> = mapping.iter().collect();
        pairs.sort_by_key(|(_, code)| **code);
        Self {
            column:  column.into(),
            classes: pairs.into_iter().map(|(label, _)| label.clone()).collect(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// `label -> code` mapping, as written to the metadata file
    pub fn mapping(&self) -> BTreeMap<String, i64> {
        self.classes
            .iter()
            .enumerate()
            .map(|(code, label)| (label.clone(), code as i64))
            .collect()
    }

    pub fn encode_label(&self, label: &str) -> Result<i64, UnseenLabel> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map(|code| code as i64)
            .map_err(|_| UnseenLabel {
                column: self.column.clone(),
                label:  label.to_string(),
            })
    }

    /// Encode a whole column into a numeric column of codes
    pub fn transform(&self, values: &Column) -> Result<Column, UnseenLabel> {
        let numbers = values.as_numeric();
        let codes = labels_of(values)
            .iter()
            .enumerate()
            .map(|(i, label)| {
                self.encode_label(label).or_else(|err| {
                    numbers
                        .and_then(|v| other_spelling(v[i], label))
                        .and_then(|alt| self.encode_label(&alt).ok())
                        .ok_or(err)
                })
            })
            .map(|code| code.map(|c| c as f64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Column::Numeric(codes))
    }
}

/// The encoders of one run, in the order they were fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderSet {
    encoders: Vec<LabelEncoder>,
}

impl EncoderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, encoder: LabelEncoder) {
        self.encoders.push(encoder);
    }

    pub fn get(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.iter().find(|e| e.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelEncoder> {
        self.encoders.iter()
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    /// `column -> (label -> code)` for every encoder, in fit order
    pub fn mappings(&self) -> Vec<(String, BTreeMap<String, i64>)> {
        self.encoders
            .iter()
            .map(|e| (e.column.clone(), e.mapping()))
            .collect()
    }
}

impl FromIterator<LabelEncoder> for EncoderSet {
    fn from_iter<I: IntoIterator<Item = LabelEncoder>>(iter: I) -> Self {
        Self { encoders: iter.into_iter().collect() }
    }
}

/// Stringify every cell of a column the way the encoder sees it
fn labels_of(values: &Column) -> Vec<String> {
    match values {
        Column::Text(v) => v
            .iter()
            .map(|cell| cell.clone().unwrap_or_else(|| MISSING_LABEL.to_string()))
            .collect(),
        Column::Numeric(v) => {
            let whole = v.iter().all(|x| x.is_finite() && x.fract() == 0.0);
            v.iter()
                .map(|&x| if whole { format!("{x:.0}") } else { float_label(x) })
                .collect()
        }
        Column::Date(v) => v
            .iter()
            .map(|d| match d {
                Some(d) => d.to_string(),
                None    => MISSING_LABEL.to_string(),
            })
            .collect(),
    }
}

/// "4" for "4.0" and the reverse; `None` unless `x` is whole
fn other_spelling(x: f64, label: &str) -> Option<String> {
    if !x.is_finite() || x.fract() != 0.0 {
        return None;
    }
    let int = format!("{x:.0}");
    Some(if label == int { float_label(x) } else { int })
}

/// Shortest round-trip text of a float, with `.0` on whole numbers
/// and an exponent below 1e-4 or from 1e16 on.
fn float_label(x: f64) -> String {
    if x.is_nan() {
        return MISSING_LABEL.to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = x.abs();
    if x == 0.0 || (1e-4..1e16).contains(&magnitude) {
        let text = x.to_string();
        return if text.contains('.') { text } else { format!("{text}.0") };
    }

    let sci = format!("{x:e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = exp.strip_prefix('-').map_or(("+", exp), |d| ("-", d));
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => sci,
    }
}
