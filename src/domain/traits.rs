// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams of the pipeline:
//
//   TableSource → anything that yields a raw Table
//                 (CsvLoader today)
//   Predictor   → anything that turns feature rows into
//                 predictions (the in-memory forests, and the
//                 Inferencer that runs an exported graph)
//
// The application layer works against these traits, so the
// scorer can run an exported graph exactly where the trainer
// evaluates a freshly fitted forest.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::prediction::Prediction;
use crate::domain::table::Table;

// ─── TableSource ──────────────────────────────────────────────────────────────
/// Any component that can load one raw tabular dataset.
pub trait TableSource {
    /// Load the full dataset into memory.
    fn load_table(&self) -> Result<Table>;
}

// ─── Predictor ────────────────────────────────────────────────────────────────
/// Any fitted model that scores feature rows.
///
/// Rows must have exactly `n_features()` values, in the order
/// the model was trained on.
pub trait Predictor {
    /// Width of the feature vector this model expects
    fn n_features(&self) -> usize;

    /// Score a batch of rows
    fn predict(&self, rows: &[Vec<f32>]) -> Result<Prediction>;
}
