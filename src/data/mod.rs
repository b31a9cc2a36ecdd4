// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from a raw CSV file all the
// way to scaled, model-ready feature rows.
//
// The pipeline flows in this order:
//
//   CSV file
//       │
//       ▼
//   CsvLoader         → reads the file, types each column
//       │
//       ▼
//   datasets          → per-domain derived columns
//       │
//       ▼
//   Preprocessor      → dates, ratios, label encoding, imputation
//       │
//       ▼
//   splitter          → features/target, seeded 80/20 split
//       │
//       ▼
//   StandardScaler    → standardization fit on the training rows
//
// Each module is responsible for exactly one step.
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Reads CSV files into typed tables
pub mod loader;

/// One loader per fleet dataset
pub mod datasets;

/// Column derivations, encoding and imputation
pub mod preprocessor;

/// Splits a prepared table into train/test partitions
pub mod splitter;

/// Per-feature standardization
pub mod scaler;
