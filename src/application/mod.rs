// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one user-level goal (train, score or profile a dataset).
//
// Rules for this layer:
//   - No tree fitting or graph evaluation here (Layer 5)
//   - No CSV parsing or file formats here (Layers 4 and 6)
//   - Only workflow coordination plus the console markers
//     (`SUCCESS:` / `ERROR:`) every run reports
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training and export workflow, plus PipelineConfig
pub mod train_use_case;

// Applying an exported model to a new CSV file
pub mod score_use_case;

// Column summaries and correlations for any dataset
pub mod profile_use_case;
