// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the on-disk formats a trained model leaves behind:
//
//   onnx.rs           — ONNX protobuf messages (prost) and the
//                       exporters that turn a scaler plus a
//                       forest into a Scaler → TreeEnsemble graph
//
//   metadata.rs       — The JSON sidecar next to each model:
//                       feature order and categorical mappings
//
//   artifact_store.rs — Writes files through a temp file and a
//                       rename, so a model and its metadata
//                       appear together or not at all
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            onnx/onnx.proto (ONNX IR)

/// ONNX graph export
pub mod onnx;

/// Model metadata sidecar
pub mod metadata;

/// Atomic artifact writes
pub mod artifact_store;
