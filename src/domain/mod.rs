// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define the core
// concepts of the system.
//
// Rules for this layer:
//   - NO file I/O
//   - NO model fitting code
//   - Only plain data types and the traits other layers implement
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Column-oriented in-memory dataset
pub mod table;

// Categorical label → integer code mappings
pub mod encoding;

// The four fleet datasets and their fixed settings
pub mod fleet;

// Task kinds, class labels and prediction batches
pub mod prediction;

// Core abstractions (traits) that other layers implement
pub mod traits;
