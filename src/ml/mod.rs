// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// Everything that fits or evaluates a model lives here.
//
//   tree.rs       — CART decision tree on f32 feature rows
//                   Gini impurity for classes, variance for
//                   values, random feature subsets per split
//
//   forest.rs     — Bootstrap ensembles of trees
//                   RandomForestClassifier (averaged class
//                   probabilities) and RandomForestRegressor
//                   (averaged values), both seeded
//
//   metrics.rs    — Held-out evaluation
//                   accuracy, confusion matrix, per-class
//                   precision/recall/F1, R², MAE, RMSE
//
//   trainer.rs    — Fits the right forest for a domain's task
//                   and evaluates it on the test partition
//
//   inferencer.rs — Evaluates an exported model graph on raw
//                   feature rows, without the fitted forest
//
// Reference: Breiman (2001) Random Forests
//            Breiman et al. (1984) Classification and Regression Trees

/// Single decision tree
pub mod tree;

/// Random forest classifier and regressor
pub mod forest;

/// Evaluation metrics
pub mod metrics;

/// Fit + evaluate for one domain
pub mod trainer;

/// Exported graph evaluation
pub mod inferencer;
