pub mod dataset;
pub mod gbm;
pub mod tree;
pub mod walk_forward;

#[cfg(test)]
mod tests;

pub use dataset::{build_training_set, TrainingRow, TrainingSet};
pub use gbm::{GradientBoostedRegressor, ModelParams};
pub use tree::{RegressionTree, TreeParams};
pub use walk_forward::{
    fit_walk_forward, predict_expected_returns, walk_forward_splits, FoldId, FoldMetrics, FoldModel,
    FoldSplit, ModelEnsemble, OofDiagnostics,
};
