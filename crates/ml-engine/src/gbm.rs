use portfolio_core::{CancelFlag, EngineConfig, EngineError, EngineResult, FeatureRow};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::tree::{RegressionTree, TreeParams};

/// Boosting hyperparameters plus the seed for row subsampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl ModelParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        let m = &config.model;
        Self {
            n_estimators: m.n_estimators,
            max_depth: m.max_depth,
            learning_rate: m.learning_rate,
            subsample: m.subsample,
            min_samples_split: m.min_samples_split,
            min_samples_leaf: m.min_samples_leaf,
            seed: config.seed,
        }
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Squared-loss gradient boosting over [`RegressionTree`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit on `(x, y)`. The cancel flag is polled before every tree.
    pub fn fit(
        x: &[FeatureRow],
        y: &[f64],
        params: &ModelParams,
        cancel: &CancelFlag,
    ) -> EngineResult<Self> {
        if x.len() != y.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(EngineError::InsufficientData(format!(
                "need at least 2 training rows, got {}",
                x.len()
            )));
        }

        let n = x.len();
        let init = y.iter().sum::<f64>() / n as f64;
        let tree_params = params.tree_params();
        let sample_size = ((params.subsample.clamp(0.0, 1.0) * n as f64).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut current = vec![init; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let all: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_estimators {
            cancel.check()?;
            for i in 0..n {
                residuals[i] = y[i] - current[i];
            }
            let tree = if sample_size < n {
                let mut rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                RegressionTree::fit(x, &residuals, &rows, &tree_params)
            } else {
                RegressionTree::fit(x, &residuals, &all, &tree_params)
            };
            for i in 0..n {
                current[i] += params.learning_rate * tree.predict(&x[i]);
            }
            trees.push(tree);
        }

        Ok(Self {
            init,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn predict(&self, row: &FeatureRow) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_many(&self, rows: &[FeatureRow]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn toy_data(n: usize) -> (Vec<FeatureRow>, Vec<f64>) {
        let x: Vec<FeatureRow> = (0..n)
            .map(|i| {
                let mut r = [0.0; 9];
                r[0] = i as f64 / n as f64;
                r[4] = ((i * 7) % 11) as f64;
                r
            })
            .collect();
        let y = x.iter().map(|r| 2.0 * r[0] - 0.5).collect();
        (x, y)
    }

    #[test]
    fn test_boosting_reduces_training_error() {
        let (x, y) = toy_data(200);
        let params = ModelParams {
            n_estimators: 100,
            learning_rate: 0.1,
            ..ModelParams::default()
        };
        let model = GradientBoostedRegressor::fit(&x, &y, &params, &CancelFlag::new()).unwrap();
        let mse: f64 = x
            .iter()
            .zip(&y)
            .map(|(r, t)| (model.predict(r) - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 5e-3, "mse {mse}");
        assert_eq!(model.n_trees(), 100);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = toy_data(120);
        let params = ModelParams {
            n_estimators: 20,
            subsample: 0.7,
            ..ModelParams::default()
        };
        let a = GradientBoostedRegressor::fit(&x, &y, &params, &CancelFlag::new()).unwrap();
        let b = GradientBoostedRegressor::fit(&x, &y, &params, &CancelFlag::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled_before_first_tree() {
        let (x, y) = toy_data(50);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = GradientBoostedRegressor::fit(&x, &y, &ModelParams::default(), &cancel).unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[test]
    fn test_single_row_is_insufficient() {
        let (x, y) = toy_data(1);
        let err = GradientBoostedRegressor::fit(&x, &y, &ModelParams::default(), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn test_constant_target_predicts_mean() {
        let (x, _) = toy_data(30);
        let y = vec![0.03; 30];
        let model = GradientBoostedRegressor::fit(&x, &y, &ModelParams::default(), &CancelFlag::new())
            .unwrap();
        assert_abs_diff_eq!(model.predict(&x[5]), 0.03, epsilon = 1e-12);
    }
}
