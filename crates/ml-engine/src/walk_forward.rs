use std::ops::Range;

use portfolio_core::stats;
use portfolio_core::{CancelFlag, EngineError, EngineResult, ExpectedReturns, FeaturePanel, FeatureRow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::TrainingSet;
use crate::gbm::{GradientBoostedRegressor, ModelParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FoldId(pub usize);

/// Expanding-window fold: `train` always ends where `test` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub id: FoldId,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Chronological k-fold splits over `n_rows` ordered rows.
///
/// The rows are cut into `n_splits + 1` equal blocks (remainder goes to the
/// first training block); fold `k` trains on everything before block `k + 1`
/// and tests on that block.
pub fn walk_forward_splits(n_rows: usize, n_splits: usize) -> EngineResult<Vec<FoldSplit>> {
    if n_splits == 0 {
        return Err(EngineError::InvalidInput("n_splits must be positive".to_string()));
    }
    let test_size = n_rows / (n_splits + 1);
    if test_size == 0 {
        return Err(EngineError::InsufficientData(format!(
            "{n_rows} rows cannot form {n_splits} walk-forward folds"
        )));
    }
    let first_test = n_rows - n_splits * test_size;
    Ok((0..n_splits)
        .map(|k| {
            let start = first_test + k * test_size;
            FoldSplit {
                id: FoldId(k),
                train: 0..start,
                test: start..start + test_size,
            }
        })
        .collect())
}

/// Out-of-sample quality of one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub rmse: f64,
    /// Share of test rows whose predicted and realized returns agree in sign
    pub hit_rate: f64,
    pub n_train: usize,
    pub n_test: usize,
}

impl FoldMetrics {
    fn evaluate(predicted: &[f64], realized: &[f64], n_train: usize) -> Self {
        let n = predicted.len().max(1) as f64;
        let mse = predicted
            .iter()
            .zip(realized)
            .map(|(p, r)| (p - r).powi(2))
            .sum::<f64>()
            / n;
        let hits = predicted
            .iter()
            .zip(realized)
            .filter(|(p, r)| p.signum() == r.signum())
            .count();
        Self {
            rmse: mse.sqrt(),
            hit_rate: hits as f64 / n,
            n_train,
            n_test: predicted.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FoldModel {
    pub id: FoldId,
    pub train: Range<usize>,
    pub test: Range<usize>,
    pub model: GradientBoostedRegressor,
    pub metrics: FoldMetrics,
}

/// Fold models from one walk-forward run, with the fold used for live
/// inference marked explicitly.
#[derive(Debug, Clone)]
pub struct ModelEnsemble {
    folds: Vec<FoldModel>,
    live: FoldId,
    oof: Vec<Option<f64>>,
    targets: Vec<f64>,
}

/// Serializable summary of the out-of-fold run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OofDiagnostics {
    pub folds: Vec<FoldMetrics>,
    /// Correlation between out-of-fold predictions and realized targets
    pub information_coefficient: Option<f64>,
    pub live_fold: FoldId,
}

impl ModelEnsemble {
    pub fn live_model(&self) -> &GradientBoostedRegressor {
        &self.live_fold().model
    }

    pub fn live_fold(&self) -> &FoldModel {
        // `live` is always one of the stored fold ids
        &self.folds[self.live.0]
    }

    pub fn fold(&self, id: FoldId) -> Option<&FoldModel> {
        self.folds.iter().find(|f| f.id == id)
    }

    pub fn folds(&self) -> &[FoldModel] {
        &self.folds
    }

    /// Held-out prediction per training row; `None` for rows never tested.
    pub fn out_of_fold(&self) -> &[Option<f64>] {
        &self.oof
    }

    pub fn information_coefficient(&self) -> Option<f64> {
        let (pred, real): (Vec<f64>, Vec<f64>) = self
            .oof
            .iter()
            .zip(&self.targets)
            .filter_map(|(p, r)| p.map(|p| (p, *r)))
            .unzip();
        correlation(&pred, &real)
    }

    pub fn diagnostics(&self) -> OofDiagnostics {
        OofDiagnostics {
            folds: self.folds.iter().map(|f| f.metrics).collect(),
            information_coefficient: self.information_coefficient(),
            live_fold: self.live,
        }
    }
}

fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || a.len() != b.len() {
        return None;
    }
    let (ma, mb) = (stats::mean(a), stats::mean(b));
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    if va <= 0.0 || vb <= 0.0 {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}

/// Fit one boosted model per walk-forward fold, in parallel.
///
/// Fold `k` is seeded with `params.seed + k`. The last fold becomes the live
/// model. Any fold failing (too few rows, cancellation) fails the whole run.
pub fn fit_walk_forward(
    training: &TrainingSet,
    params: &ModelParams,
    n_splits: usize,
    cancel: &CancelFlag,
) -> EngineResult<ModelEnsemble> {
    if training.is_empty() {
        return Err(EngineError::InsufficientData("training set is empty".to_string()));
    }
    let splits = walk_forward_splits(training.len(), n_splits)?;
    let x = training.features();
    let y = training.targets();

    let folds: Vec<FoldModel> = splits
        .into_par_iter()
        .map(|split| {
            if split.train.len() < 2 {
                return Err(EngineError::InsufficientData(format!(
                    "fold {} has only {} training rows",
                    split.id.0,
                    split.train.len()
                )));
            }
            let fold_params = ModelParams {
                seed: params.seed.wrapping_add(split.id.0 as u64),
                ..params.clone()
            };
            let model = GradientBoostedRegressor::fit(
                &x[split.train.clone()],
                &y[split.train.clone()],
                &fold_params,
                cancel,
            )?;
            let predicted = model.predict_many(&x[split.test.clone()]);
            let metrics = FoldMetrics::evaluate(&predicted, &y[split.test.clone()], split.train.len());
            debug!(
                "Fold {}: train {} rows, test {} rows, rmse {:.5}, hit rate {:.2}",
                split.id.0, metrics.n_train, metrics.n_test, metrics.rmse, metrics.hit_rate
            );
            Ok(FoldModel {
                id: split.id,
                train: split.train,
                test: split.test,
                model,
                metrics,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let mut oof = vec![None; training.len()];
    for fold in &folds {
        for i in fold.test.clone() {
            oof[i] = Some(fold.model.predict(&x[i]));
        }
    }
    let live = folds
        .last()
        .map(|f| f.id)
        .ok_or_else(|| EngineError::InsufficientData("no folds were fitted".to_string()))?;

    let ensemble = ModelEnsemble {
        folds,
        live,
        oof,
        targets: y,
    };
    info!(
        "Walk-forward fit: {} folds over {} rows, OOF IC {}",
        ensemble.folds.len(),
        training.len(),
        ensemble
            .information_coefficient()
            .map(|ic| format!("{ic:.3}"))
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(ensemble)
}

/// Score the most recent usable cross-section with the live model and clip
/// the raw predictions to the `clip` percentile band across assets.
pub fn predict_expected_returns(
    ensemble: &ModelEnsemble,
    features: &FeaturePanel,
    clip: (f64, f64),
) -> EngineResult<ExpectedReturns> {
    let t = features.latest_valid_date().ok_or_else(|| {
        EngineError::InsufficientData("no date with a usable cross-section to score".to_string())
    })?;
    let section = features.cross_section(t);
    let model = ensemble.live_model();

    let rows: Vec<FeatureRow> = section.iter().map(|(_, r)| **r).collect();
    let raw = model.predict_many(&rows);
    let lo = stats::quantile(&raw, clip.0).unwrap_or(f64::NEG_INFINITY);
    let hi = stats::quantile(&raw, clip.1).unwrap_or(f64::INFINITY);
    let values: Vec<f64> = raw.iter().map(|v| v.clamp(lo, hi)).collect();

    Ok(ExpectedReturns {
        date: features.dates()[t],
        assets: section
            .iter()
            .map(|(a, _)| features.assets()[*a].clone())
            .collect(),
        values,
        features: rows,
    })
}
