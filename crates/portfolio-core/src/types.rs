use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, FallbackCause};
use crate::panel::FeatureRow;

/// Investor profile supplied by the profile-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorProfile {
    /// 0 = conservative, 10 = aggressive
    pub risk_tolerance: u8,
    pub investment_horizon_years: f64,
    #[serde(default)]
    pub themes: Vec<String>,
}

impl InvestorProfile {
    pub fn new(risk_tolerance: u8, investment_horizon_years: f64, themes: Vec<String>) -> EngineResult<Self> {
        let profile = Self {
            risk_tolerance,
            investment_horizon_years,
            themes,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.risk_tolerance > 10 {
            return Err(EngineError::InvalidInput(format!(
                "risk_tolerance {} outside 0..=10",
                self.risk_tolerance
            )));
        }
        if !self.investment_horizon_years.is_finite() || self.investment_horizon_years < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "investment horizon {} must be a non-negative number of years",
                self.investment_horizon_years
            )));
        }
        Ok(())
    }
}

impl Default for InvestorProfile {
    fn default() -> Self {
        Self {
            risk_tolerance: 5,
            investment_horizon_years: 7.0,
            themes: Vec::new(),
        }
    }
}

/// Asset → weight mapping produced by the optimizer or the fallback path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightVector {
    assets: Vec<String>,
    weights: Vec<f64>,
}

impl WeightVector {
    pub fn new(assets: Vec<String>, weights: Vec<f64>) -> EngineResult<Self> {
        if assets.len() != weights.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} assets but {} weights",
                assets.len(),
                weights.len()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(EngineError::InvalidInput(format!("non-finite weight {w}")));
        }
        Ok(Self { assets, weights })
    }

    pub fn from_pairs<S: Into<String>>(pairs: Vec<(S, f64)>) -> EngineResult<Self> {
        let (assets, weights): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(a, w)| (a.into(), w)).unzip();
        Self::new(assets, weights)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == ticker)
            .map(|i| self.weights[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.assets
            .iter()
            .map(|a| a.as_str())
            .zip(self.weights.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn largest(&self) -> f64 {
        self.weights.iter().cloned().fold(0.0, f64::max)
    }

    /// Sum of the `n` largest weights.
    pub fn top_n_sum(&self, n: usize) -> f64 {
        let mut sorted = self.weights.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        sorted.iter().take(n).sum()
    }

    /// Entries ordered by descending weight, ties broken by ticker.
    pub fn sorted_desc(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .iter()
            .map(|(a, w)| (a.to_string(), w))
            .collect();
        pairs.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        pairs
    }

    /// Rescale so weights sum to 1. Leaves an all-zero vector untouched.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total.abs() < f64::EPSILON {
            return self.clone();
        }
        Self {
            assets: self.assets.clone(),
            weights: self.weights.iter().map(|w| w / total).collect(),
        }
    }
}

/// One line of the allocation list handed to report/UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub weight: f64,
    pub reason: String,
}

/// Where an allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllocationSource {
    Predictive,
    Heuristic { cause: FallbackCause },
}

/// Model-estimated forward returns for the latest cross-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturns {
    pub date: NaiveDate,
    pub assets: Vec<String>,
    pub values: Vec<f64>,
    /// Normalized features each estimate was predicted from.
    pub features: Vec<FeatureRow>,
}

impl ExpectedReturns {
    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == ticker)
            .map(|i| self.values[i])
    }

    pub fn features_of(&self, ticker: &str) -> Option<&FeatureRow> {
        self.assets
            .iter()
            .position(|a| a == ticker)
            .map(|i| &self.features[i])
    }

    /// Tickers ordered from highest to lowest expected return.
    pub fn ranked(&self) -> Vec<&str> {
        let mut idx: Vec<usize> = (0..self.assets.len()).collect();
        idx.sort_by(|&a, &b| {
            self.values[b]
                .partial_cmp(&self.values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        idx.into_iter().map(|i| self.assets[i].as_str()).collect()
    }
}

/// Symmetric covariance estimate over the assets that survived filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    pub assets: Vec<String>,
    pub matrix: DMatrix<f64>,
    /// Blend weight on the structured target, in [0, 1].
    pub shrinkage: f64,
    /// Return observations the estimate used.
    pub observations: usize,
}

impl CovarianceMatrix {
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == ticker)
    }

    /// Restrict to `tickers`, in the given order. Unknown tickers are skipped.
    pub fn subset(&self, tickers: &[String]) -> CovarianceMatrix {
        let idx: Vec<usize> = tickers.iter().filter_map(|t| self.index_of(t)).collect();
        let matrix = DMatrix::from_fn(idx.len(), idx.len(), |i, j| self.matrix[(idx[i], idx[j])]);
        CovarianceMatrix {
            assets: idx.iter().map(|&i| self.assets[i].clone()).collect(),
            matrix,
            shrinkage: self.shrinkage,
            observations: self.observations,
        }
    }

    /// `wᵗΣw` for weights aligned to `self.assets`.
    pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
        let n = self.assets.len().min(weights.len());
        let w = DVector::from_column_slice(&weights[..n]);
        w.dot(&(self.matrix.view((0, 0), (n, n)) * &w))
    }
}

/// Shared cancellation signal for long-running pipeline stages.
///
/// Cloned into worker tasks; stages poll it between units of work and stop
/// with [`EngineError::Cancelled`] once raised.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
