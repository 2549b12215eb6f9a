use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Gradient-boosted tree hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Shrinkage applied to every tree's contribution
    pub learning_rate: f64,
    /// Fraction of rows sampled per round (1.0 = no subsampling)
    pub subsample: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 3,
            learning_rate: 0.05,
            subsample: 1.0,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Engine configuration, fixed at process start and passed explicitly into
/// every pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Forward-return horizon in trading days
    pub horizon_days: usize,
    /// Calendar days of price history considered per run
    pub lookback_days: i64,
    /// Trailing trading dates used for training rows and the covariance sample
    pub retrain_window: usize,
    pub transaction_cost_bps: f64,
    pub max_weight: f64,
    /// Cap on the sum of the three largest weights
    pub top3_max: f64,
    /// Annualized ex-ante volatility above which an alert is raised
    pub target_vol: f64,
    pub seed: u64,
    /// Walk-forward folds
    pub n_splits: usize,
    pub risk_aversion: f64,
    pub long_only: bool,
    /// Largest short position when `long_only` is false
    pub short_cap: f64,
    /// Cross-sectional winsorization band for factors
    pub winsor_quantiles: (f64, f64),
    /// Cross-sectional clipping band for raw predictions
    pub prediction_clip: (f64, f64),
    pub pipeline_timeout_secs: u64,
    pub model: ModelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon_days: 21,
            lookback_days: 365 * 5,
            retrain_window: 252 * 2,
            transaction_cost_bps: 5.0,
            max_weight: 0.25,
            top3_max: 0.60,
            target_vol: 0.10,
            seed: 42,
            n_splits: 5,
            risk_aversion: 1.0,
            long_only: true,
            short_cap: 0.10,
            winsor_quantiles: (0.01, 0.99),
            prediction_clip: (0.05, 0.95),
            pipeline_timeout_secs: 120,
            model: ModelConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PORTFOLIO_*` environment variables.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> EngineResult<Self> {
        let d = Self::default();
        let config = Self {
            horizon_days: env_or("PORTFOLIO_HORIZON_DAYS", d.horizon_days),
            lookback_days: env_or("PORTFOLIO_LOOKBACK_DAYS", d.lookback_days),
            retrain_window: env_or("PORTFOLIO_RETRAIN_WINDOW", d.retrain_window),
            transaction_cost_bps: env_or("PORTFOLIO_TRANSACTION_COST_BPS", d.transaction_cost_bps),
            max_weight: env_or("PORTFOLIO_MAX_WEIGHT", d.max_weight),
            top3_max: env_or("PORTFOLIO_TOP3_MAX", d.top3_max),
            target_vol: env_or("PORTFOLIO_TARGET_VOL", d.target_vol),
            seed: env_or("PORTFOLIO_SEED", d.seed),
            n_splits: env_or("PORTFOLIO_N_SPLITS", d.n_splits),
            risk_aversion: env_or("PORTFOLIO_RISK_AVERSION", d.risk_aversion),
            long_only: env_or("PORTFOLIO_LONG_ONLY", d.long_only),
            short_cap: env_or("PORTFOLIO_SHORT_CAP", d.short_cap),
            pipeline_timeout_secs: env_or("PORTFOLIO_TIMEOUT_SECS", d.pipeline_timeout_secs),
            model: ModelConfig {
                n_estimators: env_or("PORTFOLIO_N_ESTIMATORS", d.model.n_estimators),
                max_depth: env_or("PORTFOLIO_MAX_DEPTH", d.model.max_depth),
                learning_rate: env_or("PORTFOLIO_LEARNING_RATE", d.model.learning_rate),
                ..d.model.clone()
            },
            ..d
        };
        config.validate()?;
        Ok(config)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidInput(msg));

        if self.horizon_days == 0 {
            return invalid("horizon_days must be positive".to_string());
        }
        if self.n_splits < 2 {
            return invalid(format!("n_splits must be at least 2, got {}", self.n_splits));
        }
        if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
            return invalid(format!("max_weight {} outside (0, 1]", self.max_weight));
        }
        if !(self.top3_max > 0.0 && self.top3_max <= 1.0) {
            return invalid(format!("top3_max {} outside (0, 1]", self.top3_max));
        }
        if self.risk_aversion < 0.0 || !self.risk_aversion.is_finite() {
            return invalid(format!("risk_aversion {} must be non-negative", self.risk_aversion));
        }
        if self.short_cap < 0.0 {
            return invalid(format!("short_cap {} must be non-negative", self.short_cap));
        }
        for (name, (lo, hi)) in [
            ("winsor_quantiles", self.winsor_quantiles),
            ("prediction_clip", self.prediction_clip),
        ] {
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
                return invalid(format!("{name} ({lo}, {hi}) is not an ordered band in [0, 1]"));
            }
        }
        if self.model.n_estimators == 0 || self.model.max_depth == 0 {
            return invalid("model needs at least one tree of depth >= 1".to_string());
        }
        if !(self.model.subsample > 0.0 && self.model.subsample <= 1.0) {
            return invalid(format!("subsample {} outside (0, 1]", self.model.subsample));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}, keeping default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
