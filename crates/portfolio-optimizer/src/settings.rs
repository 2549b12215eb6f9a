use portfolio_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Constraint and objective knobs for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// λ in `μᵗw − λ·wᵗΣw`
    pub risk_aversion: f64,
    pub max_weight: f64,
    pub top3_max: f64,
    pub long_only: bool,
    /// Largest short position allowed when `long_only` is false
    pub short_cap: f64,
    pub max_iter: u32,
}

impl OptimizerSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            risk_aversion: config.risk_aversion,
            max_weight: config.max_weight,
            top3_max: config.top3_max,
            long_only: config.long_only,
            short_cap: config.short_cap,
            max_iter: 200,
        }
    }

    pub fn lower_bound(&self) -> f64 {
        if self.long_only {
            0.0
        } else {
            -self.short_cap
        }
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
