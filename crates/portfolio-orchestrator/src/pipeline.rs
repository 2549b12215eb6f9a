use ml_engine::{build_training_set, fit_walk_forward, predict_expected_returns, ModelParams, OofDiagnostics};
use portfolio_core::{
    Allocation, AllocationSource, CancelFlag, CovarianceMatrix, EngineConfig, EngineError, EngineResult,
    ExpectedReturns, FallbackCause, InvestorProfile, PricePanel, WeightVector,
};
use portfolio_optimizer::{fallback_allocation, optimize_portfolio, OptimizerSettings};
use risk_estimator::{annualized_volatility, estimate_covariance, risk_contributions};
use signal_engine::SignalEngine;
use tracing::{info, warn};

use crate::reasons::signal_reason;
use crate::report::{weights_from_allocations, AllocationReport};
use crate::summary::{check_limits, summarize_weights};

/// Intermediate products of a successful predictive run.
#[derive(Debug, Clone)]
pub struct PredictiveOutcome {
    pub weights: WeightVector,
    pub expected: ExpectedReturns,
    pub covariance: CovarianceMatrix,
    pub diagnostics: OofDiagnostics,
}

/// Signal → training set → walk-forward model → covariance → optimizer,
/// resolving every expected failure through the heuristic allocation.
#[derive(Debug, Clone)]
pub struct PortfolioPipeline {
    config: EngineConfig,
}

impl PortfolioPipeline {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the predictive path only. Errors are returned unresolved.
    pub fn run_predictive(&self, prices: &PricePanel, cancel: &CancelFlag) -> EngineResult<PredictiveOutcome> {
        let config = &self.config;
        let window = prices.trailing_calendar_window(config.lookback_days);
        info!(
            "Pipeline start: {} dates x {} assets after {}-day lookback trim",
            window.len(),
            window.n_assets(),
            config.lookback_days
        );

        let features = SignalEngine::from_config(config).build_feature_panel(&window)?;
        cancel.check()?;

        let training = build_training_set(&window, &features, config.horizon_days)?
            .trailing_dates(config.retrain_window);
        if training.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "no training rows with a {}-day forward return",
                config.horizon_days
            )));
        }
        info!(
            "Training set: {} rows over {} dates",
            training.len(),
            training.n_dates()
        );
        cancel.check()?;

        let ensemble = fit_walk_forward(&training, &ModelParams::from_config(config), config.n_splits, cancel)?;
        let expected = predict_expected_returns(&ensemble, &features, config.prediction_clip)?;
        cancel.check()?;

        let covariance = estimate_covariance(&window, config.retrain_window)?;
        cancel.check()?;

        let weights = optimize_portfolio(&expected, &covariance, &OptimizerSettings::from_config(config))?;

        Ok(PredictiveOutcome {
            weights,
            expected,
            covariance,
            diagnostics: ensemble.diagnostics(),
        })
    }

    /// Full request: validate the profile, try the predictive path and fall
    /// back to the risk-tier allocation on any expected failure.
    pub fn run(
        &self,
        prices: &PricePanel,
        profile: &InvestorProfile,
        cancel: &CancelFlag,
    ) -> EngineResult<AllocationReport> {
        profile.validate()?;
        let outcome = self.run_predictive(prices, cancel);
        self.resolve(outcome, profile)
    }

    /// Turn a predictive outcome into a report. `InvalidInput` propagates;
    /// every other error becomes a heuristic report naming its cause.
    pub fn resolve(
        &self,
        outcome: EngineResult<PredictiveOutcome>,
        profile: &InvestorProfile,
    ) -> EngineResult<AllocationReport> {
        match outcome {
            Ok(outcome) => Ok(self.predictive_report(outcome)),
            Err(err) => match err.fallback_cause() {
                Some(cause) => {
                    warn!("Predictive allocation failed ({err}); using heuristic fallback");
                    Ok(self.fallback_report(profile, cause))
                }
                None => Err(err),
            },
        }
    }

    pub fn fallback_report(&self, profile: &InvestorProfile, cause: FallbackCause) -> AllocationReport {
        let allocations = fallback_allocation(profile, cause);
        let weights = weights_from_allocations(&allocations);
        AllocationReport {
            as_of: None,
            source: AllocationSource::Heuristic { cause },
            summary: summarize_weights(&weights),
            alerts: check_limits(&weights, &self.config, None),
            allocations,
            diagnostics: None,
            ex_ante_vol: None,
            risk_contributions: Vec::new(),
            backtest: None,
        }
    }

    fn predictive_report(&self, outcome: PredictiveOutcome) -> AllocationReport {
        let PredictiveOutcome {
            weights,
            expected,
            covariance,
            diagnostics,
        } = outcome;

        let allocations: Vec<Allocation> = weights
            .sorted_desc()
            .into_iter()
            .filter(|(_, w)| *w != 0.0)
            .map(|(ticker, weight)| {
                let reason = expected
                    .features_of(&ticker)
                    .map(signal_reason)
                    .unwrap_or_else(|| "Top signals: n/a".to_string());
                Allocation { ticker, weight, reason }
            })
            .collect();

        let vol = annualized_volatility(&weights, &covariance);
        info!(
            "Predictive allocation as of {}: {} holdings, ex-ante vol {:.2}%",
            expected.date,
            allocations.len(),
            vol * 100.0
        );

        AllocationReport {
            as_of: Some(expected.date),
            source: AllocationSource::Predictive,
            summary: summarize_weights(&weights),
            alerts: check_limits(&weights, &self.config, Some(vol)),
            allocations,
            diagnostics: Some(diagnostics),
            ex_ante_vol: Some(vol),
            risk_contributions: risk_contributions(&weights, &covariance),
            backtest: None,
        }
    }
}
