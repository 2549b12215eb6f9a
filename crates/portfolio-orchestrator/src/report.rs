use backtest_engine::BacktestSummary;
use chrono::NaiveDate;
use ml_engine::OofDiagnostics;
use portfolio_core::{Allocation, AllocationSource, WeightVector};
use risk_estimator::RiskContribution;
use serde::{Deserialize, Serialize};

use crate::summary::{LimitAlert, PortfolioSummary};

/// Everything the report/UI collaborators receive for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    /// Date of the cross-section the allocation was scored on; `None` on the
    /// heuristic path
    pub as_of: Option<NaiveDate>,
    pub source: AllocationSource,
    pub allocations: Vec<Allocation>,
    pub summary: PortfolioSummary,
    pub alerts: Vec<LimitAlert>,
    pub diagnostics: Option<OofDiagnostics>,
    pub ex_ante_vol: Option<f64>,
    pub risk_contributions: Vec<RiskContribution>,
    pub backtest: Option<BacktestSummary>,
}

impl AllocationReport {
    pub fn is_heuristic(&self) -> bool {
        matches!(self.source, AllocationSource::Heuristic { .. })
    }

    pub fn total_weight(&self) -> f64 {
        self.allocations.iter().map(|a| a.weight).sum()
    }

    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.allocations
            .iter()
            .find(|a| a.ticker == ticker)
            .map(|a| a.weight)
    }

    pub fn weights(&self) -> WeightVector {
        weights_from_allocations(&self.allocations)
    }

    pub fn with_backtest(mut self, backtest: BacktestSummary) -> Self {
        self.backtest = Some(backtest);
        self
    }
}

pub(crate) fn weights_from_allocations(allocations: &[Allocation]) -> WeightVector {
    let (assets, weights) = allocations
        .iter()
        .map(|a| (a.ticker.clone(), a.weight))
        .unzip();
    // Allocation weights are always finite
    WeightVector::new(assets, weights).unwrap_or_default()
}
