use std::collections::BTreeMap;

use chrono::NaiveDate;
use portfolio_core::WeightVector;
use serde::{Deserialize, Serialize};

/// Sparse, date-keyed target weights. Each entry holds until the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightSchedule {
    decisions: BTreeMap<NaiveDate, WeightVector>,
}

impl WeightSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, weights: WeightVector) -> Option<WeightVector> {
        self.decisions.insert(date, weights)
    }

    pub fn with(mut self, date: NaiveDate, weights: WeightVector) -> Self {
        self.insert(date, weights);
        self
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.decisions.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &WeightVector)> {
        self.decisions.iter()
    }

    /// Latest decision dated on or before `date`.
    pub fn active_at(&self, date: NaiveDate) -> Option<&WeightVector> {
        self.decisions.range(..=date).next_back().map(|(_, w)| w)
    }
}

impl FromIterator<(NaiveDate, WeightVector)> for WeightSchedule {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, WeightVector)>>(iter: I) -> Self {
        Self {
            decisions: iter.into_iter().collect(),
        }
    }
}

/// One return date of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    /// Portfolio return over the day, before costs
    pub gross_return: f64,
    /// Gross return less the cost of the holding change into this day
    pub net_return: f64,
    /// Compounded gross growth of 1 unit
    pub cumulative: f64,
    /// Σ|Δw| of held weights into this day
    pub turnover: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub ann_return: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
    /// Deepest peak-to-trough loss, as a non-positive fraction
    pub max_dd: f64,
    pub turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub curve: Vec<EquityPoint>,
    pub summary: BacktestSummary,
    /// Same statistics on returns net of transaction costs
    pub net_summary: BacktestSummary,
}

impl BacktestResult {
    pub fn returns(&self) -> Vec<f64> {
        self.curve.iter().map(|p| p.gross_return).collect()
    }

    pub fn net_returns(&self) -> Vec<f64> {
        self.curve.iter().map(|p| p.net_return).collect()
    }

    pub fn return_on(&self, date: NaiveDate) -> Option<f64> {
        self.curve
            .iter()
            .find(|p| p.date == date)
            .map(|p| p.gross_return)
    }
}
