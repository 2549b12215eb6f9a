use chrono::NaiveDate;
use portfolio_core::{EngineConfig, EngineError, EngineResult, PricePanel};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::models::{BacktestResult, BacktestSummary, EquityPoint, WeightSchedule};

pub const TRADING_DAYS: f64 = 252.0;

/// Replays a weight schedule against a price panel.
pub struct Backtester {
    transaction_cost_bps: f64,
}

impl Backtester {
    pub fn new(transaction_cost_bps: f64) -> Self {
        Self {
            transaction_cost_bps,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.transaction_cost_bps)
    }

    /// Run the schedule over the union of price and decision dates.
    ///
    /// Prices are forward-filled onto decision dates. A decision dated `t`
    /// is held from `t + 1`, and the return on day `s` is the weights held
    /// on `s - 1` applied to the asset returns from `s - 1` to `s`, so a
    /// decision first earns on `t + 2`. Weights are zero before the first
    /// decision. Tickers without prices earn nothing.
    ///
    /// The curve covers every union date. The first date has no prior price
    /// and books a zero return, so annualization uses `N = union dates`.
    pub fn run(&self, prices: &PricePanel, schedule: &WeightSchedule) -> EngineResult<BacktestResult> {
        if schedule.is_empty() {
            return Err(EngineError::InvalidInput("weight schedule is empty".to_string()));
        }

        let mut dates: Vec<NaiveDate> = prices
            .dates()
            .iter()
            .copied()
            .chain(schedule.dates())
            .collect();
        dates.sort();
        dates.dedup();
        if dates.len() < 3 {
            return Err(EngineError::InsufficientData(format!(
                "{} dates cannot produce a lagged return series",
                dates.len()
            )));
        }

        for (date, weights) in schedule.iter() {
            let unknown: Vec<&str> = weights
                .assets()
                .iter()
                .filter(|a| prices.asset_index(a).is_none())
                .map(|a| a.as_str())
                .collect();
            if !unknown.is_empty() {
                warn!("Decision {} holds tickers without prices: {:?}", date, unknown);
            }
        }

        let n_assets = prices.n_assets();
        let reindexed: Vec<Vec<Option<f64>>> = dates
            .iter()
            .map(|d| {
                let pos = prices.dates().partition_point(|p| p <= d);
                if pos == 0 {
                    vec![None; n_assets]
                } else {
                    prices.row(pos - 1).to_vec()
                }
            })
            .collect();

        // Target weights in panel-asset order, forward-filled from decisions
        let targets: Vec<Vec<f64>> = dates
            .iter()
            .map(|d| match schedule.active_at(*d) {
                Some(w) => prices.assets().iter().map(|a| w.get(a).unwrap_or(0.0)).collect(),
                None => vec![0.0; n_assets],
            })
            .collect();

        // held[s] = targets[s - 1]
        let weight_at = |s: usize, a: usize| if s == 0 { 0.0 } else { targets[s - 1][a] };

        let mut curve = Vec::with_capacity(dates.len());
        curve.push(EquityPoint {
            date: dates[0],
            gross_return: 0.0,
            net_return: 0.0,
            cumulative: 1.0,
            turnover: 0.0,
        });
        let mut cumulative = 1.0;
        for s in 1..dates.len() {
            let gross: f64 = (0..n_assets)
                .map(|a| {
                    let r = match (reindexed[s - 1][a], reindexed[s][a]) {
                        (Some(p0), Some(p1)) => p1 / p0 - 1.0,
                        _ => 0.0,
                    };
                    weight_at(s - 1, a) * r
                })
                .sum();
            let turnover: f64 = (0..n_assets)
                .map(|a| (weight_at(s, a) - weight_at(s - 1, a)).abs())
                .sum();
            let cost = turnover * self.transaction_cost_bps / 10_000.0;
            cumulative *= 1.0 + gross;
            curve.push(EquityPoint {
                date: dates[s],
                gross_return: gross,
                net_return: gross - cost,
                cumulative,
                turnover,
            });
        }

        let gross: Vec<f64> = curve.iter().map(|p| p.gross_return).collect();
        let net: Vec<f64> = curve.iter().map(|p| p.net_return).collect();
        let turnover = curve.iter().map(|p| p.turnover).collect::<Vec<_>>().mean();
        let summary = summarize(&gross, turnover);
        let net_summary = summarize(&net, turnover);

        info!(
            "Backtest over {} days: ann return {:.4}, ann vol {:.4}, sharpe {:.2}, max dd {:.4}",
            curve.len(),
            summary.ann_return,
            summary.ann_vol,
            summary.sharpe,
            summary.max_dd
        );
        Ok(BacktestResult {
            curve,
            summary,
            net_summary,
        })
    }
}

/// Annualized statistics of a daily return series.
pub fn summarize(returns: &[f64], turnover: f64) -> BacktestSummary {
    if returns.is_empty() {
        return BacktestSummary::default();
    }
    let n = returns.len() as f64;
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    let ann_return = if growth > 0.0 {
        growth.powf(TRADING_DAYS / n) - 1.0
    } else {
        -1.0
    };

    let (mean, std) = if returns.len() > 1 {
        (returns.mean(), returns.std_dev())
    } else {
        (returns[0], 0.0)
    };
    let ann_vol = std * TRADING_DAYS.sqrt();
    let sharpe = if std > 0.0 {
        mean / std * TRADING_DAYS.sqrt()
    } else {
        0.0
    };

    BacktestSummary {
        ann_return,
        ann_vol,
        sharpe,
        max_dd: max_drawdown(returns),
        turnover: if turnover.is_finite() { turnover } else { 0.0 },
    }
}

/// `min(cum / cummax - 1)` over the compounded curve.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        if peak > 0.0 {
            worst = worst.min(cumulative / peak - 1.0);
        }
    }
    worst
}
