use std::collections::BTreeSet;

use portfolio_core::WeightVector;

/// Sum of absolute weight changes over the union of tickers; a ticker
/// missing on one side counts as weight 0.
pub fn turnover(old: &WeightVector, new: &WeightVector) -> f64 {
    let tickers: BTreeSet<&str> = old
        .assets()
        .iter()
        .chain(new.assets())
        .map(|a| a.as_str())
        .collect();
    tickers
        .into_iter()
        .map(|t| (new.get(t).unwrap_or(0.0) - old.get(t).unwrap_or(0.0)).abs())
        .sum()
}

/// Fractional cost of moving from `old` to `new` at `bps` basis points per
/// unit of turnover.
pub fn transaction_cost(old: &WeightVector, new: &WeightVector, bps: f64) -> f64 {
    turnover(old, new) * bps / 10_000.0
}
