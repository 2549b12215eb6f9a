use nalgebra::DVector;
use portfolio_core::{CovarianceMatrix, WeightVector};
use serde::{Deserialize, Serialize};

pub const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    pub ticker: String,
    /// Share of total portfolio variance, sums to 1 across assets
    pub share: f64,
}

fn aligned_weights(weights: &WeightVector, cov: &CovarianceMatrix) -> DVector<f64> {
    DVector::from_iterator(
        cov.assets.len(),
        cov.assets.iter().map(|a| weights.get(a).unwrap_or(0.0)),
    )
}

/// Fractional contribution of each covariance asset to portfolio variance,
/// `w ⊙ Σw / wᵗΣw`. All zeros when the portfolio has no variance.
pub fn risk_contributions(weights: &WeightVector, cov: &CovarianceMatrix) -> Vec<RiskContribution> {
    let w = aligned_weights(weights, cov);
    let marginal = &cov.matrix * &w;
    let total = w.dot(&marginal);

    cov.assets
        .iter()
        .enumerate()
        .map(|(i, ticker)| RiskContribution {
            ticker: ticker.clone(),
            share: if total > 0.0 { w[i] * marginal[i] / total } else { 0.0 },
        })
        .collect()
}

/// Ex-ante annualized volatility `sqrt(252 · wᵗΣw)` from a daily covariance.
pub fn annualized_volatility(weights: &WeightVector, cov: &CovarianceMatrix) -> f64 {
    let variance = cov.portfolio_variance(aligned_weights(weights, cov).as_slice());
    (TRADING_DAYS * variance.max(0.0)).sqrt()
}
