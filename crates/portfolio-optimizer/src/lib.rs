pub mod concentration;
pub mod costs;
pub mod fallback;
pub mod mean_variance;
pub mod settings;

pub use concentration::{apply_concentration_cap, is_compliant, normalize_allocation};
pub use costs::{transaction_cost, turnover};
pub use fallback::{fallback_allocation, theme_ticker, RiskTier};
pub use mean_variance::solve_mean_variance;
pub use settings::OptimizerSettings;

use portfolio_core::{CovarianceMatrix, EngineError, EngineResult, ExpectedReturns, WeightVector};
use tracing::info;

/// Solve the constrained mean-variance problem over the assets present in
/// both `expected` and `cov`, then enforce the top-3 concentration cap.
pub fn optimize_portfolio(
    expected: &ExpectedReturns,
    cov: &CovarianceMatrix,
    settings: &OptimizerSettings,
) -> EngineResult<WeightVector> {
    let (assets, mu): (Vec<String>, Vec<f64>) = expected
        .assets
        .iter()
        .zip(&expected.values)
        .filter(|(a, _)| cov.index_of(a).is_some())
        .map(|(a, v)| (a.clone(), *v))
        .unzip();
    if assets.is_empty() {
        return Err(EngineError::InsufficientData(
            "no asset has both an expected return and a covariance estimate".to_string(),
        ));
    }
    let sigma = cov.subset(&assets);

    let raw = solve_mean_variance(&mu, &sigma.matrix, settings)?;
    let solved = WeightVector::new(assets, raw)?.normalized();
    let capped = apply_concentration_cap(
        &solved,
        settings.lower_bound(),
        settings.max_weight,
        settings.top3_max,
    )?;

    info!(
        "Optimized {} assets: {} holdings, largest {:.3}, top-3 {:.3}",
        capped.len(),
        capped.weights().iter().filter(|w| **w != 0.0).count(),
        capped.largest(),
        capped.top_n_sum(3)
    );
    Ok(capped)
}
