use nalgebra::DMatrix;
use portfolio_core::{CovarianceMatrix, EngineError, EngineResult, PricePanel};
use tracing::{debug, info};

use crate::shrinkage::ledoit_wolf;

/// Daily simple returns over the trailing `window` return dates, restricted
/// to complete cases: assets with any missing return are dropped first, then
/// any date still missing a value.
///
/// Returns the surviving tickers and the observations × assets matrix.
pub fn complete_case_returns(prices: &PricePanel, window: usize) -> (Vec<String>, DMatrix<f64>) {
    let recent = prices.tail(window + 1);
    let n_dates = recent.len();
    let returns: Vec<Vec<Option<f64>>> = (1..n_dates)
        .map(|t| (0..recent.n_assets()).map(|a| recent.simple_return(t, a)).collect())
        .collect();

    let keep: Vec<usize> = (0..recent.n_assets())
        .filter(|&a| returns.iter().all(|r| r[a].is_some()))
        .collect();
    let dropped = recent.n_assets() - keep.len();
    if dropped > 0 {
        debug!("Covariance sample drops {} assets with incomplete history", dropped);
    }

    let rows: Vec<Vec<f64>> = returns
        .iter()
        .filter_map(|r| keep.iter().map(|&a| r[a]).collect::<Option<Vec<f64>>>())
        .collect();
    let data: Vec<f64> = rows.iter().flatten().copied().collect();
    let matrix = DMatrix::from_row_slice(rows.len(), keep.len(), &data);
    let assets = keep.iter().map(|&a| recent.assets()[a].clone()).collect();
    (assets, matrix)
}

/// Shrinkage covariance of daily returns over the trailing `window` dates.
///
/// The surviving asset set may be a strict subset of the panel's assets.
pub fn estimate_covariance(prices: &PricePanel, window: usize) -> EngineResult<CovarianceMatrix> {
    let (assets, returns) = complete_case_returns(prices, window);
    if assets.len() < 2 {
        return Err(EngineError::DegenerateCovariance(format!(
            "{} asset(s) with complete returns over the last {} dates",
            assets.len(),
            window
        )));
    }
    if returns.nrows() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{} return observation(s) for the covariance estimate",
            returns.nrows()
        )));
    }

    let (matrix, shrinkage) = ledoit_wolf(&returns);
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::DegenerateCovariance(
            "covariance estimate has non-finite entries".to_string(),
        ));
    }
    info!(
        "Covariance over {} assets x {} days, shrinkage {:.3}",
        assets.len(),
        returns.nrows(),
        shrinkage
    );
    Ok(CovarianceMatrix {
        assets,
        matrix,
        shrinkage,
        observations: returns.nrows(),
    })
}
