use clarabel::algebra::*;
use clarabel::solver::*;
use nalgebra::DMatrix;
use portfolio_core::{EngineError, EngineResult};
use tracing::debug;

use crate::settings::OptimizerSettings;

/// Weights below this magnitude are reported as exactly zero.
pub const ZERO_WEIGHT_TOL: f64 = 1e-6;

/// Maximize `μᵗw − λ·wᵗΣw` subject to full investment and per-asset bounds.
///
/// Posed for the interior-point solver as
/// `min ½wᵗ(2λΣ)w − μᵗw` with `Σw = 1` and `lb ≤ w ≤ max_weight`.
pub fn solve_mean_variance(
    mu: &[f64],
    cov: &DMatrix<f64>,
    settings: &OptimizerSettings,
) -> EngineResult<Vec<f64>> {
    let n = mu.len();
    if n == 0 {
        return Err(EngineError::InsufficientData("no assets to optimize".to_string()));
    }
    if cov.nrows() != n || cov.ncols() != n {
        return Err(EngineError::InvalidInput(format!(
            "covariance is {}x{} for {} expected returns",
            cov.nrows(),
            cov.ncols(),
            n
        )));
    }
    if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidInput(
            "non-finite expected return or covariance entry".to_string(),
        ));
    }
    let lb = settings.lower_bound();
    if (n as f64) * settings.max_weight < 1.0 - 1e-12 || (n as f64) * lb > 1.0 {
        return Err(EngineError::SolverInfeasible(format!(
            "{} assets cannot sum to 1 within [{}, {}]",
            n, lb, settings.max_weight
        )));
    }

    // Quadratic term, upper triangle in CSC form
    let scale = 2.0 * settings.risk_aversion;
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
        for i in 0..=j {
            let val = scale * 0.5 * (cov[(i, j)] + cov[(j, i)]);
            if val.abs() > 1e-14 {
                p_data.push(val);
                p_indices.push(i);
            }
        }
        p_indptr.push(p_data.len());
    }
    let p = CscMatrix::new(n, n, p_indptr, p_indices, p_data);
    let q: Vec<f64> = mu.iter().map(|m| -m).collect();

    // Rows: [sum(w) = 1; -w <= -lb; w <= max_weight]
    let mut a_data = Vec::with_capacity(3 * n);
    let mut a_indices = Vec::with_capacity(3 * n);
    let mut a_indptr = vec![0];
    for j in 0..n {
        a_data.push(1.0);
        a_indices.push(0);
        a_data.push(-1.0);
        a_indices.push(1 + j);
        a_data.push(1.0);
        a_indices.push(1 + n + j);
        a_indptr.push(a_data.len());
    }
    let a = CscMatrix::new(1 + 2 * n, n, a_indptr, a_indices, a_data);

    let mut b = vec![1.0];
    b.extend(std::iter::repeat(-lb).take(n));
    b.extend(std::iter::repeat(settings.max_weight).take(n));

    let cones = [ZeroConeT(1), NonnegativeConeT(2 * n)];

    let solver_settings = DefaultSettingsBuilder::default()
        .max_iter(settings.max_iter)
        .verbose(false)
        .build()
        .map_err(|e| EngineError::SolverInfeasible(format!("Failed to build settings: {}", e)))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, solver_settings).map_err(|e| {
        EngineError::SolverInfeasible(format!("Failed to create solver: {:?}", e))
    })?;
    solver.solve();

    let status = &solver.solution.status;
    debug!("Mean-variance solve over {} assets: {:?}", n, status);
    if !matches!(status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
        return Err(EngineError::SolverInfeasible(format!(
            "Optimization failed with status: {:?}",
            status
        )));
    }

    let weights: Vec<f64> = solver
        .solution
        .x
        .iter()
        .map(|&w| {
            let w = w.clamp(lb, settings.max_weight);
            if w.abs() < ZERO_WEIGHT_TOL {
                0.0
            } else {
                w
            }
        })
        .collect();
    if weights.iter().all(|w| *w == 0.0) {
        return Err(EngineError::SolverInfeasible(
            "solver returned an empty portfolio".to_string(),
        ));
    }
    Ok(weights)
}
