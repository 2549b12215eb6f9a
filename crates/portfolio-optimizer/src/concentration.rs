use portfolio_core::{EngineError, EngineResult, WeightVector};
use tracing::debug;

/// Tolerance used when checking caps and the unit sum.
pub const CAP_TOL: f64 = 1e-9;

const MAX_PASSES: usize = 50;

/// Whether `weights` sums to 1, stays inside `[lower_bound, max_weight]`
/// and keeps its three largest weights under `top3_max`.
pub fn is_compliant(weights: &WeightVector, lower_bound: f64, max_weight: f64, top3_max: f64) -> bool {
    (weights.total() - 1.0).abs() <= CAP_TOL
        && weights.largest() <= max_weight + CAP_TOL
        && weights.weights().iter().all(|w| *w >= lower_bound - CAP_TOL)
        && weights.top_n_sum(3) <= top3_max + CAP_TOL
}

/// Pull the three largest weights under `top3_max`.
///
/// One pass scales exactly the three largest weights (ties broken by
/// ticker) by `top3_max / sum`, re-clips every weight to
/// `[lower_bound, max_weight]` and restores the unit sum. Long-only vectors
/// are renormalized by their total. With short legs the total can sit near
/// or below zero, so the residual is spread over the room each weight has
/// left before its bound instead. Passes repeat until both caps hold.
/// Renormalization cannot move mass onto zero weights, so a vector
/// concentrated in too few names is finally blended with the equal-weight
/// vector, using the smallest blend that satisfies both caps. A compliant
/// vector is returned unchanged.
pub fn apply_concentration_cap(
    weights: &WeightVector,
    lower_bound: f64,
    max_weight: f64,
    top3_max: f64,
) -> EngineResult<WeightVector> {
    if is_compliant(weights, lower_bound, max_weight, top3_max) {
        return Ok(weights.clone());
    }
    let n = weights.len();
    let k = n.min(3);
    if n == 0
        || lower_bound > max_weight
        || (n as f64) * max_weight < 1.0 - CAP_TOL
        || (n as f64) * lower_bound > 1.0 + CAP_TOL
        || (k as f64) / (n as f64) > top3_max + CAP_TOL
    {
        return Err(EngineError::SolverInfeasible(format!(
            "{} assets cannot satisfy bounds [{}, {}] and top-3 cap {}",
            n, lower_bound, max_weight, top3_max
        )));
    }

    let assets = weights.assets().to_vec();
    let mut w = weights.weights().to_vec();
    for pass in 0..MAX_PASSES {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            w[b].partial_cmp(&w[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| assets[a].cmp(&assets[b]))
        });
        let top_sum: f64 = order.iter().take(3).map(|&i| w[i]).sum();
        if top_sum > top3_max && top_sum > 0.0 {
            let factor = top3_max / top_sum;
            for &i in order.iter().take(3) {
                w[i] *= factor;
            }
        }
        for v in w.iter_mut() {
            *v = v.clamp(lower_bound, max_weight);
        }
        if lower_bound >= 0.0 {
            let total: f64 = w.iter().sum();
            if total <= 0.0 {
                return Err(EngineError::SolverInfeasible(
                    "concentration correction emptied the portfolio".to_string(),
                ));
            }
            for v in w.iter_mut() {
                *v /= total;
            }
        } else {
            spread_residual(&mut w, lower_bound, max_weight);
        }

        let candidate = WeightVector::new(assets.clone(), w.clone())?;
        if is_compliant(&candidate, lower_bound, max_weight, top3_max) {
            debug!("Concentration cap satisfied after {} pass(es)", pass + 1);
            return Ok(candidate);
        }
    }

    let current = WeightVector::new(assets, w)?;
    let blended = blend_with_equal_weight(&current, lower_bound, max_weight, top3_max)?;
    debug!(
        "Concentration cap reached by equal-weight blend after {} passes",
        MAX_PASSES
    );
    Ok(blended)
}

/// Move `1 - Σw` onto the weights in proportion to the room each has left
/// before the bound in that direction. Bounds hold afterwards because
/// `n·lower ≤ 1 ≤ n·upper`.
fn spread_residual(w: &mut [f64], lower: f64, upper: f64) {
    let residual = 1.0 - w.iter().sum::<f64>();
    let room: Vec<f64> = if residual > 0.0 {
        w.iter().map(|v| upper - v).collect()
    } else {
        w.iter().map(|v| v - lower).collect()
    };
    let total_room: f64 = room.iter().sum();
    if total_room <= 0.0 {
        return;
    }
    for (v, r) in w.iter_mut().zip(&room) {
        *v = (*v + residual * r / total_room).clamp(lower, upper);
    }
}

/// `(1 - a)·w + a·(1/n)` with the smallest `a` keeping both caps. Top-k sums
/// and the maximum are convex and the minimum is concave, so the blend stays
/// inside the bounds whenever both endpoints do.
fn blend_with_equal_weight(
    weights: &WeightVector,
    lower_bound: f64,
    max_weight: f64,
    top3_max: f64,
) -> EngineResult<WeightVector> {
    let n = weights.len() as f64;
    let k = weights.len().min(3) as f64;
    let top = weights.top_n_sum(3);
    let largest = weights.largest();

    let mut alpha: f64 = 0.0;
    if top > top3_max {
        alpha = alpha.max((top - top3_max) / (top - k / n));
    }
    if largest > max_weight {
        alpha = alpha.max((largest - max_weight) / (largest - 1.0 / n));
    }
    let alpha = alpha.clamp(0.0, 1.0);

    let blended: Vec<f64> = weights
        .weights()
        .iter()
        .map(|w| (1.0 - alpha) * w + alpha / n)
        .collect();
    let candidate = WeightVector::new(weights.assets().to_vec(), blended)?;
    if is_compliant(&candidate, lower_bound, max_weight, top3_max) {
        Ok(candidate)
    } else {
        Err(EngineError::SolverInfeasible(format!(
            "concentration cap not reached (top-3 {:.6}, largest {:.6})",
            candidate.top_n_sum(3),
            candidate.largest()
        )))
    }
}

/// Rescale an externally supplied allocation to sum to 1, dropping
/// non-positive entries.
pub fn normalize_allocation(weights: &WeightVector) -> EngineResult<WeightVector> {
    let kept: Vec<(String, f64)> = weights
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(a, w)| (a.to_string(), w))
        .collect();
    if kept.is_empty() {
        return Err(EngineError::InvalidInput(
            "allocation has no positive weights".to_string(),
        ));
    }
    Ok(WeightVector::from_pairs(kept)?.normalized())
}
