/// Cross-sectional statistics shared by the signal engine, the model
/// post-processing and the backtester.
///
/// Percentiles use linear interpolation between order statistics, so the
/// bounds derived from a small cross-section stay inside the observed range.
use statrs::statistics::Statistics;

/// Mean of a slice, 0.0 when empty.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.mean()
}

/// Sample standard deviation (n - 1), 0.0 with fewer than two points.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    data.std_dev()
}

/// Population standard deviation (n), 0.0 when empty.
pub fn population_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.population_std_dev()
}

/// Quantile `q` in [0, 1] with linear interpolation between neighbours.
pub fn quantile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Clip every value to the `[lower_q, upper_q]` quantile band of the slice.
pub fn winsorize(data: &mut [f64], lower_q: f64, upper_q: f64) {
    if data.is_empty() {
        return;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let lo = quantile_sorted(&sorted, lower_q);
    let hi = quantile_sorted(&sorted, upper_q);
    for v in data.iter_mut() {
        *v = v.clamp(lo, hi);
    }
}

/// Standardize in place to zero mean and unit population variance.
///
/// A cross-section without dispersion carries no ranking information and is
/// mapped to all zeros.
pub fn standardize(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let m = mean(data);
    let sd = population_std_dev(data);
    if !sd.is_finite() || sd < 1e-12 {
        data.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in data.iter_mut() {
        *v = (*v - m) / sd;
    }
}
