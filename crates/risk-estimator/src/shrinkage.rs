use nalgebra::DMatrix;

/// Ledoit-Wolf linear shrinkage of the sample covariance of `returns`
/// (observations × assets) toward `mu·I`, where `mu` is the mean sample
/// variance.
///
/// Returns the shrunk covariance and the intensity in `[0, 1]`. The sample
/// covariance uses the population normalization (divide by `n`).
pub fn ledoit_wolf(returns: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let n = returns.nrows();
    let p = returns.ncols();
    if n == 0 || p == 0 {
        return (DMatrix::zeros(p, p), 0.0);
    }
    let nf = n as f64;
    let pf = p as f64;

    // Center each column
    let mut x = returns.clone();
    for mut col in x.column_iter_mut() {
        let m = col.mean();
        col.add_scalar_mut(-m);
    }

    let emp_cov = x.transpose() * &x / nf;
    let mu = emp_cov.trace() / pf;

    let x2 = x.map(|v| v * v);
    let beta_sum = (x2.transpose() * &x2).sum();
    let delta_sum = emp_cov.map(|v| v * v).sum();

    let mut beta = (beta_sum / nf - delta_sum) / (pf * nf);
    let mut delta = delta_sum - 2.0 * mu * emp_cov.trace() + pf * mu * mu;
    delta /= pf;
    beta = beta.min(delta);

    let shrinkage = if beta <= 0.0 || delta <= 0.0 {
        0.0
    } else {
        (beta / delta).clamp(0.0, 1.0)
    };

    let target = DMatrix::<f64>::identity(p, p) * mu;
    let shrunk = emp_cov * (1.0 - shrinkage) + target * shrinkage;
    (shrunk, shrinkage)
}
