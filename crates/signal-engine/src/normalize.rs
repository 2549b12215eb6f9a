use portfolio_core::stats;
use portfolio_core::{Factor, FeatureRow};

/// Winsorize then z-score every factor column of one date's cross-section.
///
/// `rows` holds the complete raw rows available on that date. Each factor is
/// clipped to its `(lower_q, upper_q)` quantile band and standardized with
/// the population standard deviation. Factors without dispersion become 0.
pub fn normalize_cross_section(rows: &mut [FeatureRow], band: (f64, f64)) {
    if rows.is_empty() {
        return;
    }
    for factor in Factor::ALL {
        let k = factor.index();
        let mut column: Vec<f64> = rows.iter().map(|r| r[k]).collect();
        winsorize_cross_section(&mut column, band);
        standardize_cross_section(&mut column);
        for (row, v) in rows.iter_mut().zip(column) {
            row[k] = v;
        }
    }
}

pub fn winsorize_cross_section(values: &mut [f64], band: (f64, f64)) {
    stats::winsorize(values, band.0, band.1);
}

pub fn standardize_cross_section(values: &mut [f64]) {
    stats::standardize(values);
}
