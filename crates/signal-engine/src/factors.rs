use portfolio_core::{Factor, FeatureRow};
use statrs::statistics::Statistics;

/// Trailing momentum windows in trading days: 1, 3 and 12 months.
pub const MOMENTUM_WINDOWS: [usize; 3] = [21, 63, 252];

/// Weights of the 1m/3m/12m legs in the composite momentum score.
pub const COMBO_WEIGHTS: [f64; 3] = [0.3, 0.3, 0.4];

pub const SHORT_VOL_WINDOW: usize = 20;
pub const LONG_VOL_WINDOW: usize = 60;
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Raw (un-normalized) factor rows for one asset, one entry per date.
///
/// A row is produced only once every factor is defined, i.e. after the
/// longest lookback (12-month momentum) has a full window of prices.
pub fn raw_factors(prices: &[Option<f64>]) -> Vec<Option<FeatureRow>> {
    let returns = daily_returns(prices);
    (0..prices.len())
        .map(|t| raw_factor_row(prices, &returns, t))
        .collect()
}

/// Daily simple returns aligned to `prices`; the first entry is always `None`.
pub fn daily_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            match (prices[t - 1], prices[t]) {
                (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Return over the trailing `window` days ending at `t`.
pub fn trailing_return(prices: &[Option<f64>], t: usize, window: usize) -> Option<f64> {
    if t < window {
        return None;
    }
    match (prices[t - window], prices[t]) {
        (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
        _ => None,
    }
}

/// Sample standard deviation of the `window` daily returns ending at `t`.
pub fn trailing_volatility(returns: &[Option<f64>], t: usize, window: usize) -> Option<f64> {
    if window < 2 || t < window {
        return None;
    }
    let slice: Option<Vec<f64>> = returns[t + 1 - window..=t].iter().copied().collect();
    slice.map(|r| r.std_dev())
}

fn raw_factor_row(prices: &[Option<f64>], returns: &[Option<f64>], t: usize) -> Option<FeatureRow> {
    let price = prices[t]?;
    let m1 = trailing_return(prices, t, MOMENTUM_WINDOWS[0])?;
    let m3 = trailing_return(prices, t, MOMENTUM_WINDOWS[1])?;
    let m12 = trailing_return(prices, t, MOMENTUM_WINDOWS[2])?;
    let vol20 = trailing_volatility(returns, t, SHORT_VOL_WINDOW)?;
    let vol60 = trailing_volatility(returns, t, LONG_VOL_WINDOW)?;
    let annualize = TRADING_DAYS_PER_YEAR.sqrt();

    let mut row = [0.0; Factor::COUNT];
    row[Factor::Momentum1m.index()] = m1;
    row[Factor::Momentum3m.index()] = m3;
    row[Factor::Momentum12m.index()] = m12;
    row[Factor::MomentumCombo.index()] =
        COMBO_WEIGHTS[0] * m1 + COMBO_WEIGHTS[1] * m3 + COMBO_WEIGHTS[2] * m12;
    row[Factor::Volatility20d.index()] = vol20 * annualize;
    row[Factor::Volatility60d.index()] = vol60 * annualize;
    row[Factor::Value.index()] = -m12;
    row[Factor::Quality.index()] = -vol20;
    row[Factor::Size.index()] = -price.ln();

    if row.iter().all(|v| v.is_finite()) {
        Some(row)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn geometric(n: usize, start: f64, growth: f64) -> Vec<Option<f64>> {
        (0..n).map(|i| Some(start * growth.powi(i as i32))).collect()
    }

    #[test]
    fn test_trailing_return_windows() {
        let prices = geometric(300, 100.0, 1.001);
        assert!(trailing_return(&prices, 20, 21).is_none());
        let r = trailing_return(&prices, 21, 21).unwrap();
        assert_abs_diff_eq!(r, 1.001_f64.powi(21) - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raw_rows_start_after_longest_window() {
        let prices = geometric(300, 50.0, 1.0005);
        let rows = raw_factors(&prices);
        assert!(rows[251].is_none());
        assert!(rows[252].is_some());
    }

    #[test]
    fn test_constant_growth_has_zero_volatility() {
        let prices = geometric(300, 50.0, 1.0005);
        let rows = raw_factors(&prices);
        let row = rows[299].unwrap();
        assert_abs_diff_eq!(row[Factor::Volatility20d.index()], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row[Factor::Quality.index()], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row[Factor::Value.index()], -row[Factor::Momentum12m.index()]);
        assert_abs_diff_eq!(row[Factor::Size.index()], -prices[299].unwrap().ln());
    }

    #[test]
    fn test_combo_weights() {
        let prices = geometric(300, 10.0, 1.002);
        let row = raw_factors(&prices)[260].unwrap();
        let expected = 0.3 * row[Factor::Momentum1m.index()]
            + 0.3 * row[Factor::Momentum3m.index()]
            + 0.4 * row[Factor::Momentum12m.index()];
        assert_abs_diff_eq!(row[Factor::MomentumCombo.index()], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_price_blocks_volatility_window() {
        let mut prices = geometric(400, 10.0, 1.001);
        prices[290] = None;
        let rows = raw_factors(&prices);
        assert!(rows[290].is_none());
        // 60-day window still holds the missing returns
        assert!(rows[340].is_none());
        // 1m momentum anchored on the gap
        assert!(rows[311].is_none());
        assert!(rows[360].is_some());
    }
}
