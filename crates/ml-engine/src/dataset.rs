use chrono::NaiveDate;
use portfolio_core::{EngineError, EngineResult, FeaturePanel, FeatureRow, PricePanel};

/// One supervised example: features known the day before `date`, paired
/// with the forward return from `date` over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub date: NaiveDate,
    pub asset: String,
    pub features: FeatureRow,
    pub target: f64,
}

/// Chronologically ordered training rows (date, then asset).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    rows: Vec<TrainingRow>,
    horizon: usize,
}

impl TrainingSet {
    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn features(&self) -> Vec<FeatureRow> {
        self.rows.iter().map(|r| r.features).collect()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.target).collect()
    }

    /// Number of distinct dates covered.
    pub fn n_dates(&self) -> usize {
        let mut n = 0;
        let mut last = None;
        for row in &self.rows {
            if last != Some(row.date) {
                n += 1;
                last = Some(row.date);
            }
        }
        n
    }

    /// Keep only rows from the trailing `n_dates` distinct dates.
    pub fn trailing_dates(&self, n_dates: usize) -> TrainingSet {
        let total = self.n_dates();
        if n_dates >= total {
            return self.clone();
        }
        let mut skip = total - n_dates;
        let mut last = None;
        let mut start = self.rows.len();
        for (i, row) in self.rows.iter().enumerate() {
            if last != Some(row.date) {
                if skip == 0 {
                    start = i;
                    break;
                }
                skip -= 1;
                last = Some(row.date);
            }
        }
        TrainingSet {
            rows: self.rows[start..].to_vec(),
            horizon: self.horizon,
        }
    }
}

/// Join lagged features with forward returns.
///
/// The row for date index `t` carries the feature row of `t - 1` and the
/// target `price(t + horizon) / price(t) - 1`. Rows missing either side are
/// dropped; an empty set is returned rather than an error.
pub fn build_training_set(
    prices: &PricePanel,
    features: &FeaturePanel,
    horizon: usize,
) -> EngineResult<TrainingSet> {
    if prices.dates() != features.dates() || prices.assets() != features.assets() {
        return Err(EngineError::InvalidInput(
            "feature panel axes do not match the price panel".to_string(),
        ));
    }
    if horizon == 0 {
        return Err(EngineError::InvalidInput("horizon must be positive".to_string()));
    }

    let mut rows = Vec::new();
    let n = prices.len();
    for t in 1..n.saturating_sub(horizon) {
        for (a, asset) in prices.assets().iter().enumerate() {
            let Some(lagged) = features.get(t - 1, a) else {
                continue;
            };
            let target = match (prices.price(t, a), prices.price(t + horizon, a)) {
                (Some(p0), Some(p1)) => p1 / p0 - 1.0,
                _ => continue,
            };
            if !target.is_finite() {
                continue;
            }
            rows.push(TrainingRow {
                date: prices.dates()[t],
                asset: asset.clone(),
                features: *lagged,
                target,
            });
        }
    }

    tracing::info!(
        "Training set: {} rows over horizon {} ({} price dates)",
        rows.len(),
        horizon,
        n
    );
    Ok(TrainingSet { rows, horizon })
}
