use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Dates × assets grid of adjusted close prices.
///
/// Construction enforces the panel invariants: strictly increasing dates,
/// positive prices, forward-filled gaps, and no asset or date left fully
/// empty. The panel is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    /// Row-major: `prices[t][a]`.
    prices: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> EngineResult<Self> {
        if dates.len() != rows.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} dates but {} price rows",
                dates.len(),
                rows.len()
            )));
        }
        if let Some(pos) = dates.windows(2).position(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidInput(format!(
                "date index not strictly increasing at {}",
                dates[pos + 1]
            )));
        }
        for (i, a) in assets.iter().enumerate() {
            if assets[..i].contains(a) {
                return Err(EngineError::InvalidInput(format!("duplicate asset {a}")));
            }
        }
        if let Some(row) = rows.iter().find(|r| r.len() != assets.len()) {
            return Err(EngineError::InvalidInput(format!(
                "price row has {} values for {} assets",
                row.len(),
                assets.len()
            )));
        }

        // Sanitize, then forward-fill each asset
        let mut rows: Vec<Vec<Option<f64>>> = rows
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .map(|p| p.filter(|v| v.is_finite() && *v > 0.0))
                    .collect()
            })
            .collect();
        for a in 0..assets.len() {
            let mut last = None;
            for row in rows.iter_mut() {
                match row[a] {
                    Some(p) => last = Some(p),
                    None => row[a] = last,
                }
            }
        }

        // Drop fully empty assets, then fully empty dates
        let keep_assets: Vec<usize> = (0..assets.len())
            .filter(|&a| rows.iter().any(|r| r[a].is_some()))
            .collect();
        let assets: Vec<String> = keep_assets.iter().map(|&a| assets[a].clone()).collect();
        let mut kept_dates = Vec::with_capacity(dates.len());
        let mut prices = Vec::with_capacity(rows.len());
        for (date, row) in dates.into_iter().zip(rows) {
            let row: Vec<Option<f64>> = keep_assets.iter().map(|&a| row[a]).collect();
            if row.iter().any(|p| p.is_some()) {
                kept_dates.push(date);
                prices.push(row);
            }
        }

        Ok(Self {
            dates: kept_dates,
            assets,
            prices,
        })
    }

    /// Build a panel from per-asset price columns aligned to `dates`.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> EngineResult<Self> {
        if let Some((name, col)) = columns.iter().find(|(_, c)| c.len() != dates.len()) {
            return Err(EngineError::InvalidInput(format!(
                "column {name} has {} values for {} dates",
                col.len(),
                dates.len()
            )));
        }
        let assets: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let rows = (0..dates.len())
            .map(|t| columns.iter().map(|(_, c)| c[t]).collect())
            .collect();
        Self::new(dates, assets, rows)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.assets.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn asset_index(&self, ticker: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == ticker)
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn price(&self, t: usize, a: usize) -> Option<f64> {
        self.prices.get(t).and_then(|r| r.get(a)).copied().flatten()
    }

    pub fn row(&self, t: usize) -> &[Option<f64>] {
        &self.prices[t]
    }

    /// Full price history of one asset.
    pub fn column(&self, a: usize) -> Vec<Option<f64>> {
        self.prices.iter().map(|r| r[a]).collect()
    }

    /// Simple return from `t - 1` to `t`, if both prices exist.
    pub fn simple_return(&self, t: usize, a: usize) -> Option<f64> {
        if t == 0 {
            return None;
        }
        match (self.price(t - 1, a), self.price(t, a)) {
            (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
            _ => None,
        }
    }

    /// The trailing `n` dates of the panel.
    pub fn tail(&self, n: usize) -> PricePanel {
        let start = self.dates.len().saturating_sub(n);
        self.slice_from(start)
    }

    /// Dates within `days` calendar days of the last date.
    pub fn trailing_calendar_window(&self, days: i64) -> PricePanel {
        let Some(last) = self.last_date() else {
            return self.clone();
        };
        let start_date = last - Duration::days(days);
        let start = self.dates.partition_point(|d| *d < start_date);
        self.slice_from(start)
    }

    fn slice_from(&self, start: usize) -> PricePanel {
        // Forward-fill is already applied, so any suffix keeps the invariants
        // except for assets that never traded inside the window.
        let dates = self.dates[start..].to_vec();
        let rows = self.prices[start..].to_vec();
        let keep: Vec<usize> = (0..self.assets.len())
            .filter(|&a| rows.iter().any(|r| r[a].is_some()))
            .collect();
        PricePanel {
            dates,
            assets: keep.iter().map(|&a| self.assets[a].clone()).collect(),
            prices: rows
                .into_iter()
                .map(|r| keep.iter().map(|&a| r[a]).collect())
                .collect(),
        }
    }
}

/// Cross-sectional factors derived from prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Factor {
    Momentum1m,
    Momentum3m,
    Momentum12m,
    MomentumCombo,
    Volatility20d,
    Volatility60d,
    Value,
    Quality,
    Size,
}

/// One normalized value per [`Factor`], in [`Factor::ALL`] order.
pub type FeatureRow = [f64; Factor::COUNT];

impl Factor {
    pub const COUNT: usize = 9;

    pub const ALL: [Factor; Factor::COUNT] = [
        Factor::Momentum1m,
        Factor::Momentum3m,
        Factor::Momentum12m,
        Factor::MomentumCombo,
        Factor::Volatility20d,
        Factor::Volatility60d,
        Factor::Value,
        Factor::Quality,
        Factor::Size,
    ];

    /// Column position inside a [`FeatureRow`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Short tag used in reason strings.
    pub fn name(&self) -> &'static str {
        match self {
            Factor::Momentum1m => "1m",
            Factor::Momentum3m => "3m",
            Factor::Momentum12m => "12m",
            Factor::MomentumCombo => "combo",
            Factor::Volatility20d => "vol20",
            Factor::Volatility60d => "vol60",
            Factor::Value => "value",
            Factor::Quality => "quality",
            Factor::Size => "size",
        }
    }
}

/// Normalized factor values keyed by (date, asset).
///
/// Shares its date and asset axes with the [`PricePanel`] it was built from.
/// A cell is `None` when the asset lacked a complete factor history on that
/// date or the whole date was excluded for having fewer than two assets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeaturePanel {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    cells: Vec<Vec<Option<FeatureRow>>>,
}

impl FeaturePanel {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        cells: Vec<Vec<Option<FeatureRow>>>,
    ) -> EngineResult<Self> {
        if cells.len() != dates.len() || cells.iter().any(|r| r.len() != assets.len()) {
            return Err(EngineError::InvalidInput(
                "feature cells do not match the date/asset axes".to_string(),
            ));
        }
        Ok(Self {
            dates,
            assets,
            cells,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|r| r.iter().all(|c| c.is_none()))
    }

    pub fn get(&self, t: usize, a: usize) -> Option<&FeatureRow> {
        self.cells.get(t).and_then(|r| r.get(a)).and_then(|c| c.as_ref())
    }

    pub fn value(&self, t: usize, a: usize, factor: Factor) -> Option<f64> {
        self.get(t, a).map(|row| row[factor.index()])
    }

    /// All populated cells on date `t` as `(asset index, row)`.
    pub fn cross_section(&self, t: usize) -> Vec<(usize, &FeatureRow)> {
        self.cells
            .get(t)
            .map(|r| {
                r.iter()
                    .enumerate()
                    .filter_map(|(a, c)| c.as_ref().map(|row| (a, row)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of dates carrying a usable cross-section.
    pub fn valid_dates(&self) -> usize {
        (0..self.len()).filter(|&t| self.cross_section(t).len() >= 2).count()
    }

    /// Most recent date index with at least two populated assets.
    pub fn latest_valid_date(&self) -> Option<usize> {
        (0..self.len()).rev().find(|&t| self.cross_section(t).len() >= 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
    }

    #[test]
    fn test_forward_fill_and_drop_empty() {
        let panel = PricePanel::from_columns(
            vec![day(0), day(1), day(2)],
            vec![
                ("AAA".to_string(), vec![Some(10.0), None, Some(12.0)]),
                ("BBB".to_string(), vec![None, None, None]),
                ("CCC".to_string(), vec![None, Some(5.0), Some(-1.0)]),
            ],
        )
        .unwrap();

        assert_eq!(panel.assets(), &["AAA".to_string(), "CCC".to_string()]);
        assert_eq!(panel.price(1, 0), Some(10.0));
        // Non-positive price is treated as missing and forward-filled
        assert_eq!(panel.price(2, 1), Some(5.0));
        assert_eq!(panel.price(0, 1), None);
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let err = PricePanel::new(
            vec![day(1), day(0)],
            vec!["AAA".to_string()],
            vec![vec![Some(1.0)], vec![Some(1.0)]],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_trailing_window() {
        let dates: Vec<NaiveDate> = (0..10).map(day).collect();
        let panel = PricePanel::from_columns(
            dates,
            vec![("AAA".to_string(), (0..10).map(|i| Some(1.0 + i as f64)).collect())],
        )
        .unwrap();

        let tail = panel.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.price(0, 0), Some(8.0));

        let window = panel.trailing_calendar_window(4);
        assert_eq!(window.dates().first().copied(), Some(day(5)));
    }

    #[test]
    fn test_factor_order_matches_index() {
        for (i, f) in Factor::ALL.iter().enumerate() {
            assert_eq!(f.index(), i);
        }
    }
}
