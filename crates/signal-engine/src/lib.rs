pub mod factors;
pub mod normalize;


use portfolio_core::{EngineConfig, EngineError, EngineResult, FeaturePanel, FeatureRow, PricePanel};
use rayon::prelude::*;

pub use factors::raw_factors;
pub use normalize::normalize_cross_section;

/// Minimum number of assets a date needs to form a usable cross-section.
pub const MIN_CROSS_SECTION: usize = 2;

/// Turns a price panel into the normalized factor panel the model trains on.
pub struct SignalEngine {
    winsor_band: (f64, f64),
}

impl SignalEngine {
    pub fn new() -> Self {
        Self::with_band(EngineConfig::default().winsor_quantiles)
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_band(config.winsor_quantiles)
    }

    pub fn with_band(winsor_band: (f64, f64)) -> Self {
        Self { winsor_band }
    }

    /// Compute momentum, volatility, value, quality and size factors for
    /// every (date, asset) and normalize them cross-sectionally per date.
    ///
    /// Each cell only looks at prices on or before its own date. Dates where
    /// fewer than two assets have a complete factor row are left empty.
    pub fn build_feature_panel(&self, prices: &PricePanel) -> EngineResult<FeaturePanel> {
        if prices.is_empty() {
            return Err(EngineError::InsufficientData(
                "price panel has no observations".to_string(),
            ));
        }

        // Raw factors per asset (time series), in parallel
        let raw_by_asset: Vec<Vec<Option<FeatureRow>>> = (0..prices.n_assets())
            .into_par_iter()
            .map(|a| raw_factors(&prices.column(a)))
            .collect();

        let n_assets = prices.n_assets();
        let band = self.winsor_band;

        // Cross-sectional normalization per date, in parallel
        let cells: Vec<Vec<Option<FeatureRow>>> = (0..prices.len())
            .into_par_iter()
            .map(|t| {
                let members: Vec<usize> = (0..n_assets)
                    .filter(|&a| raw_by_asset[a][t].is_some())
                    .collect();
                let mut row = vec![None; n_assets];
                if members.len() < MIN_CROSS_SECTION {
                    return row;
                }
                let mut section: Vec<FeatureRow> =
                    members.iter().filter_map(|&a| raw_by_asset[a][t]).collect();
                normalize_cross_section(&mut section, band);
                for (&a, values) in members.iter().zip(section) {
                    row[a] = Some(values);
                }
                row
            })
            .collect();

        let panel = FeaturePanel::new(prices.dates().to_vec(), prices.assets().to_vec(), cells)?;
        let usable = panel.valid_dates();
        tracing::info!(
            "Built factor panel: {} assets, {}/{} dates with a usable cross-section",
            n_assets,
            usable,
            prices.len()
        );
        if usable == 0 {
            return Err(EngineError::InsufficientData(format!(
                "no date has {} assets with a full factor history ({} dates of prices)",
                MIN_CROSS_SECTION,
                prices.len()
            )));
        }
        Ok(panel)
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new()
    }
}
