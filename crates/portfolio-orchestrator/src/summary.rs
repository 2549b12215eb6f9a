use portfolio_core::{EngineConfig, WeightVector};
use serde::{Deserialize, Serialize};

/// Concentration profile of a finished allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub holdings: usize,
    pub top3_concentration: f64,
    pub largest_position: f64,
    /// `1 / Σ(top-3 weights²)`; 0 for an empty portfolio
    pub diversification_index: f64,
}

pub fn summarize_weights(weights: &WeightVector) -> PortfolioSummary {
    let sorted = weights.sorted_desc();
    let top3_sq: f64 = sorted.iter().take(3).map(|(_, w)| w * w).sum();
    PortfolioSummary {
        holdings: weights.weights().iter().filter(|w| **w != 0.0).count(),
        top3_concentration: weights.top_n_sum(3),
        largest_position: weights.largest(),
        diversification_index: if top3_sq > 0.0 { 1.0 / top3_sq } else { 0.0 },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SingleName,
    TopThree,
    Volatility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitAlert {
    pub kind: AlertKind,
    pub ticker: Option<String>,
    pub value: f64,
    pub limit: f64,
    pub message: String,
}

const ALERT_TOL: f64 = 1e-6;

/// Flag single-name exposure above `max_weight`, top-3 weight above
/// `top3_max` and, when known, ex-ante volatility above `target_vol`.
pub fn check_limits(weights: &WeightVector, config: &EngineConfig, ex_ante_vol: Option<f64>) -> Vec<LimitAlert> {
    let mut alerts = Vec::new();

    for (ticker, w) in weights.sorted_desc() {
        if w > config.max_weight + ALERT_TOL {
            alerts.push(LimitAlert {
                kind: AlertKind::SingleName,
                message: format!(
                    "{} weight {:.1}% exceeds the {:.1}% single-name limit",
                    ticker,
                    w * 100.0,
                    config.max_weight * 100.0
                ),
                ticker: Some(ticker),
                value: w,
                limit: config.max_weight,
            });
        }
    }

    let top3 = weights.top_n_sum(3);
    if top3 > config.top3_max + ALERT_TOL {
        alerts.push(LimitAlert {
            kind: AlertKind::TopThree,
            ticker: None,
            value: top3,
            limit: config.top3_max,
            message: format!(
                "Top-3 concentration {:.1}% exceeds {:.1}%",
                top3 * 100.0,
                config.top3_max * 100.0
            ),
        });
    }

    if let Some(vol) = ex_ante_vol {
        if vol > config.target_vol + ALERT_TOL {
            alerts.push(LimitAlert {
                kind: AlertKind::Volatility,
                ticker: None,
                value: vol,
                limit: config.target_vol,
                message: format!(
                    "Ex-ante volatility {:.1}% above the {:.1}% target",
                    vol * 100.0,
                    config.target_vol * 100.0
                ),
            });
        }
    }

    for alert in &alerts {
        tracing::warn!("Limit alert: {}", alert.message);
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_summary_metrics() {
        let w = WeightVector::from_pairs(vec![("A", 0.4), ("B", 0.3), ("C", 0.2), ("D", 0.1), ("E", 0.0)])
            .unwrap();
        let s = summarize_weights(&w);
        assert_eq!(s.holdings, 4);
        assert_abs_diff_eq!(s.top3_concentration, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(s.largest_position, 0.4);
        assert_abs_diff_eq!(s.diversification_index, 1.0 / (0.16 + 0.09 + 0.04), epsilon = 1e-12);
    }

    #[test]
    fn test_short_legs_count_as_holdings() {
        let w = WeightVector::from_pairs(vec![("A", 0.6), ("B", 0.5), ("C", -0.1), ("D", 0.0)]).unwrap();
        assert_eq!(summarize_weights(&w).holdings, 3);
    }

    #[test]
    fn test_alerts_for_breaches() {
        let config = EngineConfig::default();
        let w = WeightVector::from_pairs(vec![("A", 0.30), ("B", 0.25), ("C", 0.25), ("D", 0.20)]).unwrap();
        let alerts = check_limits(&w, &config, Some(0.15));
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::SingleName, AlertKind::TopThree, AlertKind::Volatility]);
        assert_eq!(alerts[0].ticker.as_deref(), Some("A"));
    }

    #[test]
    fn test_compliant_portfolio_has_no_alerts() {
        let config = EngineConfig::default();
        let w = WeightVector::from_pairs(vec![("A", 0.2), ("B", 0.2), ("C", 0.2), ("D", 0.2), ("E", 0.2)]).unwrap();
        assert!(check_limits(&w, &config, Some(0.05)).is_empty());
        assert!(check_limits(&w, &config, None).is_empty());
    }
}
