//! Deterministic rule-based allocation used whenever the predictive path
//! cannot produce a portfolio.

use portfolio_core::{Allocation, FallbackCause, InvestorProfile};
use serde::{Deserialize, Serialize};

/// Share of the portfolio carved out for theme tickers when themes are given.
pub const THEME_SLEEVE: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn from_tolerance(risk_tolerance: u8) -> Self {
        match risk_tolerance {
            0..=3 => RiskTier::Low,
            4..=6 => RiskTier::Moderate,
            _ => RiskTier::High,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Moderate => "moderate",
            RiskTier::High => "high",
        }
    }

    /// Fixed shortlist for the tier; weights sum to 1.
    pub fn shortlist(&self) -> &'static [(&'static str, f64)] {
        match self {
            RiskTier::Low => &[
                ("BND", 0.20),
                ("TLT", 0.20),
                ("SCHD", 0.20),
                ("VOO", 0.20),
                ("GLD", 0.20),
            ],
            RiskTier::Moderate => &[
                ("VOO", 0.20),
                ("QQQ", 0.20),
                ("SCHD", 0.20),
                ("BND", 0.20),
                ("TLT", 0.10),
                ("GLD", 0.10),
            ],
            RiskTier::High => &[
                ("QQQ", 0.20),
                ("VOO", 0.20),
                ("AAPL", 0.15),
                ("MSFT", 0.15),
                ("NVDA", 0.15),
                ("IWM", 0.15),
            ],
        }
    }
}

/// Theme name → representative ticker. None of these appear in a tier
/// shortlist.
const THEME_TICKERS: [(&str, &str); 7] = [
    ("Technology", "XLK"),
    ("Energy", "XLE"),
    ("Healthcare", "XLV"),
    ("Dividends", "VIG"),
    ("Sustainability", "ESGU"),
    ("AI", "BOTZ"),
    ("Emerging Markets", "VWO"),
];

pub fn theme_ticker(theme: &str) -> Option<&'static str> {
    let wanted = theme.trim();
    THEME_TICKERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, ticker)| *ticker)
}

/// Recognized themes of the profile, deduplicated, in canonical order.
fn recognized_themes(profile: &InvestorProfile) -> Vec<(&'static str, &'static str)> {
    THEME_TICKERS
        .iter()
        .filter(|(name, _)| profile.themes.iter().any(|t| t.trim().eq_ignore_ascii_case(name)))
        .copied()
        .collect()
}

/// Risk-tier allocation for `profile`, optionally tilted toward its themes.
///
/// Only `risk_tolerance` and `themes` are consulted. With recognized themes
/// the tier weights are scaled to 80% and the remaining 20% is split equally
/// across the theme tickers. Every reason marks the allocation as heuristic
/// and names `cause`.
pub fn fallback_allocation(profile: &InvestorProfile, cause: FallbackCause) -> Vec<Allocation> {
    let tier = RiskTier::from_tolerance(profile.risk_tolerance);
    let themes = recognized_themes(profile);
    let tier_scale = if themes.is_empty() { 1.0 } else { 1.0 - THEME_SLEEVE };

    let mut allocations: Vec<Allocation> = tier
        .shortlist()
        .iter()
        .map(|(ticker, weight)| Allocation {
            ticker: ticker.to_string(),
            weight: weight * tier_scale,
            reason: format!(
                "Heuristic allocation: {} risk tier core holding (fallback: {})",
                tier.label(),
                cause
            ),
        })
        .collect();

    let per_theme = THEME_SLEEVE / themes.len().max(1) as f64;
    allocations.extend(themes.iter().map(|(name, ticker)| Allocation {
        ticker: ticker.to_string(),
        weight: per_theme,
        reason: format!("Heuristic allocation: {} theme sleeve (fallback: {})", name, cause),
    }));

    tracing::info!(
        "Fallback allocation: {} tier, {} theme(s), cause: {}",
        tier.label(),
        themes.len(),
        cause
    );
    allocations
}
