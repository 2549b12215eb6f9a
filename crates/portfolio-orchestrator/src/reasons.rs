use portfolio_core::{Factor, FeatureRow};

/// The `n` factors with the largest absolute z-score, strongest first.
/// Ties keep the canonical factor order.
pub fn top_signals(features: &FeatureRow, n: usize) -> Vec<(Factor, f64)> {
    let mut ranked: Vec<(Factor, f64)> = Factor::ALL
        .iter()
        .map(|f| (*f, features[f.index()]))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

/// e.g. `"Top signals: combo=1.23, vol20=-0.87, value=0.41"`
pub fn signal_reason(features: &FeatureRow) -> String {
    let parts: Vec<String> = top_signals(features, 3)
        .into_iter()
        .map(|(factor, z)| format!("{}={:.2}", factor.name(), z))
        .collect();
    format!("Top signals: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_lists_three_strongest() {
        let mut row = [0.1; Factor::COUNT];
        row[Factor::MomentumCombo.index()] = 1.234;
        row[Factor::Volatility20d.index()] = -0.871;
        row[Factor::Value.index()] = 0.409;
        assert_eq!(
            signal_reason(&row),
            "Top signals: combo=1.23, vol20=-0.87, value=0.41"
        );
    }

    #[test]
    fn test_ties_keep_factor_order() {
        let row = [0.5; Factor::COUNT];
        let top = top_signals(&row, 2);
        assert_eq!(top[0].0, Factor::Momentum1m);
        assert_eq!(top[1].0, Factor::Momentum3m);
    }
}
