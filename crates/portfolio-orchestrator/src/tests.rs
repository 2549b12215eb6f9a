use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use portfolio_core::{
    AllocationSource, CancelFlag, EngineConfig, EngineError, FallbackCause, InvestorProfile, ModelConfig,
    PricePanel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

fn business_days(n: usize) -> Vec<NaiveDate> {
    let mut d = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        if chrono::Datelike::weekday(&d).number_from_monday() <= 5 {
            out.push(d);
        }
        d = d.succ_opt().unwrap();
    }
    out
}

/// `total_growth` is reached linearly in log space over the whole history,
/// with small multiplicative noise on top.
fn trending(n: usize, total_growth: f64, rng: &mut StdRng) -> Vec<Option<f64>> {
    let daily = total_growth.ln() / (n - 1) as f64;
    (0..n)
        .map(|t| {
            let noise: f64 = rng.gen_range(-0.003..0.003);
            Some(100.0 * (daily * t as f64).exp() * (1.0 + noise))
        })
        .collect()
}

fn three_asset_panel() -> PricePanel {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 300;
    PricePanel::from_columns(
        business_days(n),
        vec![
            ("A".to_string(), trending(n, 1.5, &mut rng)),
            ("B".to_string(), trending(n, 1.0, &mut rng)),
            ("C".to_string(), trending(n, 1.0, &mut rng)),
        ],
    )
    .unwrap()
}

fn wide_panel(n: usize) -> PricePanel {
    let mut rng = StdRng::seed_from_u64(11);
    let growth = [1.4, 1.1, 0.9, 1.2, 1.0, 1.3];
    let columns = growth
        .iter()
        .enumerate()
        .map(|(i, g)| (format!("T{i}"), trending(n, *g, &mut rng)))
        .collect();
    PricePanel::from_columns(business_days(n), columns).unwrap()
}

/// Caps loose enough for three names; a lighter model keeps tests fast.
fn three_asset_config() -> EngineConfig {
    EngineConfig {
        max_weight: 0.5,
        top3_max: 1.0,
        model: ModelConfig {
            n_estimators: 60,
            ..ModelConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn conservative() -> InvestorProfile {
    InvestorProfile::new(2, 10.0, Vec::new()).unwrap()
}

#[test]
fn test_trending_asset_ranked_and_weighted_first() {
    let pipeline = PortfolioPipeline::new(three_asset_config()).unwrap();
    let prices = three_asset_panel();
    let outcome = pipeline.run_predictive(&prices, &CancelFlag::new()).unwrap();

    let ranked = outcome.expected.ranked();
    assert_eq!(ranked[0], "A");
    let mu_a = outcome.expected.get("A").unwrap();
    assert!(mu_a > outcome.expected.get("B").unwrap());
    assert!(mu_a > outcome.expected.get("C").unwrap());

    let w = &outcome.weights;
    let a = w.get("A").unwrap();
    assert!(a >= w.get("B").unwrap() - 1e-9);
    assert!(a >= w.get("C").unwrap() - 1e-9);
    assert_abs_diff_eq!(w.total(), 1.0, epsilon = 1e-4);
    assert!(w.largest() <= 0.5 + 1e-6);
    assert!(w.weights().iter().all(|x| *x >= -1e-9));
}

#[test]
fn test_predictive_report_lists_signals() {
    let pipeline = PortfolioPipeline::new(three_asset_config()).unwrap();
    let report = pipeline
        .run(&three_asset_panel(), &conservative(), &CancelFlag::new())
        .unwrap();

    assert_eq!(report.source, AllocationSource::Predictive);
    assert!(!report.is_heuristic());
    assert_abs_diff_eq!(report.total_weight(), 1.0, epsilon = 1e-4);
    assert_eq!(report.allocations[0].ticker, "A");
    for pair in report.allocations.windows(2) {
        assert!(pair[0].weight >= pair[1].weight);
    }
    for alloc in &report.allocations {
        assert!(alloc.reason.starts_with("Top signals: "));
        assert_eq!(alloc.reason.matches('=').count(), 3);
    }
    assert!(report.as_of.is_some());
    assert!(report.ex_ante_vol.unwrap() > 0.0);
    assert_eq!(report.diagnostics.as_ref().unwrap().folds.len(), 5);
    let share: f64 = report.risk_contributions.iter().map(|c| c.share).sum();
    assert_abs_diff_eq!(share, 1.0, epsilon = 1e-9);
}

#[test]
fn test_short_mode_report_keeps_short_legs() {
    let config = EngineConfig {
        long_only: false,
        short_cap: 0.10,
        model: ModelConfig {
            n_estimators: 40,
            ..ModelConfig::default()
        },
        ..EngineConfig::default()
    };
    let pipeline = PortfolioPipeline::new(config.clone()).unwrap();
    let report = pipeline
        .run(&wide_panel(400), &conservative(), &CancelFlag::new())
        .unwrap();

    assert_eq!(report.source, AllocationSource::Predictive);
    assert_abs_diff_eq!(report.total_weight(), 1.0, epsilon = 1e-4);
    for alloc in &report.allocations {
        assert!(alloc.weight != 0.0);
        assert!(alloc.weight <= config.max_weight + 1e-6);
        assert!(alloc.weight >= -config.short_cap - 1e-6);
    }
    let top3: f64 = report.allocations.iter().take(3).map(|a| a.weight).sum();
    assert!(top3 <= config.top3_max + 1e-6);
    assert_eq!(report.summary.holdings, report.allocations.len());
}

#[test]
fn test_default_caps_on_three_names_fall_back() {
    // 3 × 0.25 < 1, so the optimizer cannot place the full budget
    let config = EngineConfig {
        model: ModelConfig {
            n_estimators: 20,
            ..ModelConfig::default()
        },
        ..EngineConfig::default()
    };
    let pipeline = PortfolioPipeline::new(config).unwrap();
    let report = pipeline
        .run(&three_asset_panel(), &conservative(), &CancelFlag::new())
        .unwrap();

    assert_eq!(
        report.source,
        AllocationSource::Heuristic {
            cause: FallbackCause::SolverInfeasible
        }
    );
    assert!(report.allocations.iter().all(|a| a.reason.contains("solver infeasible")));
}

#[test]
fn test_short_history_falls_back_deterministically() {
    let pipeline = PortfolioPipeline::new(EngineConfig::default()).unwrap();
    let prices = wide_panel(120);

    let first = pipeline.run(&prices, &conservative(), &CancelFlag::new()).unwrap();
    let second = pipeline.run(&prices, &conservative(), &CancelFlag::new()).unwrap();

    assert_eq!(
        first.source,
        AllocationSource::Heuristic {
            cause: FallbackCause::InsufficientData
        }
    );
    assert_eq!(first.allocations, second.allocations);
    let tickers: Vec<&str> = first.allocations.iter().map(|a| a.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["BND", "TLT", "SCHD", "VOO", "GLD"]);
    assert_abs_diff_eq!(first.total_weight(), 1.0, epsilon = 1e-9);
    assert!(first.diagnostics.is_none());
    assert!(first.alerts.is_empty());
}

#[test]
fn test_invalid_profile_propagates() {
    let pipeline = PortfolioPipeline::new(EngineConfig::default()).unwrap();
    let profile = InvestorProfile {
        risk_tolerance: 11,
        ..InvestorProfile::default()
    };
    let err = pipeline
        .run(&wide_panel(120), &profile, &CancelFlag::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        n_splits: 1,
        ..EngineConfig::default()
    };
    assert!(matches!(
        PortfolioPipeline::new(config).unwrap_err(),
        EngineError::InvalidInput(_)
    ));
}

#[test]
fn test_pre_cancelled_request_falls_back() {
    let pipeline = PortfolioPipeline::new(three_asset_config()).unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = pipeline.run(&three_asset_panel(), &conservative(), &cancel).unwrap();
    assert_eq!(
        report.source,
        AllocationSource::Heuristic {
            cause: FallbackCause::Cancelled
        }
    );
}

#[tokio::test]
async fn test_background_run_completes() {
    let pipeline = PortfolioPipeline::new(three_asset_config()).unwrap();
    let runner = BackgroundRunner::new(pipeline);
    let report = runner
        .run(Arc::new(three_asset_panel()), conservative())
        .await
        .unwrap();
    assert_eq!(report.source, AllocationSource::Predictive);
    assert_eq!(report.allocations[0].ticker, "A");
}

#[tokio::test]
async fn test_timeout_cancels_and_falls_back() {
    let config = EngineConfig {
        max_weight: 0.3,
        top3_max: 0.8,
        ..EngineConfig::default()
    };
    let pipeline = PortfolioPipeline::new(config).unwrap();
    let runner = BackgroundRunner::new(pipeline).with_timeout(Duration::ZERO);
    let cancel = CancelFlag::new();

    let report = runner
        .run_with_cancel(Arc::new(wide_panel(700)), conservative(), cancel.clone())
        .await
        .unwrap();

    assert!(cancel.is_cancelled());
    assert_eq!(
        report.source,
        AllocationSource::Heuristic {
            cause: FallbackCause::Cancelled
        }
    );
    assert!(report.allocations[0].reason.contains("cancelled or timed out"));
}

#[tokio::test]
async fn test_background_run_rejects_invalid_profile() {
    let runner = BackgroundRunner::new(PortfolioPipeline::new(EngineConfig::default()).unwrap());
    let profile = InvestorProfile {
        investment_horizon_years: -1.0,
        ..InvestorProfile::default()
    };
    let err = runner.run(Arc::new(wide_panel(50)), profile).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn test_fallback_report_serializes_cause() {
    let pipeline = PortfolioPipeline::new(EngineConfig::default()).unwrap();
    let report = pipeline.fallback_report(&conservative(), FallbackCause::DegenerateCovariance);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["source"]["kind"], "heuristic");
    assert_eq!(json["source"]["cause"], "degenerate_covariance");
    assert!(json["as_of"].is_null());
    assert_eq!(json["allocations"].as_array().unwrap().len(), 5);

    let back: AllocationReport = serde_json::from_value(json).unwrap();
    assert_eq!(back.source, report.source);
    assert_eq!(back.allocations.len(), report.allocations.len());
}
