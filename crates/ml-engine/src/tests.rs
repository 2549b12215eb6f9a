use super::*;
use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use portfolio_core::{CancelFlag, EngineError, PricePanel};
use signal_engine::SignalEngine;

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

/// Deterministic wiggly series; `trend` sets the daily drift.
fn series(n: usize, trend: f64, phase: f64) -> Vec<Option<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            Some(100.0 * (1.0 + trend).powf(t) * (1.0 + 0.02 * (t / 7.0 + phase).sin()))
        })
        .collect()
}

fn panel(n: usize) -> PricePanel {
    PricePanel::from_columns(
        dates(n),
        vec![
            ("AAA".to_string(), series(n, 0.0010, 0.0)),
            ("BBB".to_string(), series(n, 0.0002, 1.0)),
            ("CCC".to_string(), series(n, -0.0004, 2.0)),
            ("DDD".to_string(), series(n, 0.0005, 3.0)),
        ],
    )
    .unwrap()
}

fn fast_params() -> ModelParams {
    ModelParams {
        n_estimators: 25,
        ..ModelParams::default()
    }
}

#[test]
fn test_splits_expand_and_never_overlap() {
    let splits = walk_forward_splits(103, 5).unwrap();
    assert_eq!(splits.len(), 5);
    // 103 / 6 = 17 rows per test block; remainder lands in the first train block
    assert_eq!(splits[0].train, 0..18);
    assert_eq!(splits[0].test, 18..35);
    assert_eq!(splits[4].test, 86..103);
    for s in &splits {
        assert_eq!(s.train.end, s.test.start);
    }
    for w in splits.windows(2) {
        assert!(w[1].train.end > w[0].train.end);
    }
}

#[test]
fn test_splits_with_too_few_rows() {
    let err = walk_forward_splits(4, 5).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientData(_)));
    assert!(matches!(
        walk_forward_splits(10, 0).unwrap_err(),
        EngineError::InvalidInput(_)
    ));
}

#[test]
fn test_training_rows_pair_lagged_features_with_forward_return() {
    let prices = panel(300);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 5).unwrap();
    assert!(!training.is_empty());

    let row = &training.rows()[0];
    let t = prices.date_index(row.date).unwrap();
    let a = prices.asset_index(&row.asset).unwrap();
    assert_eq!(&row.features, features.get(t - 1, a).unwrap());
    let expected = prices.price(t + 5, a).unwrap() / prices.price(t, a).unwrap() - 1.0;
    assert_abs_diff_eq!(row.target, expected, epsilon = 1e-12);

    // First usable features appear at 252, so the first row is dated 253
    assert_eq!(t, 253);
    // Last row needs a price `horizon` days later
    let last = training.rows().last().unwrap();
    assert_eq!(prices.date_index(last.date).unwrap(), 300 - 1 - 5);
}

#[test]
fn test_training_rows_are_chronological() {
    let prices = panel(300);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 3).unwrap();
    for w in training.rows().windows(2) {
        assert!(w[0].date <= w[1].date);
        if w[0].date == w[1].date {
            assert!(w[0].asset < w[1].asset);
        }
    }
}

#[test]
fn test_training_rows_ignore_future_prices() {
    let prices = panel(320);
    let engine = SignalEngine::new();
    let features = engine.build_feature_panel(&prices).unwrap();
    let before = build_training_set(&prices, &features, 5).unwrap();

    let cutoff = 280;
    let columns = (0..prices.n_assets())
        .map(|a| {
            let col = prices
                .column(a)
                .into_iter()
                .enumerate()
                .map(|(t, p)| if t > cutoff { p.map(|v| v * 0.5) } else { p })
                .collect();
            (prices.assets()[a].clone(), col)
        })
        .collect();
    let shocked = PricePanel::from_columns(prices.dates().to_vec(), columns).unwrap();
    let shocked_features = engine.build_feature_panel(&shocked).unwrap();
    let after = build_training_set(&shocked, &shocked_features, 5).unwrap();

    let cutoff_date = prices.dates()[cutoff];
    for (b, a) in before.rows().iter().zip(after.rows()) {
        if b.date > cutoff_date {
            break;
        }
        assert_eq!(b.date, a.date);
        assert_eq!(b.features, a.features);
    }
}

#[test]
fn test_empty_training_set_is_not_an_error() {
    let prices = panel(200);
    let cells = vec![vec![None; 4]; 200];
    let features =
        portfolio_core::FeaturePanel::new(prices.dates().to_vec(), prices.assets().to_vec(), cells)
            .unwrap();
    let training = build_training_set(&prices, &features, 21).unwrap();
    assert!(training.is_empty());

    let err = fit_walk_forward(&training, &fast_params(), 5, &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientData(_)));
}

#[test]
fn test_trailing_dates_keeps_whole_dates() {
    let prices = panel(300);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 5).unwrap();
    let tail = training.trailing_dates(10);
    assert_eq!(tail.n_dates(), 10);
    assert_eq!(tail.len(), 40);
    assert_eq!(tail.rows().last(), training.rows().last());
}

#[test]
fn test_walk_forward_ensemble_and_live_prediction() {
    let prices = panel(400);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 5).unwrap();
    let ensemble = fit_walk_forward(&training, &fast_params(), 5, &CancelFlag::new()).unwrap();

    assert_eq!(ensemble.folds().len(), 5);
    assert_eq!(ensemble.live_fold().id, FoldId(4));
    assert!(ensemble.fold(FoldId(2)).is_some());
    assert!(ensemble.fold(FoldId(9)).is_none());

    let covered = ensemble.out_of_fold().iter().filter(|p| p.is_some()).count();
    let test_rows: usize = ensemble.folds().iter().map(|f| f.test.len()).sum();
    assert_eq!(covered, test_rows);
    assert!(ensemble.out_of_fold()[0].is_none());
    assert_eq!(ensemble.diagnostics().folds.len(), 5);

    let expected = predict_expected_returns(&ensemble, &features, (0.05, 0.95)).unwrap();
    assert_eq!(expected.assets.len(), 4);
    assert_eq!(expected.date, *prices.dates().last().unwrap());
    assert!(expected.values.iter().all(|v| v.is_finite()));
}

#[test]
fn test_predictions_are_clipped_to_band() {
    let prices = panel(400);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 5).unwrap();
    let ensemble = fit_walk_forward(&training, &fast_params(), 3, &CancelFlag::new()).unwrap();

    let t = features.latest_valid_date().unwrap();
    let raw: Vec<f64> = features
        .cross_section(t)
        .iter()
        .map(|(_, r)| ensemble.live_model().predict(r))
        .collect();
    let lo = portfolio_core::stats::quantile(&raw, 0.25).unwrap();
    let hi = portfolio_core::stats::quantile(&raw, 0.75).unwrap();

    let clipped = predict_expected_returns(&ensemble, &features, (0.25, 0.75)).unwrap();
    for v in &clipped.values {
        assert!(*v >= lo - 1e-12 && *v <= hi + 1e-12);
    }
}

#[test]
fn test_cancelled_fit_reports_cancellation() {
    let prices = panel(320);
    let features = SignalEngine::new().build_feature_panel(&prices).unwrap();
    let training = build_training_set(&prices, &features, 5).unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = fit_walk_forward(&training, &fast_params(), 5, &cancel).unwrap_err();
    assert_eq!(err, EngineError::Cancelled);
}
