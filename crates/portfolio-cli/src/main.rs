//! portfolio-cli: build an allocation from a CSV price panel.
//!
//! Usage:
//!   cargo run -p portfolio-cli -- prices.csv --risk 6 --theme AI --theme Energy
//!   cargo run -p portfolio-cli -- prices.csv --risk 3 --horizon 15
//!   cargo run -p portfolio-cli -- prices.csv --backtest-weights weights.csv
//!
//! Engine settings come from `PORTFOLIO_*` environment variables (a `.env`
//! file is honoured).

mod input;

use std::fs::File;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backtest_engine::Backtester;
use portfolio_core::{EngineConfig, InvestorProfile};
use portfolio_orchestrator::{BackgroundRunner, PortfolioPipeline};

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn flag_values(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_cli=info,portfolio_orchestrator=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(price_path) = args.first().filter(|a| !a.starts_with("--")) else {
        bail!("usage: portfolio-cli <prices.csv> [--risk N] [--theme NAME]... [--horizon YEARS] [--backtest-weights FILE]");
    };

    let defaults = InvestorProfile::default();
    let risk_tolerance: u8 = match flag_value(&args, "--risk") {
        Some(v) => v.parse().with_context(|| format!("--risk expects 0-10, got {v:?}"))?,
        None => defaults.risk_tolerance,
    };
    let horizon: f64 = match flag_value(&args, "--horizon") {
        Some(v) => v.parse().with_context(|| format!("--horizon expects years, got {v:?}"))?,
        None => defaults.investment_horizon_years,
    };
    let profile = InvestorProfile::new(risk_tolerance, horizon, flag_values(&args, "--theme"))?;

    let config = EngineConfig::from_env()?;
    let file = File::open(price_path).with_context(|| format!("opening {price_path}"))?;
    let prices = Arc::new(input::read_price_panel(file)?);

    tracing::info!(
        "Running pipeline: risk {}, horizon {}y, themes {:?}, timeout {:?}",
        profile.risk_tolerance,
        profile.investment_horizon_years,
        profile.themes,
        config.pipeline_timeout()
    );

    let backtester = Backtester::from_config(&config);
    let runner = BackgroundRunner::new(PortfolioPipeline::new(config)?);
    let mut report = runner.run(Arc::clone(&prices), profile).await?;

    if let Some(path) = flag_value(&args, "--backtest-weights") {
        let file = File::open(path).with_context(|| format!("opening {path}"))?;
        let schedule = input::read_weight_schedule(file)?;
        let result = backtester.run(&prices, &schedule)?;
        tracing::info!(
            "Backtest over {} dates: sharpe {:.2}, max drawdown {:.2}%",
            result.curve.len(),
            result.summary.sharpe,
            result.summary.max_dd * 100.0
        );
        report = report.with_backtest(result.summary);
    }

    if report.is_heuristic() {
        tracing::warn!("Predictive path unavailable; report holds the heuristic allocation");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
