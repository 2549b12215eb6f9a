//! CSV readers for the price panel and backtest weight schedules.

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{anyhow, bail, Context, Result};
use backtest_engine::WeightSchedule;
use chrono::NaiveDate;
use portfolio_core::{PricePanel, WeightVector};

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("bad date {raw:?}"))
}

/// Empty cells and non-numeric placeholders (`NaN`, `null`) are gaps.
fn parse_cell(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Wide price CSV: `date,TICKER1,TICKER2,...`, one row per trading date.
/// Rows may arrive in any order.
pub fn read_price_panel<R: Read>(reader: R) -> Result<PricePanel> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let tickers: Vec<String> = headers
        .iter()
        .skip(1)
        .map(|h| h.trim().to_uppercase())
        .collect();
    if tickers.is_empty() {
        bail!("price file has no ticker columns");
    }

    let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let Some(first) = record.get(0).filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        let date = parse_date(first)?;
        let prices = (0..tickers.len())
            .map(|i| record.get(i + 1).and_then(parse_cell))
            .collect();
        if rows.insert(date, prices).is_some() {
            bail!("duplicate price row for {date}");
        }
    }

    let (dates, rows): (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) = rows.into_iter().unzip();
    tracing::info!("Loaded {} price rows for {} tickers", dates.len(), tickers.len());
    Ok(PricePanel::new(dates, tickers, rows)?)
}

/// Long weight CSV: `date,ticker,weight`, one line per holding per decision
/// date.
pub fn read_weight_schedule<R: Read>(reader: R) -> Result<WeightSchedule> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut decisions: BTreeMap<NaiveDate, Vec<(String, f64)>> = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("weight row {} is missing column {}", line + 2, i + 1))
        };
        let date = parse_date(field(0)?)?;
        let ticker = field(1)?.to_uppercase();
        let weight: f64 = field(2)?
            .parse()
            .with_context(|| format!("bad weight on row {}", line + 2))?;

        let entry = decisions.entry(date).or_default();
        match entry.iter_mut().find(|(t, _)| *t == ticker) {
            Some((_, w)) => *w += weight,
            None => entry.push((ticker, weight)),
        }
    }
    if decisions.is_empty() {
        bail!("weight file has no decisions");
    }

    decisions
        .into_iter()
        .map(|(date, pairs)| -> Result<(NaiveDate, WeightVector)> {
            Ok((date, WeightVector::from_pairs(pairs)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wide_prices_sorted_and_gaps_filled() {
        let data = "date,spy,QQQ\n2024-01-03,101,,\n2024-01-02,100,200\n2024-01-04,102,NaN\n";
        let panel = read_price_panel(data.as_bytes()).unwrap();
        assert_eq!(panel.assets(), &["SPY".to_string(), "QQQ".to_string()]);
        assert_eq!(panel.dates()[0], NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(panel.price(0, 1), Some(200.0));
        // Missing values carry the last observation forward
        assert_eq!(panel.price(2, 1), Some(200.0));
        assert_abs_diff_eq!(panel.price(2, 0).unwrap(), 102.0);
    }

    #[test]
    fn test_duplicate_price_dates_rejected() {
        let data = "date,SPY\n2024-01-02,100\n2024-01-02,101\n";
        assert!(read_price_panel(data.as_bytes()).is_err());
    }

    #[test]
    fn test_bad_date_rejected() {
        let data = "date,SPY\n01/02/2024,100\n";
        assert!(read_price_panel(data.as_bytes()).is_err());
    }

    #[test]
    fn test_weight_schedule_groups_by_date() {
        let data = "date,ticker,weight\n\
                    2024-01-02,spy,0.6\n\
                    2024-01-02,QQQ,0.4\n\
                    2024-02-01,SPY,1.0\n";
        let schedule = read_weight_schedule(data.as_bytes()).unwrap();
        assert_eq!(schedule.len(), 2);
        let first = schedule.iter().next().unwrap().1;
        assert_abs_diff_eq!(first.get("SPY").unwrap(), 0.6);
        assert_abs_diff_eq!(first.get("QQQ").unwrap(), 0.4);
    }

    #[test]
    fn test_weight_schedule_requires_rows() {
        assert!(read_weight_schedule("date,ticker,weight\n".as_bytes()).is_err());
        assert!(read_weight_schedule("date,ticker,weight\n2024-01-02,SPY,abc\n".as_bytes()).is_err());
    }
}
