//! CSV output for candidates and best-spread reports.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use super::best::{BestReport, BestSpread};
use crate::analytics::SpreadCandidate;
use crate::data::types::to_f64;

/// Decimal places for float columns.
pub const FLOAT_PRECISION: usize = 2;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Screened candidates as a DataFrame.
pub fn candidates_to_dataframe(candidates: &[SpreadCandidate]) -> Result<DataFrame, ReportError> {
    let n = candidates.len();
    let mut side: Vec<&str> = Vec::with_capacity(n);
    let mut days: Vec<i32> = Vec::with_capacity(n);
    let mut s_description: Vec<&str> = Vec::with_capacity(n);
    let mut b_description: Vec<&str> = Vec::with_capacity(n);
    let mut s_strike: Vec<f64> = Vec::with_capacity(n);
    let mut b_strike: Vec<f64> = Vec::with_capacity(n);
    let mut s_delta: Vec<f64> = Vec::with_capacity(n);
    let mut b_delta: Vec<f64> = Vec::with_capacity(n);
    let mut s_mark: Vec<f64> = Vec::with_capacity(n);
    let mut b_mark: Vec<f64> = Vec::with_capacity(n);
    let mut s_volume: Vec<i64> = Vec::with_capacity(n);
    let mut b_volume: Vec<i64> = Vec::with_capacity(n);
    let mut credit: Vec<f64> = Vec::with_capacity(n);
    let mut width: Vec<f64> = Vec::with_capacity(n);
    let mut mg: Vec<f64> = Vec::with_capacity(n);
    let mut ml: Vec<f64> = Vec::with_capacity(n);
    let mut breakeven: Vec<f64> = Vec::with_capacity(n);
    let mut breakeven_delta: Vec<f64> = Vec::with_capacity(n);
    let mut pop: Vec<f64> = Vec::with_capacity(n);
    let mut e: Vec<f64> = Vec::with_capacity(n);
    let mut e_w: Vec<f64> = Vec::with_capacity(n);
    let mut mg_w: Vec<f64> = Vec::with_capacity(n);
    let mut eml: Vec<f64> = Vec::with_capacity(n);
    let mut dme: Vec<f64> = Vec::with_capacity(n);
    let mut dme_w: Vec<f64> = Vec::with_capacity(n);

    for c in candidates {
        let m = &c.metrics;
        side.push(c.side.as_str());
        days.push(c.days_to_expiration);
        s_description.push(&c.sell.description);
        b_description.push(&c.buy.description);
        s_strike.push(to_f64(c.sell.strike_price));
        b_strike.push(to_f64(c.buy.strike_price));
        s_delta.push(c.sell.delta);
        b_delta.push(c.buy.delta);
        s_mark.push(to_f64(c.sell.mark));
        b_mark.push(to_f64(c.buy.mark));
        s_volume.push(c.sell.total_volume);
        b_volume.push(c.buy.total_volume);
        credit.push(to_f64(m.credit));
        width.push(to_f64(m.width));
        mg.push(to_f64(m.max_gain));
        ml.push(to_f64(m.max_loss));
        breakeven.push(to_f64(m.breakeven_price));
        breakeven_delta.push(m.breakeven_delta);
        pop.push(m.pop);
        e.push(m.expected_value);
        e_w.push(m.e_w);
        mg_w.push(m.mg_w);
        eml.push(m.eml);
        dme.push(m.dme);
        dme_w.push(m.dme_w);
    }

    let df = DataFrame::new(vec![
        Series::new("side".into(), side).into(),
        Series::new("days".into(), days).into(),
        Series::new("s_description".into(), s_description).into(),
        Series::new("b_description".into(), b_description).into(),
        Series::new("s_strike".into(), s_strike).into(),
        Series::new("b_strike".into(), b_strike).into(),
        Series::new("s_delta".into(), s_delta).into(),
        Series::new("b_delta".into(), b_delta).into(),
        Series::new("s_mark".into(), s_mark).into(),
        Series::new("b_mark".into(), b_mark).into(),
        Series::new("s_total_volume".into(), s_volume).into(),
        Series::new("b_total_volume".into(), b_volume).into(),
        Series::new("credit".into(), credit).into(),
        Series::new("width".into(), width).into(),
        Series::new("mg".into(), mg).into(),
        Series::new("ml".into(), ml).into(),
        Series::new("be".into(), breakeven).into(),
        Series::new("bd".into(), breakeven_delta).into(),
        Series::new("pop".into(), pop).into(),
        Series::new("e".into(), e).into(),
        Series::new("e_w".into(), e_w).into(),
        Series::new("mg_w".into(), mg_w).into(),
        Series::new("eml".into(), eml).into(),
        Series::new("dme".into(), dme).into(),
        Series::new("dme_w".into(), dme_w).into(),
    ])?;

    Ok(df)
}

/// Best-spread rows as a DataFrame.
pub fn best_to_dataframe(rows: &[BestSpread]) -> Result<DataFrame, ReportError> {
    let n = rows.len();
    let mut symbol: Vec<&str> = Vec::with_capacity(n);
    let mut underlying: Vec<f64> = Vec::with_capacity(n);
    let mut exp_date: Vec<&str> = Vec::with_capacity(n);
    let mut days: Vec<i32> = Vec::with_capacity(n);
    let mut side: Vec<&str> = Vec::with_capacity(n);
    let mut s_strike: Vec<f64> = Vec::with_capacity(n);
    let mut b_strike: Vec<f64> = Vec::with_capacity(n);
    let mut s_delta: Vec<f64> = Vec::with_capacity(n);
    let mut b_delta: Vec<f64> = Vec::with_capacity(n);
    let mut mg: Vec<f64> = Vec::with_capacity(n);
    let mut eml: Vec<f64> = Vec::with_capacity(n);
    let mut dme: Vec<f64> = Vec::with_capacity(n);
    let mut dme_w: Vec<f64> = Vec::with_capacity(n);
    let mut pop: Vec<f64> = Vec::with_capacity(n);
    let mut width: Vec<f64> = Vec::with_capacity(n);
    let mut e_w: Vec<f64> = Vec::with_capacity(n);
    let mut mg_w: Vec<f64> = Vec::with_capacity(n);
    let mut e: Vec<f64> = Vec::with_capacity(n);
    let mut ml: Vec<f64> = Vec::with_capacity(n);
    let mut mmm: Vec<f64> = Vec::with_capacity(n);
    let mut dmu: Vec<f64> = Vec::with_capacity(n);
    let mut dmu2: Vec<f64> = Vec::with_capacity(n);
    let mut s_description: Vec<&str> = Vec::with_capacity(n);
    let mut b_description: Vec<&str> = Vec::with_capacity(n);

    for r in rows {
        symbol.push(&r.symbol);
        underlying.push(r.underlying_price);
        exp_date.push(&r.exp_date);
        days.push(r.days_to_expiration);
        side.push(r.side.as_str());
        s_strike.push(r.sell_strike);
        b_strike.push(r.buy_strike);
        s_delta.push(r.sell_delta);
        b_delta.push(r.buy_delta);
        mg.push(r.mg);
        eml.push(r.eml);
        dme.push(r.dme);
        dme_w.push(r.dme_w);
        pop.push(r.pop);
        width.push(r.width);
        e_w.push(r.e_w);
        mg_w.push(r.mg_w);
        e.push(r.e);
        ml.push(r.ml);
        mmm.push(r.mmm);
        dmu.push(r.dmu);
        dmu2.push(r.dmu2);
        s_description.push(&r.sell_description);
        b_description.push(&r.buy_description);
    }

    let df = DataFrame::new(vec![
        Series::new("symbol".into(), symbol).into(),
        Series::new("underlying".into(), underlying).into(),
        Series::new("exp_date".into(), exp_date).into(),
        Series::new("days".into(), days).into(),
        Series::new("side".into(), side).into(),
        Series::new("s_strike".into(), s_strike).into(),
        Series::new("b_strike".into(), b_strike).into(),
        Series::new("s_delta".into(), s_delta).into(),
        Series::new("b_delta".into(), b_delta).into(),
        Series::new("mg".into(), mg).into(),
        Series::new("eml".into(), eml).into(),
        Series::new("dme".into(), dme).into(),
        Series::new("dme_w".into(), dme_w).into(),
        Series::new("pop".into(), pop).into(),
        Series::new("width".into(), width).into(),
        Series::new("e_w".into(), e_w).into(),
        Series::new("mg_w".into(), mg_w).into(),
        Series::new("e".into(), e).into(),
        Series::new("ml".into(), ml).into(),
        Series::new("mmm".into(), mmm).into(),
        Series::new("dmu".into(), dmu).into(),
        Series::new("dmu2".into(), dmu2).into(),
        Series::new("s_description".into(), s_description).into(),
        Series::new("b_description".into(), b_description).into(),
    ])?;

    Ok(df)
}

/// Write a DataFrame as CSV with a header row and two-decimal floats.
pub fn write_csv<W: Write>(df: &mut DataFrame, writer: W) -> Result<(), ReportError> {
    CsvWriter::new(writer)
        .include_header(true)
        .with_float_precision(Some(FLOAT_PRECISION))
        .finish(df)?;
    Ok(())
}

/// Write one file per expiration plus the index file.
///
/// Files are named `best-{run_date}-{days}.csv` and
/// `best-{run_date}-index.csv`. Returns the written paths.
pub fn write_report(
    report: &BestReport,
    out_dir: &Path,
    run_date: NaiveDate,
) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(out_dir)?;
    let date = run_date.format("%Y-%m-%d");
    let mut written = Vec::new();

    for (days, rows) in &report.by_days {
        let path = out_dir.join(format!("best-{}-{}.csv", date, days));
        let mut df = best_to_dataframe(rows)?;
        write_csv(&mut df, fs::File::create(&path)?)?;
        info!("wrote {} rows to {}", rows.len(), path.display());
        written.push(path);
    }

    if !report.index.is_empty() {
        let path = out_dir.join(format!("best-{}-index.csv", date));
        let mut df = best_to_dataframe(&report.index)?;
        write_csv(&mut df, fs::File::create(&path)?)?;
        info!("wrote {} index rows to {}", report.index.len(), path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::best::{build_report, sample_row, ReportFilter};

    #[test]
    fn test_best_dataframe_shape() {
        let rows = vec![sample_row("AAA", 45, 1.0), sample_row("BBB", 45, 2.0)];
        let df = best_to_dataframe(&rows).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 24);
        assert_eq!(df.get_column_names()[0].as_str(), "symbol");
    }

    #[test]
    fn test_csv_two_decimals() {
        let mut row = sample_row("AAA", 45, 1.0);
        row.e_w = 1.23456;
        let mut df = best_to_dataframe(&[row]).unwrap();

        let mut buf: Vec<u8> = Vec::new();
        write_csv(&mut df, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("symbol,underlying,exp_date,days,side"));
        let body = lines.next().unwrap();
        assert!(body.starts_with("AAA,100.00,21 JAN 22,45,PUT"));
        assert!(body.contains(",1.23,"));
    }

    #[test]
    fn test_empty_candidates_frame() {
        let df = candidates_to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 25);
    }

    #[test]
    fn test_write_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            sample_row("AAA", 45, 1.0),
            sample_row("BBB", 73, 2.0),
            sample_row("SPY", 45, 3.0),
        ];
        let report = build_report(rows, &ReportFilter::default());
        let run_date = NaiveDate::from_ymd_opt(2021, 12, 22).unwrap();

        let paths = write_report(&report, dir.path(), run_date).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(dir.path().join("best-2021-12-22-45.csv").is_file());
        assert!(dir.path().join("best-2021-12-22-73.csv").is_file());
        assert!(dir.path().join("best-2021-12-22-index.csv").is_file());
    }
}
