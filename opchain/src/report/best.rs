//! Best-spread report rows, filters and ranking.
//!
//! A row pairs a screened candidate with snapshot context: the underlying
//! price and the distance between the short strike and the fair-value
//! anchor ("MMM"), expressed as a percentage of the underlying.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::{scan_expirations, ScreenError, ScreeningConfig, SpreadCandidate};
use crate::data::types::to_f64;
use crate::data::{ContractTable, Side, Snapshot};

/// Expiration whose anchor is the reference for `dm`/`dmu`.
pub const ANCHOR_REFERENCE_DAYS: i32 = 7;

/// One row of the best-spread report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSpread {
    pub symbol: String,
    pub underlying_price: f64,
    /// Expiration label, e.g. "17 DEC 21"
    pub exp_date: String,
    pub days_to_expiration: i32,
    pub side: Side,
    pub sell_strike: f64,
    pub buy_strike: f64,
    pub sell_delta: f64,
    pub buy_delta: f64,
    pub mg: f64,
    pub eml: f64,
    pub dme: f64,
    pub dme_w: f64,
    pub pop: f64,
    pub width: f64,
    pub e_w: f64,
    pub mg_w: f64,
    pub e: f64,
    pub ml: f64,
    /// Anchor nearest [`ANCHOR_REFERENCE_DAYS`]
    pub mmm: f64,
    /// Anchor nearest this row's expiration
    pub mmm2: f64,
    pub dm: f64,
    pub dm2: f64,
    pub dmu: f64,
    pub dmu2: f64,
    pub sell_description: String,
    pub buy_description: String,
}

impl BestSpread {
    pub fn from_candidate(candidate: &SpreadCandidate, snapshot: &Snapshot) -> Self {
        let underlying = snapshot.underlying_price;
        let mmm = snapshot
            .anchors
            .nearest(ANCHOR_REFERENCE_DAYS)
            .unwrap_or(0.0);
        let mmm2 = snapshot
            .anchors
            .nearest(candidate.days_to_expiration)
            .unwrap_or(0.0);

        let sell_strike = to_f64(candidate.sell.strike_price);
        let distance = |anchor: f64| match candidate.side {
            Side::Put => underlying - anchor - sell_strike,
            Side::Call => sell_strike - underlying - anchor,
        };
        let dm = distance(mmm);
        let dm2 = distance(mmm2);
        let pct = |d: f64| if underlying > 0.0 { d / underlying * 100.0 } else { 0.0 };

        let m = &candidate.metrics;
        Self {
            symbol: snapshot.symbol.clone(),
            underlying_price: underlying,
            exp_date: expiration_label(candidate.expiration_date),
            days_to_expiration: candidate.days_to_expiration,
            side: candidate.side,
            sell_strike,
            buy_strike: to_f64(candidate.buy.strike_price),
            sell_delta: candidate.sell.delta,
            buy_delta: candidate.buy.delta,
            mg: to_f64(m.max_gain),
            eml: m.eml,
            dme: m.dme,
            dme_w: m.dme_w,
            pop: m.pop,
            width: to_f64(m.width),
            e_w: m.e_w,
            mg_w: m.mg_w,
            e: m.expected_value,
            ml: to_f64(m.max_loss),
            mmm,
            mmm2,
            dm,
            dm2,
            dmu: pct(dm),
            dmu2: pct(dm2),
            sell_description: candidate.sell.description.clone(),
            buy_description: candidate.buy.description.clone(),
        }
    }
}

/// "17 DEC 21" style expiration label.
pub fn expiration_label(date: NaiveDate) -> String {
    date.format("%-d %b %y").to_string().to_uppercase()
}

/// Thresholds applied to best-spread rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFilter {
    pub min_days: i32,
    pub max_days: i32,
    pub min_e_w: f64,
    pub min_dmu: f64,
    pub min_dmu2: f64,
    pub min_dme_w: f64,
    pub min_mg: f64,
    /// Candidates kept per expiration before filtering.
    pub per_expiration: usize,
    /// Symbols reported separately from the per-expiration reports.
    pub index_symbols: Vec<String>,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            min_days: 38,
            max_days: 112,
            min_e_w: -1.0,
            min_dmu: 0.0,
            min_dmu2: -8.0,
            min_dme_w: 0.0,
            min_mg: 0.5,
            per_expiration: 30,
            index_symbols: ["DJI.C", "DIA", "$SPX.X", "SPY", "$NDX.X", "QQQ", "$RUT.X", "IWM", "$VIX.X", "VXX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ReportFilter {
    pub fn is_index(&self, symbol: &str) -> bool {
        self.index_symbols.iter().any(|s| s == symbol)
    }

    /// Expiration window and metric thresholds.
    pub fn passes(&self, row: &BestSpread) -> bool {
        row.days_to_expiration >= self.min_days
            && row.days_to_expiration <= self.max_days
            && row.e_w > self.min_e_w
            && row.dmu > self.min_dmu
            && row.dmu2 > self.min_dmu2
            && row.dme_w > self.min_dme_w
            && row.mg > self.min_mg
    }
}

/// Filtered report: one table per expiration, plus the index symbols.
#[derive(Debug, Clone, Default)]
pub struct BestReport {
    /// Non-index rows by days to expiration, best dme_w first.
    pub by_days: BTreeMap<i32, Vec<BestSpread>>,
    /// Index symbol rows, symbol descending.
    pub index: Vec<BestSpread>,
}

impl BestReport {
    pub fn is_empty(&self) -> bool {
        self.by_days.is_empty() && self.index.is_empty()
    }
}

/// Filter and rank best-spread rows.
pub fn build_report(rows: Vec<BestSpread>, filter: &ReportFilter) -> BestReport {
    let total = rows.len();
    let mut report = BestReport::default();

    for row in rows.into_iter().filter(|r| filter.passes(r)) {
        if filter.is_index(&row.symbol) {
            report.index.push(row);
        } else {
            report.by_days.entry(row.days_to_expiration).or_default().push(row);
        }
    }

    for rows in report.by_days.values_mut() {
        rows.sort_by(|a, b| b.dme_w.partial_cmp(&a.dme_w).unwrap_or(Ordering::Equal));
    }
    report.index.sort_by(|a, b| b.symbol.cmp(&a.symbol));

    info!(
        "report: {} of {} rows kept, {} expirations, {} index rows",
        report.by_days.values().map(Vec::len).sum::<usize>() + report.index.len(),
        total,
        report.by_days.len(),
        report.index.len()
    );
    report
}

/// Best rows of every expiration of the given sides.
pub fn best_spreads(
    contracts: &ContractTable,
    snapshot: &Snapshot,
    sides: &[Side],
    config: &ScreeningConfig,
    per_expiration: usize,
) -> Result<Vec<BestSpread>, ScreenError> {
    let mut rows = Vec::new();
    for &side in sides {
        for scan in scan_expirations(contracts, side, config, per_expiration)? {
            rows.extend(
                scan.candidates
                    .iter()
                    .map(|c| BestSpread::from_candidate(c, snapshot)),
            );
        }
    }
    Ok(rows)
}

#[cfg(test)]
pub(crate) fn sample_row(symbol: &str, days: i32, dme_w: f64) -> BestSpread {
    BestSpread {
        symbol: symbol.to_string(),
        underlying_price: 100.0,
        exp_date: "21 JAN 22".to_string(),
        days_to_expiration: days,
        side: Side::Put,
        sell_strike: 95.0,
        buy_strike: 90.0,
        sell_delta: -0.10,
        buy_delta: -0.05,
        mg: 1.0,
        eml: 0.5,
        dme: 0.5,
        dme_w,
        pop: 80.0,
        width: 5.0,
        e_w: 2.0,
        mg_w: 20.0,
        e: 0.1,
        ml: -4.0,
        mmm: 2.0,
        mmm2: 2.5,
        dm: 3.0,
        dm2: 2.5,
        dmu: 3.0,
        dmu2: 2.5,
        sell_description: "XYZ Jan 21 2022 95 Put".to_string(),
        buy_description: "XYZ Jan 21 2022 90 Put".to_string(),
    }
}
