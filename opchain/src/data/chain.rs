//! Broker option chain response parsing.
//!
//! The chains endpoint returns one document per underlying:
//!
//! ```text
//! { "symbol": "SPY", "status": "SUCCESS", "underlyingPrice": 440.1,
//!   "volatility": 29.0, "interestRate": 0.1,
//!   "putExpDateMap":  { "2021-12-17:45": { "440.0": [ {..quote..} ] } },
//!   "callExpDateMap": { ... } }
//! ```
//!
//! Expiration keys carry the expiration date and the days to expiration,
//! strike keys carry the strike. The side of every quote comes from the map
//! it was read from.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

use super::types::{to_decimal, to_f64, ContractTable, OptionContract, Side, Snapshot};
use crate::analytics::anchor::{estimate_anchors, QuoteBundle, StrikeQuote};

/// Sentinel the feed uses for a missing greek.
pub const MISSING_VALUE: f64 = -999.0;

/// Chain response errors.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid chain JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chain request failed for {0}")]
    Failed(String),

    #[error("Unexpected expiration key: {0}")]
    BadExpirationKey(String),

    #[error("Unexpected strike key: {0}")]
    BadStrikeKey(String),

    #[error("Underlying price not supplied for {0}")]
    MissingUnderlying(String),
}

/// Strike -> quotes at that strike.
pub type StrikeMap = BTreeMap<String, Vec<RawOption>>;

/// Expiration key -> strikes.
pub type ExpDateMap = BTreeMap<String, StrikeMap>;

/// Raw chain document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChain {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub underlying_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volatility: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_rate: Option<f64>,
    #[serde(default)]
    pub put_exp_date_map: ExpDateMap,
    #[serde(default)]
    pub call_exp_date_map: ExpDateMap,
}

/// One raw quote inside a strike bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOption {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strike_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub delta: Option<f64>,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub last: f64,
    #[serde(default)]
    pub mark: f64,
    #[serde(default)]
    pub open_interest: i64,
    #[serde(default)]
    pub total_volume: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub theoretical_option_value: Option<f64>,
}

/// Numbers that may arrive as numbers, numeric strings, "NaN" or null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|v| v.is_finite()))
}

/// Split an expiration key of the form `2021-12-17:45`.
pub fn parse_expiration_key(key: &str) -> Result<(NaiveDate, i32), ChainError> {
    let bad = || ChainError::BadExpirationKey(key.to_string());
    let (date, days) = key.split_once(':').ok_or_else(bad)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| bad())?;
    let days = days.parse::<i32>().map_err(|_| bad())?;
    Ok((date, days))
}

/// Which quotes to keep when normalizing a chain.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Keep one side only.
    pub side: Option<Side>,
    /// Keep only the expiration closest to this many days.
    pub days_to_expiration: Option<i32>,
    /// Drop PM-settled contracts.
    pub skip_pm_settled: bool,
    /// Drop in-the-money contracts.
    pub out_of_the_money_only: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            side: None,
            days_to_expiration: None,
            skip_pm_settled: true,
            out_of_the_money_only: true,
        }
    }
}

impl RawChain {
    /// Parse a chain document, rejecting responses the broker flagged as failed.
    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        let chain: RawChain = serde_json::from_str(json)?;
        if chain.status.eq_ignore_ascii_case("FAILED") {
            return Err(ChainError::Failed(chain.symbol));
        }
        Ok(chain)
    }

    fn underlying(&self) -> Result<f64, ChainError> {
        self.underlying_price
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ChainError::MissingUnderlying(self.symbol.clone()))
    }

    fn side_map(&self, side: Side) -> &ExpDateMap {
        match side {
            Side::Put => &self.put_exp_date_map,
            Side::Call => &self.call_exp_date_map,
        }
    }

    /// Normalize the chain into a contract table.
    pub fn contracts(&self, options: &IngestOptions) -> Result<ContractTable, ChainError> {
        let underlying = to_decimal(self.underlying()?);
        let mut table = ContractTable::default();

        for side in [Side::Put, Side::Call] {
            if options.side.is_some_and(|s| s != side) {
                continue;
            }
            for (exp_key, strikes) in self.side_map(side) {
                let (expiration_date, days_to_expiration) = parse_expiration_key(exp_key)?;
                for (strike_key, quotes) in strikes {
                    let strike = parse_strike(strike_key)?;
                    for quote in quotes {
                        let Some(delta) = quote.delta.filter(|d| *d != MISSING_VALUE) else {
                            debug!("skipping delta value: {:?} ({})", quote.delta, quote.description);
                            continue;
                        };
                        if options.skip_pm_settled && quote.description.contains("(PM)") {
                            debug!("skip PM option: {}", quote.description);
                            continue;
                        }
                        if options.out_of_the_money_only && is_in_the_money(side, strike, underlying) {
                            debug!(
                                "skip {} underlying: {} strike: {}",
                                side, underlying, strike
                            );
                            continue;
                        }

                        table.push(OptionContract {
                            symbol: quote.symbol.clone(),
                            description: quote.description.clone(),
                            side,
                            strike_price: quote.strike_price.map_or(strike, to_decimal),
                            delta,
                            bid: to_decimal(quote.bid),
                            ask: to_decimal(quote.ask),
                            last: to_decimal(quote.last),
                            mark: to_decimal(quote.mark),
                            open_interest: quote.open_interest,
                            total_volume: quote.total_volume,
                            theoretical_option_value: quote.theoretical_option_value.map_or(Decimal::ZERO, to_decimal),
                            days_to_expiration,
                            expiration_date,
                        });
                    }
                }
            }
        }

        info!("{}: ingested {} contracts", self.symbol, table.len());

        if let Some(target) = options.days_to_expiration {
            if let Some(days) = table.closest_days(target) {
                info!(
                    "{}: filter contracts for daysToExpiration={} (closest {})",
                    self.symbol, target, days
                );
                table = table.with_days(days);
            }
        }

        Ok(table)
    }

    /// Every quoted strike on one side, keyed by days to expiration.
    pub fn quote_bundle(&self, side: Side) -> Result<QuoteBundle, ChainError> {
        let mut bundle = QuoteBundle::new();
        for (exp_key, strikes) in self.side_map(side) {
            let (_, days) = parse_expiration_key(exp_key)?;
            let quotes = bundle.entry(days).or_default();
            for (strike_key, options) in strikes {
                let strike = parse_strike(strike_key)?;
                quotes.extend(options.iter().map(|o| StrikeQuote {
                    strike: o.strike_price.unwrap_or_else(|| to_f64(strike)),
                    mark: o.mark,
                }));
            }
        }
        Ok(bundle)
    }

    /// Snapshot scalars and fair-value anchors for this chain.
    pub fn snapshot(&self, run_date: NaiveDate) -> Result<Snapshot, ChainError> {
        let underlying = self.underlying()?;
        let puts = self.quote_bundle(Side::Put)?;
        let calls = self.quote_bundle(Side::Call)?;

        Ok(Snapshot {
            symbol: self.symbol.clone(),
            run_date,
            underlying_price: underlying,
            volatility: self.volatility.unwrap_or(0.0),
            interest_rate: self.interest_rate.unwrap_or(0.0),
            anchors: estimate_anchors(&puts, &calls, underlying),
        })
    }
}

fn parse_strike(key: &str) -> Result<Decimal, ChainError> {
    key.trim()
        .parse::<Decimal>()
        .map_err(|_| ChainError::BadStrikeKey(key.to_string()))
}

fn is_in_the_money(side: Side, strike: Decimal, underlying: Decimal) -> bool {
    match side {
        Side::Put => underlying <= strike,
        Side::Call => underlying >= strike,
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_CHAIN: &str = r#"{
    "symbol": "XYZ",
    "status": "SUCCESS",
    "underlyingPrice": 100.0,
    "volatility": 29.5,
    "interestRate": 0.1,
    "putExpDateMap": {
        "2022-01-21:30": {
            "90.0":  [{"symbol": "XYZ_012122P90",  "description": "XYZ Jan 21 2022 90 Put",  "strikePrice": 90.0,  "delta": -0.12, "bid": 0.75, "ask": 0.85, "last": 0.8, "mark": 0.8, "openInterest": 50, "totalVolume": 5}],
            "92.0":  [{"symbol": "XYZ_012122P92",  "description": "XYZ Jan 21 2022 92 Put",  "strikePrice": 92.0,  "delta": -0.20, "bid": 1.1, "ask": 1.2, "last": 1.15, "mark": 1.15, "openInterest": 50, "totalVolume": 5}],
            "94.0":  [{"symbol": "XYZ_012122P94",  "description": "XYZ Jan 21 2022 94 Put",  "strikePrice": 94.0,  "delta": -0.28, "bid": 1.6, "ask": 1.8, "last": 1.7, "mark": 1.7, "openInterest": 50, "totalVolume": 5}],
            "95.0":  [{"symbol": "XYZ_012122P95",  "description": "XYZ Jan 21 2022 95 Put",  "strikePrice": 95.0,  "delta": -0.30, "bid": 1.9, "ask": 2.1, "last": 2.0, "mark": 2.0, "openInterest": 50, "totalVolume": 5}],
            "97.0":  [{"symbol": "XYZ_012122P97",  "description": "XYZ Jan 21 2022 97 Put",  "strikePrice": 97.0,  "delta": "NaN", "bid": 2.5, "ask": 2.7, "last": 2.6, "mark": 2.6}],
            "99.0":  [{"symbol": "XYZ_012122P99",  "description": "XYZ Jan 21 2022 99 Put",  "strikePrice": 99.0,  "delta": -0.45, "bid": 3.0, "ask": 3.2, "last": 3.1, "mark": 3.1}],
            "101.0": [{"symbol": "XYZ_012122P101", "description": "XYZ Jan 21 2022 101 Put", "strikePrice": 101.0, "delta": -0.55, "bid": 3.9, "ask": 4.1, "last": 4.0, "mark": 4.0}]
        },
        "2022-02-18:58": {
            "95.0":  [{"symbol": "XYZ_021822P95",  "description": "XYZ Feb 18 2022 95 Put (PM)", "strikePrice": 95.0, "delta": -0.33, "mark": 2.9}],
            "99.0":  [{"symbol": "XYZ_021822P99",  "description": "XYZ Feb 18 2022 99 Put",  "strikePrice": 99.0, "delta": -999.0, "mark": 3.9}],
            "101.0": [{"symbol": "XYZ_021822P101", "description": "XYZ Feb 18 2022 101 Put", "strikePrice": 101.0, "delta": -0.56, "mark": 4.9}]
        }
    },
    "callExpDateMap": {
        "2022-01-21:30": {
            "99.0":  [{"symbol": "XYZ_012122C99",  "description": "XYZ Jan 21 2022 99 Call",  "strikePrice": 99.0,  "delta": 0.55, "mark": 3.3}],
            "101.0": [{"symbol": "XYZ_012122C101", "description": "XYZ Jan 21 2022 101 Call", "strikePrice": 101.0, "delta": 0.45, "mark": 2.5}],
            "105.0": [{"symbol": "XYZ_012122C105", "description": "XYZ Jan 21 2022 105 Call", "strikePrice": 105.0, "delta": 0.25, "mark": 1.2}]
        },
        "2022-02-18:58": {
            "99.0":  [{"symbol": "XYZ_021822C99",  "description": "XYZ Feb 18 2022 99 Call",  "strikePrice": 99.0,  "delta": 0.56, "mark": 4.3}],
            "101.0": [{"symbol": "XYZ_021822C101", "description": "XYZ Feb 18 2022 101 Call", "strikePrice": 101.0, "delta": 0.46, "mark": 3.5}]
        }
    }
}"#;
