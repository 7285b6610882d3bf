//! Core data types for option chain screening.
//!
//! A fetched chain is normalized into a [`ContractTable`] (one row per
//! option contract) plus a [`Snapshot`] holding the per-fetch scalars that
//! every row shares.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Price or strike from a feed float.
///
/// Rounds to the float's shortest decimal form, so a quoted `10.2` becomes
/// exactly `10.2` and strike differences stay exact.
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Decimal amount as a float, for ratios and output.
pub fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

/// Side text that is neither PUT nor CALL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("side should be either PUT or CALL, got {0:?}")]
pub struct InvalidSide(pub String);

/// Option side (put or call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Put,
    Call,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Call => "CALL",
        }
    }
}

impl FromStr for Side {
    type Err = InvalidSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "P" | "PUT" => Ok(Self::Put),
            "C" | "CALL" => Ok(Self::Call),
            _ => Err(InvalidSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which quoted price is used as a leg's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    #[default]
    Mark,
    Last,
}

/// A single quoted option contract at one strike and expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Broker option symbol
    pub symbol: String,

    /// Free-text description, e.g. "SPY Dec 17 2021 440 Put"
    pub description: String,

    /// Put or call, fixed at ingestion
    pub side: Side,

    /// Strike price
    pub strike_price: Decimal,

    /// Delta as reported by the feed (negative for puts)
    pub delta: f64,

    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub mark: Decimal,

    pub open_interest: i64,
    pub total_volume: i64,

    /// Broker theoretical value
    pub theoretical_option_value: Decimal,

    /// Days to expiration
    pub days_to_expiration: i32,

    /// Expiration date
    pub expiration_date: NaiveDate,
}

impl OptionContract {
    /// Price of this contract under the given price field.
    pub fn price(&self, field: PriceField) -> Decimal {
        match field {
            PriceField::Mark => self.mark,
            PriceField::Last => self.last,
        }
    }

    /// Delta magnitude, independent of the side's sign convention.
    pub fn abs_delta(&self) -> f64 {
        self.delta.abs()
    }

    /// Probability of finishing out of the money, using delta as the proxy.
    pub fn pom(&self) -> f64 {
        1.0 - self.abs_delta()
    }

    /// Last price weighted by the out-of-the-money probability.
    pub fn meg(&self) -> f64 {
        to_f64(self.last) * self.pom()
    }

    /// `meg` per unit of underlying price.
    pub fn megu(&self, underlying_price: f64) -> f64 {
        if underlying_price > 0.0 {
            self.meg() / underlying_price
        } else {
            0.0
        }
    }
}

/// Fair-value anchor ("MMM") per days to expiration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairValueAnchors {
    anchors: BTreeMap<i32, f64>,
}

impl FairValueAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, days_to_expiration: i32, anchor: f64) {
        self.anchors.insert(days_to_expiration, anchor);
    }

    /// Anchor for an exact expiration.
    pub fn get(&self, days_to_expiration: i32) -> Option<f64> {
        self.anchors.get(&days_to_expiration).copied()
    }

    /// Anchor for the expiration closest to `target_days`.
    ///
    /// On a tie the shorter expiration wins.
    pub fn nearest(&self, target_days: i32) -> Option<f64> {
        let mut best: Option<(i32, f64)> = None;
        for (&days, &anchor) in &self.anchors {
            let diff = (days - target_days).abs();
            match best {
                Some((best_diff, _)) if diff >= best_diff => {}
                _ => best = Some((diff, anchor)),
            }
        }
        best.map(|(_, anchor)| anchor)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.anchors.iter().map(|(&d, &a)| (d, a))
    }
}

/// Per-fetch scalars shared by every contract of one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Underlying symbol
    pub symbol: String,

    /// Date the chain was fetched for
    pub run_date: NaiveDate,

    pub underlying_price: f64,
    pub volatility: f64,
    pub interest_rate: f64,

    /// Fair-value anchors by days to expiration
    pub anchors: FairValueAnchors,
}

/// Normalized option contracts for one underlying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractTable {
    contracts: Vec<OptionContract>,
}

impl ContractTable {
    pub fn new(contracts: Vec<OptionContract>) -> Self {
        Self { contracts }
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OptionContract> {
        self.contracts.iter()
    }

    pub fn as_slice(&self) -> &[OptionContract] {
        &self.contracts
    }

    pub fn push(&mut self, contract: OptionContract) {
        self.contracts.push(contract);
    }

    /// Distinct sides present, sorted.
    pub fn sides(&self) -> Vec<Side> {
        let mut sides: Vec<Side> = self.contracts.iter().map(|c| c.side).collect();
        sides.sort();
        sides.dedup();
        sides
    }

    /// Distinct days to expiration present, sorted ascending.
    pub fn days_to_expiration(&self) -> Vec<i32> {
        let mut days: Vec<i32> = self
            .contracts
            .iter()
            .map(|c| c.days_to_expiration)
            .collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    /// Available days to expiration closest to `target`.
    ///
    /// On a tie the shorter expiration wins.
    pub fn closest_days(&self, target: i32) -> Option<i32> {
        let mut closest: Option<i32> = None;
        for day in self.days_to_expiration() {
            match closest {
                Some(c) if (day - target).abs() >= (c - target).abs() => {}
                _ => closest = Some(day),
            }
        }
        closest
    }

    /// Contracts on one side with one expiration.
    pub fn restrict(&self, side: Side, days_to_expiration: i32) -> ContractTable {
        self.filter(|c| c.side == side && c.days_to_expiration == days_to_expiration)
    }

    /// Contracts on one side.
    pub fn with_side(&self, side: Side) -> ContractTable {
        self.filter(|c| c.side == side)
    }

    /// Contracts with one expiration.
    pub fn with_days(&self, days_to_expiration: i32) -> ContractTable {
        self.filter(|c| c.days_to_expiration == days_to_expiration)
    }

    fn filter<F>(&self, predicate: F) -> ContractTable
    where
        F: Fn(&OptionContract) -> bool,
    {
        ContractTable {
            contracts: self
                .contracts
                .iter()
                .filter(|c| predicate(c))
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<OptionContract> for ContractTable {
    fn from_iter<I: IntoIterator<Item = OptionContract>>(iter: I) -> Self {
        Self {
            contracts: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ContractTable {
    type Item = &'a OptionContract;
    type IntoIter = std::slice::Iter<'a, OptionContract>;

    fn into_iter(self) -> Self::IntoIter {
        self.contracts.iter()
    }
}

/// Test fixture builder shared by the unit tests of every module.
#[cfg(test)]
pub(crate) fn contract(side: Side, strike: f64, delta: f64, mark: f64, days: i32) -> OptionContract {
    let strike = to_decimal(strike);
    let mark = to_decimal(mark);
    let spread = Decimal::new(5, 2);
    OptionContract {
        symbol: format!("TEST_{}{}", side.as_str(), strike),
        description: format!("TEST Jan 21 2022 {} {}", strike, side.as_str()),
        side,
        strike_price: strike,
        delta,
        bid: mark - spread,
        ask: mark + spread,
        last: mark,
        mark,
        open_interest: 100,
        total_volume: 10,
        theoretical_option_value: mark,
        days_to_expiration: days,
        expiration_date: NaiveDate::from_ymd_opt(2022, 1, 21).unwrap(),
    }
}
