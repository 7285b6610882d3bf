//! Credit spread screening and candidate selection.
//!
//! Screens one side and one expiration of a contract table for credit
//! spreads:
//! - Sell leg delta inside the sell band, buy leg delta inside the buy band
//! - Sold strike closer to the money than the bought strike
//! - Bought leg carries no more delta than the sold leg
//! - Net credit, minimum width and a bracketed breakeven (see [`super::metrics`])
//!
//! Candidates come back sorted by expected value per unit of width.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::metrics::{compute_metrics, MetricsParams, SpreadLeg, SpreadMetrics};
use crate::data::{ContractTable, InvalidSide, OptionContract, PriceField, Side};

/// Screening configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScreenError {
    #[error(transparent)]
    InvalidSide(#[from] InvalidSide),

    #[error("side should be either PUT or CALL, table holds {found:?}")]
    UndeterminedSide { found: Vec<Side> },

    #[error("set days_to_expiration to one of the values in: {available:?}")]
    AmbiguousExpiration { available: Vec<i32> },
}

/// Delta magnitude band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRange {
    pub min: f64,
    pub max: f64,
}

impl DeltaRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `min <= |delta| <= max`
    pub fn contains(&self, delta: f64) -> bool {
        let d = delta.abs();
        d >= self.min && d <= self.max
    }

    /// `min < |delta| < max`
    pub fn contains_open(&self, delta: f64) -> bool {
        let d = delta.abs();
        d > self.min && d < self.max
    }
}

/// Sell and buy bands for one side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaBands {
    pub sell: DeltaRange,
    pub buy: DeltaRange,
}

/// Configuration for spread screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Side to screen; inferred from the table when unset.
    pub side: Option<Side>,
    /// Expiration to screen; inferred when the table holds only one.
    pub days_to_expiration: Option<i32>,
    /// Sell band override for whichever side is screened.
    pub sell_range: Option<DeltaRange>,
    /// Buy band override for whichever side is screened.
    pub buy_range: Option<DeltaRange>,
    /// Default bands for put spreads.
    pub put_bands: DeltaBands,
    /// Default bands for call spreads.
    pub call_bands: DeltaBands,
    /// Narrowest acceptable strike distance.
    pub min_width: Decimal,
    /// Price used for each leg.
    pub price_field: PriceField,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            side: None,
            days_to_expiration: None,
            sell_range: None,
            buy_range: None,
            put_bands: DeltaBands {
                sell: DeltaRange::new(0.05, 0.12),
                buy: DeltaRange::new(0.009, 0.12),
            },
            call_bands: DeltaBands {
                sell: DeltaRange::new(0.05, 0.15),
                buy: DeltaRange::new(0.009, 0.15),
            },
            min_width: Decimal::from(25),
            price_field: PriceField::Mark,
        }
    }
}

impl ScreeningConfig {
    /// Effective bands for a side, overrides first.
    pub fn bands_for(&self, side: Side) -> DeltaBands {
        let defaults = match side {
            Side::Put => self.put_bands,
            Side::Call => self.call_bands,
        };
        DeltaBands {
            sell: self.sell_range.unwrap_or(defaults.sell),
            buy: self.buy_range.unwrap_or(defaults.buy),
        }
    }

    /// Set the side from its text form (`PUT`, `CALL`, `P`, `C`).
    pub fn set_side(&mut self, side: &str) -> Result<(), ScreenError> {
        self.side = Some(side.parse::<Side>()?);
        Ok(())
    }

    /// Copy of this configuration pinned to one side and expiration.
    pub fn pinned(&self, side: Side, days_to_expiration: i32) -> Self {
        Self {
            side: Some(side),
            days_to_expiration: Some(days_to_expiration),
            ..self.clone()
        }
    }
}

/// A credit spread candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadCandidate {
    pub side: Side,
    pub days_to_expiration: i32,
    pub expiration_date: NaiveDate,
    /// Short leg.
    pub sell: SpreadLeg,
    /// Long leg.
    pub buy: SpreadLeg,
    pub metrics: SpreadMetrics,
}

impl SpreadCandidate {
    /// Expected value per unit of width, the ranking key.
    pub fn e_w(&self) -> f64 {
        self.metrics.e_w
    }
}

/// Spread screener for finding credit spread candidates.
#[derive(Debug, Clone, Default)]
pub struct SpreadScreener {
    config: ScreeningConfig,
}

impl SpreadScreener {
    pub fn new(config: ScreeningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    /// Screen a contract table for credit spread candidates.
    ///
    /// Fails only on configuration problems: a table mixing sides with no
    /// side configured, or several expirations with none configured. Data
    /// that yields no viable spread returns an empty list.
    pub fn screen(&self, contracts: &ContractTable) -> Result<Vec<SpreadCandidate>, ScreenError> {
        if contracts.is_empty() {
            warn!("screen: no contracts");
            return Ok(Vec::new());
        }

        let side = self.resolve_side(contracts)?;
        let days = self.resolve_days(contracts)?;
        let bands = self.config.bands_for(side);
        info!(
            "screen - {} contracts - using side: {}, days_to_expiration: {}",
            contracts.len(),
            side,
            days
        );

        let table = contracts.restrict(side, days);

        let buys: Vec<&OptionContract> = table.iter().filter(|c| bands.buy.contains(c.delta)).collect();
        if buys.is_empty() {
            info!("screen: no buy rows in {:?}", bands.buy);
            return Ok(Vec::new());
        }

        let sells: Vec<&OptionContract> = table
            .iter()
            .filter(|c| bands.sell.contains_open(c.delta))
            .collect();
        if sells.is_empty() {
            info!("screen: no sell rows in {:?}", bands.sell);
            return Ok(Vec::new());
        }
        info!("screen {} buy rows: {}, sell rows: {}", side, buys.len(), sells.len());

        let params = MetricsParams {
            min_width: self.config.min_width,
            price_field: self.config.price_field,
        };

        let mut candidates = Vec::new();
        for buy in &buys {
            for sell in &sells {
                if !self.is_valid_pair(side, days, &bands, buy, sell) {
                    continue;
                }

                let sell_leg = SpreadLeg::from(*sell);
                let buy_leg = SpreadLeg::from(*buy);
                match compute_metrics(side, &sell_leg, &buy_leg, table.as_slice(), &params) {
                    Ok(metrics) => candidates.push(SpreadCandidate {
                        side,
                        days_to_expiration: days,
                        expiration_date: sell.expiration_date,
                        sell: sell_leg,
                        buy: buy_leg,
                        metrics,
                    }),
                    Err(reason) => debug!(
                        "reject sell {} / buy {}: {:?}",
                        sell.strike_price, buy.strike_price, reason
                    ),
                }
            }
        }

        rank_by_e_w(&mut candidates);
        info!(
            "screen: returning {} candidates from {} contracts",
            candidates.len(),
            contracts.len()
        );

        Ok(candidates)
    }

    fn resolve_side(&self, contracts: &ContractTable) -> Result<Side, ScreenError> {
        if let Some(side) = self.config.side {
            return Ok(side);
        }
        match contracts.sides().as_slice() {
            [side] => Ok(*side),
            found => Err(ScreenError::UndeterminedSide {
                found: found.to_vec(),
            }),
        }
    }

    fn resolve_days(&self, contracts: &ContractTable) -> Result<i32, ScreenError> {
        if let Some(days) = self.config.days_to_expiration {
            return Ok(days);
        }
        match contracts.days_to_expiration().as_slice() {
            [days] => Ok(*days),
            available => Err(ScreenError::AmbiguousExpiration {
                available: available.to_vec(),
            }),
        }
    }

    fn is_valid_pair(
        &self,
        side: Side,
        days: i32,
        bands: &DeltaBands,
        buy: &OptionContract,
        sell: &OptionContract,
    ) -> bool {
        if buy.days_to_expiration != days || sell.days_to_expiration != days {
            debug!("skip pair, days_to_expiration != {}", days);
            return false;
        }
        if buy.side != side || sell.side != side {
            debug!("skip pair, side != {}", side);
            return false;
        }
        if !bands.buy.contains(buy.delta) {
            debug!("skip buy delta {} out of range: {:?}", buy.delta, bands.buy);
            return false;
        }
        if !bands.sell.contains(sell.delta) {
            debug!("skip sell delta {:.3} out of range: {:?}", sell.delta.abs(), bands.sell);
            return false;
        }

        let ordered = match side {
            Side::Put => buy.strike_price < sell.strike_price,
            Side::Call => buy.strike_price > sell.strike_price,
        };
        if !ordered {
            debug!(
                "skip pair, buy strike {} / sell strike {} wrong way round for {}",
                buy.strike_price, sell.strike_price, side
            );
            return false;
        }

        if buy.abs_delta() > sell.abs_delta() {
            debug!("skip pair, buy delta {} greater than sell delta {}", buy.delta, sell.delta);
            return false;
        }

        true
    }
}

/// Sort candidates by e_w, descending. Ties keep their order.
pub fn rank_by_e_w(candidates: &mut [SpreadCandidate]) {
    candidates.sort_by(|a, b| {
        b.e_w()
            .partial_cmp(&a.e_w())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::contract;
    use rust_decimal_macros::dec;

    fn put_table() -> ContractTable {
        ContractTable::new(vec![
            contract(Side::Put, 85.0, -0.06, 0.40, 30),
            contract(Side::Put, 88.0, -0.09, 0.60, 30),
            contract(Side::Put, 90.0, -0.12, 0.80, 30),
            contract(Side::Put, 92.0, -0.20, 1.15, 30),
            contract(Side::Put, 94.0, -0.28, 1.70, 30),
            contract(Side::Put, 95.0, -0.30, 2.00, 30),
            contract(Side::Put, 97.0, -0.40, 2.80, 30),
        ])
    }

    fn put_config() -> ScreeningConfig {
        ScreeningConfig {
            sell_range: Some(DeltaRange::new(0.10, 0.35)),
            buy_range: Some(DeltaRange::new(0.05, 0.20)),
            min_width: dec!(2),
            ..ScreeningConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ScreeningConfig::default();
        assert_eq!(config.min_width, dec!(25));
        assert_eq!(config.price_field, PriceField::Mark);
        assert_eq!(config.bands_for(Side::Put).sell, DeltaRange::new(0.05, 0.12));
        assert_eq!(config.bands_for(Side::Put).buy, DeltaRange::new(0.009, 0.12));
        assert_eq!(config.bands_for(Side::Call).sell, DeltaRange::new(0.05, 0.15));
        assert_eq!(config.bands_for(Side::Call).buy, DeltaRange::new(0.009, 0.15));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ScreeningConfig =
            serde_json::from_str(r#"{"side": "CALL", "min_width": 5.0}"#).unwrap();
        assert_eq!(config.side, Some(Side::Call));
        assert_eq!(config.min_width, dec!(5));
        assert_eq!(config.put_bands, ScreeningConfig::default().put_bands);

        let bad = serde_json::from_str::<ScreeningConfig>(r#"{"side": "STRADDLE"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_set_side_from_text() {
        let mut config = ScreeningConfig::default();
        config.set_side("c").unwrap();
        assert_eq!(config.side, Some(Side::Call));

        let err = config.set_side("straddle").unwrap_err();
        assert_eq!(err, ScreenError::InvalidSide(InvalidSide("straddle".to_string())));
        assert_eq!(config.side, Some(Side::Call));
    }

    #[test]
    fn test_delta_range_bounds() {
        let range = DeltaRange::new(0.05, 0.12);
        assert!(range.contains(-0.05));
        assert!(range.contains(0.12));
        assert!(!range.contains_open(0.05));
        assert!(!range.contains_open(-0.12));
        assert!(range.contains_open(-0.10));
    }

    #[test]
    fn test_put_candidates_ordering_and_invariants() {
        let screener = SpreadScreener::new(put_config());
        let candidates = screener.screen(&put_table()).unwrap();
        assert!(!candidates.is_empty());

        for c in &candidates {
            assert_eq!(c.side, Side::Put);
            assert!(c.buy.strike_price < c.sell.strike_price);
            assert!(c.metrics.credit > Decimal::ZERO);
            assert!(c.metrics.width >= dec!(2));
            assert!(c.buy.delta.abs() <= c.sell.delta.abs());
        }
        for pair in candidates.windows(2) {
            assert!(pair[0].e_w() >= pair[1].e_w());
        }
    }

    #[test]
    fn test_scenario_spread_present() {
        let screener = SpreadScreener::new(put_config());
        let candidates = screener.screen(&put_table()).unwrap();
        let c = candidates
            .iter()
            .find(|c| c.sell.strike_price == dec!(95) && c.buy.strike_price == dec!(90))
            .unwrap();
        assert_eq!(c.metrics.credit, dec!(1.2));
        assert_eq!(c.metrics.breakeven_price, dec!(93.8));
        assert!((c.metrics.pop - 72.8).abs() < 1e-9);
    }

    #[test]
    fn test_band_edges_in_screen() {
        let table = ContractTable::new(vec![
            contract(Side::Put, 85.0, -0.05, 0.30, 30),
            contract(Side::Put, 88.0, -0.10, 0.55, 30),
            contract(Side::Put, 90.0, -0.20, 0.90, 30),
            contract(Side::Put, 93.0, -0.25, 1.60, 30),
            contract(Side::Put, 95.0, -0.30, 2.10, 30),
        ]);
        let config = ScreeningConfig {
            sell_range: Some(DeltaRange::new(0.10, 0.30)),
            buy_range: Some(DeltaRange::new(0.05, 0.20)),
            min_width: dec!(1),
            ..ScreeningConfig::default()
        };
        let candidates = SpreadScreener::new(config).screen(&table).unwrap();
        assert!(!candidates.is_empty());

        // sell deltas on either edge of the sell band never sell
        assert!(candidates
            .iter()
            .all(|c| c.sell.strike_price != dec!(95) && c.sell.strike_price != dec!(88)));

        // buy deltas on either edge of the buy band still pair
        assert!(candidates
            .iter()
            .any(|c| c.buy.strike_price == dec!(90) && c.sell.strike_price == dec!(93)));
        assert!(candidates.iter().any(|c| c.buy.strike_price == dec!(85)));
    }

    #[test]
    fn test_call_candidates_strike_order() {
        let table = ContractTable::new(vec![
            contract(Side::Call, 103.0, 0.40, 3.00, 30),
            contract(Side::Call, 105.0, 0.30, 2.00, 30),
            contract(Side::Call, 107.0, 0.22, 1.40, 30),
            contract(Side::Call, 110.0, 0.10, 0.50, 30),
            contract(Side::Call, 115.0, 0.04, 0.15, 30),
        ]);
        let config = ScreeningConfig {
            sell_range: Some(DeltaRange::new(0.10, 0.35)),
            buy_range: Some(DeltaRange::new(0.01, 0.25)),
            min_width: dec!(2),
            ..ScreeningConfig::default()
        };
        let candidates = SpreadScreener::new(config).screen(&table).unwrap();
        assert!(!candidates.is_empty());
        for c in &candidates {
            assert_eq!(c.side, Side::Call);
            assert!(c.buy.strike_price > c.sell.strike_price);
            assert!(c.metrics.credit > Decimal::ZERO);
        }
    }

    #[test]
    fn test_empty_buy_band_yields_no_candidates() {
        let config = ScreeningConfig {
            buy_range: Some(DeltaRange::new(0.90, 0.95)),
            ..put_config()
        };
        let candidates = SpreadScreener::new(config).screen(&put_table()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_empty_table() {
        let candidates = SpreadScreener::default().screen(&ContractTable::default()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_mixed_sides_without_side_is_error() {
        let table = ContractTable::new(vec![
            contract(Side::Put, 90.0, -0.12, 0.80, 30),
            contract(Side::Call, 110.0, 0.12, 0.80, 30),
        ]);
        let err = SpreadScreener::default().screen(&table).unwrap_err();
        assert_eq!(
            err,
            ScreenError::UndeterminedSide {
                found: vec![Side::Put, Side::Call]
            }
        );
    }

    #[test]
    fn test_ambiguous_expiration_is_error() {
        let table = ContractTable::new(vec![
            contract(Side::Put, 90.0, -0.12, 0.80, 30),
            contract(Side::Put, 90.0, -0.10, 0.90, 58),
        ]);
        let err = SpreadScreener::default().screen(&table).unwrap_err();
        assert_eq!(
            err,
            ScreenError::AmbiguousExpiration {
                available: vec![30, 58]
            }
        );
    }

    #[test]
    fn test_explicit_expiration_restricts_table() {
        let mut contracts: Vec<OptionContract> = put_table().iter().cloned().collect();
        contracts.push(contract(Side::Put, 95.0, -0.31, 3.50, 58));
        contracts.push(contract(Side::Put, 90.0, -0.13, 1.20, 58));
        let config = ScreeningConfig {
            days_to_expiration: Some(30),
            ..put_config()
        };
        let candidates = SpreadScreener::new(config)
            .screen(&ContractTable::new(contracts))
            .unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.days_to_expiration == 30));
    }

    #[test]
    fn test_buy_delta_above_sell_delta_rejected() {
        // Both contracts fall inside both bands.
        let table = ContractTable::new(vec![
            contract(Side::Put, 90.0, -0.15, 0.50, 30),
            contract(Side::Put, 92.0, -0.14, 1.50, 30),
            contract(Side::Put, 94.0, -0.30, 2.50, 30),
        ]);
        let config = ScreeningConfig {
            sell_range: Some(DeltaRange::new(0.10, 0.20)),
            buy_range: Some(DeltaRange::new(0.10, 0.20)),
            min_width: dec!(1),
            ..ScreeningConfig::default()
        };
        let candidates = SpreadScreener::new(config).screen(&table).unwrap();
        // buy 90 / sell 92 is the only strike-ordered pair, and its bought leg
        // carries more delta than the sold leg
        assert!(candidates.is_empty());
    }
}
