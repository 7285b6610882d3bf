//! Risk/reward metrics for a credit spread.
//!
//! The outcome space at expiration is split into four zones using the short
//! leg delta, the long leg delta and the delta interpolated at the breakeven
//! price:
//!
//! | zone | region                      | probability        | payoff          |
//! |------|-----------------------------|--------------------|-----------------|
//! | A    | beyond the short strike     | `1 - |sd|`         | `max_gain`      |
//! | B    | short strike .. breakeven   | `|sd - bd|`        | `max_gain / 2`  |
//! | C    | breakeven .. long strike    | `|ld - bd|`        | `max_loss / 2`  |
//! | D    | beyond the long strike      | `|ld|`             | `max_loss`      |
//!
//! The expected value is the probability-weighted sum of the four payoffs.
//! With delta only a proxy, the four probabilities sum to one only when the
//! breakeven delta falls between the two leg deltas.
//!
//! Credit, width, gain, loss and breakeven are exact decimal amounts; the
//! probability-weighted figures are floats.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::probability::interpolate_delta;
use crate::data::types::to_f64;
use crate::data::{OptionContract, PriceField, Side};

/// The fields of a contract a spread leg keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadLeg {
    pub description: String,
    pub last: Decimal,
    pub mark: Decimal,
    pub delta: f64,
    pub strike_price: Decimal,
    pub total_volume: i64,
}

impl SpreadLeg {
    pub fn price(&self, field: PriceField) -> Decimal {
        match field {
            PriceField::Mark => self.mark,
            PriceField::Last => self.last,
        }
    }
}

impl From<&OptionContract> for SpreadLeg {
    fn from(c: &OptionContract) -> Self {
        Self {
            description: c.description.clone(),
            last: c.last,
            mark: c.mark,
            delta: c.delta,
            strike_price: c.strike_price,
            total_volume: c.total_volume,
        }
    }
}

/// Why a pairing produced no metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Sell price does not exceed buy price.
    NoCredit { credit: Decimal },
    /// Strikes closer than the minimum width.
    TooNarrow { width: Decimal },
    /// No quoted strikes bracket the breakeven price.
    NoBreakevenBracket { breakeven: Decimal },
}

/// Zone probabilities of the four-way outcome partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneProbabilities {
    pub max_gain: f64,
    pub partial_gain: f64,
    pub partial_loss: f64,
    pub max_loss: f64,
}

impl ZoneProbabilities {
    /// Leg deltas may carry the feed's sign; only magnitudes are used.
    pub fn new(sell_delta: f64, buy_delta: f64, breakeven_delta: f64) -> Self {
        let sell_delta = sell_delta.abs();
        let buy_delta = buy_delta.abs();
        let breakeven_delta = breakeven_delta.abs();
        Self {
            max_gain: 1.0 - sell_delta,
            partial_gain: (sell_delta - breakeven_delta).abs(),
            partial_loss: (buy_delta - breakeven_delta).abs(),
            max_loss: buy_delta,
        }
    }

    pub fn total(&self) -> f64 {
        self.max_gain + self.partial_gain + self.partial_loss + self.max_loss
    }

    /// Probability-weighted payoff.
    pub fn expected_value(&self, max_gain: f64, max_loss: f64) -> f64 {
        self.max_gain * max_gain
            + self.partial_gain * 0.5 * max_gain
            + self.partial_loss * 0.5 * max_loss
            + self.max_loss * max_loss
    }
}

/// Derived metrics of one spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadMetrics {
    /// Net premium collected.
    pub credit: Decimal,
    /// Strike distance between the legs.
    pub width: Decimal,
    pub max_gain: Decimal,
    /// Negative: `-(width - credit)`.
    pub max_loss: Decimal,
    pub breakeven_price: Decimal,
    pub breakeven_delta: f64,
    /// Probability of profit, percent.
    pub pop: f64,
    /// Expected value (`e`).
    pub expected_value: f64,
    /// `100 * e / width`
    pub e_w: f64,
    /// `100 * max_gain / width`
    pub mg_w: f64,
    /// Delta-implied naive expected max gain, `width * |sell delta|`.
    pub eml: f64,
    /// `max_gain - eml`
    pub dme: f64,
    /// `mg_w - 100 * |sell delta|`
    pub dme_w: f64,
}

/// Inputs that tune the metric filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsParams {
    pub min_width: Decimal,
    pub price_field: PriceField,
}

/// Compute spread metrics, or the reason the pairing is not a viable spread.
///
/// `side_table` holds the contracts of the spread's side and expiration and
/// is used to interpolate the breakeven delta.
pub fn compute_metrics(
    side: Side,
    sell: &SpreadLeg,
    buy: &SpreadLeg,
    side_table: &[OptionContract],
    params: &MetricsParams,
) -> Result<SpreadMetrics, Rejection> {
    let credit = sell.price(params.price_field) - buy.price(params.price_field);
    if credit <= Decimal::ZERO {
        return Err(Rejection::NoCredit { credit });
    }

    let width = (sell.strike_price - buy.strike_price).abs();
    if width < params.min_width {
        return Err(Rejection::TooNarrow { width });
    }

    let max_gain = credit;
    let max_loss = -(width - credit);

    let breakeven_price = match side {
        Side::Call => sell.strike_price + credit,
        Side::Put => sell.strike_price - credit,
    };

    let breakeven_delta = interpolate_delta(breakeven_price, side_table).ok_or(
        Rejection::NoBreakevenBracket {
            breakeven: breakeven_price,
        },
    )?;
    let pop = 100.0 * (1.0 - breakeven_delta);

    let mg = to_f64(max_gain);
    let w = to_f64(width);

    let zones = ZoneProbabilities::new(sell.delta, buy.delta, breakeven_delta);
    let expected_value = zones.expected_value(mg, to_f64(max_loss));

    let sell_delta = sell.delta.abs();
    let mg_w = 100.0 * mg / w;
    let e_w = 100.0 * expected_value / w;
    let eml = w * sell_delta;
    let dme = mg - eml;
    let dme_w = mg_w - 100.0 * sell_delta;

    Ok(SpreadMetrics {
        credit,
        width,
        max_gain,
        max_loss,
        breakeven_price,
        breakeven_delta,
        pop,
        expected_value,
        e_w,
        mg_w,
        eml,
        dme,
        dme_w,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::contract;
    use rust_decimal_macros::dec;

    fn table() -> Vec<OptionContract> {
        vec![
            contract(Side::Put, 90.0, -0.12, 0.80, 30),
            contract(Side::Put, 92.0, -0.20, 1.15, 30),
            contract(Side::Put, 94.0, -0.28, 1.70, 30),
            contract(Side::Put, 95.0, -0.30, 2.00, 30),
        ]
    }

    fn params(min_width: Decimal) -> MetricsParams {
        MetricsParams {
            min_width,
            price_field: PriceField::Mark,
        }
    }

    #[test]
    fn test_put_scenario() {
        let table = table();
        let sell = SpreadLeg::from(&table[3]);
        let buy = SpreadLeg::from(&table[0]);

        let m = compute_metrics(Side::Put, &sell, &buy, &table, &params(dec!(5))).unwrap();

        assert_eq!(m.credit, dec!(1.20));
        assert_eq!(m.width, dec!(5));
        assert_eq!(m.max_gain, dec!(1.20));
        assert_eq!(m.max_loss, dec!(-3.80));
        assert_eq!(m.breakeven_price, dec!(93.80));
        assert!((m.breakeven_delta - 0.272).abs() < 1e-9);
        assert!((m.pop - 72.8).abs() < 1e-9);

        // A: 0.70 * 1.2, B: 0.028 * 0.6, C: 0.152 * -1.9, D: 0.12 * -3.8
        let expected = 0.84 + 0.0168 - 0.2888 - 0.456;
        assert!((m.expected_value - expected).abs() < 1e-9);
        assert!((m.e_w - 100.0 * expected / 5.0).abs() < 1e-9);
        assert!((m.mg_w - 24.0).abs() < 1e-9);
        assert!((m.eml - 1.5).abs() < 1e-9);
        assert!((m.dme + 0.3).abs() < 1e-9);
        assert!((m.dme_w + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_call_breakeven_above_short_strike() {
        let table = vec![
            contract(Side::Call, 105.0, 0.30, 2.00, 30),
            contract(Side::Call, 107.0, 0.22, 1.40, 30),
            contract(Side::Call, 110.0, 0.10, 0.50, 30),
        ];
        let sell = SpreadLeg::from(&table[0]);
        let buy = SpreadLeg::from(&table[2]);

        let m = compute_metrics(Side::Call, &sell, &buy, &table, &params(dec!(5))).unwrap();
        assert_eq!(m.credit, dec!(1.5));
        assert_eq!(m.breakeven_price, dec!(106.5));
        // 0.30 + 1.5 * (0.22 - 0.30) / 2
        assert!((m.breakeven_delta - 0.24).abs() < 1e-9);
        assert!((m.pop - 76.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_debit() {
        let table = table();
        let sell = SpreadLeg::from(&table[0]);
        let buy = SpreadLeg::from(&table[3]);
        assert!(matches!(
            compute_metrics(Side::Put, &sell, &buy, &table, &params(dec!(1))),
            Err(Rejection::NoCredit { .. })
        ));
    }

    #[test]
    fn test_rejects_narrow() {
        let table = table();
        let sell = SpreadLeg::from(&table[3]);
        let buy = SpreadLeg::from(&table[0]);
        assert_eq!(
            compute_metrics(Side::Put, &sell, &buy, &table, &params(dec!(25))),
            Err(Rejection::TooNarrow { width: dec!(5) })
        );
    }

    #[test]
    fn test_rejects_unbracketed_breakeven() {
        // credit 5.2 puts the breakeven at 89.8, below every quoted strike
        let mut table = table();
        table[3].mark = dec!(6.0);
        let sell = SpreadLeg::from(&table[3]);
        let buy = SpreadLeg::from(&table[0]);
        assert!(matches!(
            compute_metrics(Side::Put, &sell, &buy, &table, &params(dec!(5))),
            Err(Rejection::NoBreakevenBracket { .. })
        ));
    }

    #[test]
    fn test_last_price_field() {
        let mut table = table();
        table[3].last = dec!(2.5);
        let sell = SpreadLeg::from(&table[3]);
        let buy = SpreadLeg::from(&table[0]);
        let p = MetricsParams {
            min_width: dec!(5),
            price_field: PriceField::Last,
        };
        let m = compute_metrics(Side::Put, &sell, &buy, &table, &p).unwrap();
        assert_eq!(m.credit, dec!(1.7));
    }

    #[test]
    fn test_width_equal_to_minimum_with_tenth_strikes() {
        let table = vec![
            contract(Side::Put, 5.2, -0.05, 0.80, 30),
            contract(Side::Put, 7.2, -0.10, 1.20, 30),
            contract(Side::Put, 9.2, -0.25, 1.70, 30),
            contract(Side::Put, 10.2, -0.30, 2.00, 30),
        ];
        let sell = SpreadLeg::from(&table[3]);
        let buy = SpreadLeg::from(&table[0]);

        let m = compute_metrics(Side::Put, &sell, &buy, &table, &params(dec!(5))).unwrap();
        assert_eq!(m.width, dec!(5));
        assert_eq!(m.credit, dec!(1.2));
        assert_eq!(m.breakeven_price, dec!(9.0));
        // 9.0 lies between the 7.2 and 9.2 strikes
        assert!((m.breakeven_delta - 0.235).abs() < 1e-9);
    }

    #[test]
    fn test_zone_partition_near_complete_when_between() {
        let zones = ZoneProbabilities::new(-0.30, -0.12, 0.272);
        // breakeven delta lies between the leg deltas: the partition is
        // 1 - 0.30 + 0.028 + 0.152 + 0.12
        assert!((zones.total() - 1.0).abs() < 1e-9);

        // outside that range the zones overlap
        let zones = ZoneProbabilities::new(-0.30, -0.12, 0.05);
        assert!(zones.total() > 1.0);
    }
}
