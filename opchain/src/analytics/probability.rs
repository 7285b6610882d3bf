//! Delta interpolation at arbitrary prices.
//!
//! Delta is used as a proxy for the probability that an option finishes in
//! the money. Between two quoted strikes it is treated as linear.

use rust_decimal::Decimal;
use tracing::debug;

use crate::data::types::to_f64;
use crate::data::OptionContract;

/// Delta magnitude at `target`, interpolated from the bracketing strikes.
///
/// `contracts` must be restricted to one side and one expiration. Returns
/// `None` with fewer than two contracts or when `target` is not bracketed by
/// quoted strikes; it never extrapolates.
pub fn interpolate_delta(target: Decimal, contracts: &[OptionContract]) -> Option<f64> {
    if contracts.len() < 2 {
        debug!("interpolate_delta: expecting at least two contracts");
        return None;
    }

    let mut below: Option<&OptionContract> = None;
    let mut above: Option<&OptionContract> = None;

    for contract in contracts {
        let strike = contract.strike_price;
        if strike == target {
            return Some(contract.abs_delta());
        } else if strike < target {
            if below.map_or(true, |b| strike > b.strike_price) {
                below = Some(contract);
            }
        } else if above.map_or(true, |a| strike < a.strike_price) {
            above = Some(contract);
        }
    }

    let (Some(p1), Some(p2)) = (below, above) else {
        debug!("interpolate_delta: no strikes bracketing {}", target);
        return None;
    };

    Some(
        linear(
            to_f64(target),
            to_f64(p1.strike_price),
            to_f64(p2.strike_price),
            p1.delta,
            p2.delta,
        )
        .abs(),
    )
}

fn linear(x: f64, x1: f64, x2: f64, y1: f64, y2: f64) -> f64 {
    y1 + (x - x1) * (y2 - y1) / (x2 - x1)
}
