//! Fair-value anchor ("MMM") estimation.
//!
//! For each expiration the anchor is the mean of the quoted marks at the
//! strikes bracketing the underlying price, on both the put and the call
//! side.

use std::collections::BTreeMap;

use tracing::warn;

use crate::data::FairValueAnchors;

/// Strike and mark of one quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeQuote {
    pub strike: f64,
    pub mark: f64,
}

/// Quotes of one side, keyed by days to expiration.
pub type QuoteBundle = BTreeMap<i32, Vec<StrikeQuote>>;

/// Marks at the strikes immediately below and at/above the underlying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub low: f64,
    pub high: f64,
}

/// Bracket the underlying price within one side's quotes.
///
/// A side of the bracket with no strike falls back to the underlying price.
/// Returns `None` when there are no quotes at all.
pub fn bracket(quotes: &[StrikeQuote], underlying: f64) -> Option<Bracket> {
    if quotes.is_empty() {
        return None;
    }

    let mut low: Option<StrikeQuote> = None;
    let mut high: Option<StrikeQuote> = None;
    for quote in quotes {
        if quote.strike < underlying {
            if low.map_or(true, |l| quote.strike > l.strike) {
                low = Some(*quote);
            }
        } else if high.map_or(true, |h| quote.strike < h.strike) {
            high = Some(*quote);
        }
    }

    Some(Bracket {
        low: low.map_or(underlying, |q| q.mark),
        high: high.map_or(underlying, |q| q.mark),
    })
}

/// Anchor for one expiration from its put and call quotes.
pub fn estimate_anchor(puts: &[StrikeQuote], calls: &[StrikeQuote], underlying: f64) -> Option<f64> {
    let put = bracket(puts, underlying)?;
    let call = bracket(calls, underlying)?;
    Some((call.low + call.high + put.low + put.high) / 4.0)
}

/// Anchors for every expiration on the put side.
///
/// An expiration whose put or call bracket cannot be built is skipped.
pub fn estimate_anchors(puts: &QuoteBundle, calls: &QuoteBundle, underlying: f64) -> FairValueAnchors {
    let mut anchors = FairValueAnchors::new();

    for (&days, put_quotes) in puts {
        let call_quotes = calls.get(&days).map(Vec::as_slice).unwrap_or_default();
        match estimate_anchor(put_quotes, call_quotes, underlying) {
            Some(anchor) => {
                anchors.insert(days, anchor);
            }
            None => warn!("couldn't determine anchor for {} days", days),
        }
    }

    anchors
}
