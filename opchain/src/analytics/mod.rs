//! Options analytics module.
//!
//! Provides:
//! - Fair-value anchor estimation per expiration
//! - Delta interpolation as an in-the-money probability proxy
//! - Credit spread screening, metrics and multi-expiration scans

pub mod anchor;
pub mod metrics;
pub mod probability;
pub mod scan;
pub mod spread_screener;

pub use anchor::{estimate_anchors, Bracket, QuoteBundle, StrikeQuote};
pub use metrics::{compute_metrics, Rejection, SpreadLeg, SpreadMetrics, ZoneProbabilities};
pub use probability::interpolate_delta;
pub use scan::{scan_expirations, ExpirationScan};
pub use spread_screener::{
    rank_by_e_w, DeltaBands, DeltaRange, ScreenError, ScreeningConfig, SpreadCandidate, SpreadScreener,
};
