//! Multi-expiration scans.
//!
//! Each expiration of a side is screened independently, so expirations run
//! in parallel over the shared, read-only contract table.

use rayon::prelude::*;
use tracing::info;

use super::spread_screener::{ScreenError, ScreeningConfig, SpreadCandidate, SpreadScreener};
use crate::data::{ContractTable, Side};

/// Best candidates of one expiration.
#[derive(Debug, Clone)]
pub struct ExpirationScan {
    pub days_to_expiration: i32,
    pub candidates: Vec<SpreadCandidate>,
}

/// Screen every expiration of one side, keeping the `top_n` best by e_w.
///
/// When the configuration names an expiration only that one is screened.
/// Results are ordered by days to expiration.
pub fn scan_expirations(
    contracts: &ContractTable,
    side: Side,
    config: &ScreeningConfig,
    top_n: usize,
) -> Result<Vec<ExpirationScan>, ScreenError> {
    let side_table = contracts.with_side(side);
    let days = match config.days_to_expiration {
        Some(d) => vec![d],
        None => side_table.days_to_expiration(),
    };
    info!("scanning {} {} expirations: {:?}", days.len(), side, days);

    days.par_iter()
        .map(|&d| {
            let screener = SpreadScreener::new(config.pinned(side, d));
            let mut candidates = screener.screen(&side_table)?;
            candidates.truncate(top_n);
            Ok(ExpirationScan {
                days_to_expiration: d,
                candidates,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::DeltaRange;
    use crate::data::types::contract;
    use rust_decimal_macros::dec;

    fn table() -> ContractTable {
        let mut contracts = Vec::new();
        for days in [17, 45] {
            contracts.push(contract(Side::Put, 88.0, -0.09, 0.60, days));
            contracts.push(contract(Side::Put, 90.0, -0.12, 0.80, days));
            contracts.push(contract(Side::Put, 92.0, -0.20, 1.15, days));
            contracts.push(contract(Side::Put, 94.0, -0.28, 1.70, days));
            contracts.push(contract(Side::Put, 95.0, -0.30, 2.00, days));
        }
        contracts.push(contract(Side::Call, 110.0, 0.10, 0.50, 45));
        ContractTable::new(contracts)
    }

    fn config() -> ScreeningConfig {
        ScreeningConfig {
            sell_range: Some(DeltaRange::new(0.10, 0.35)),
            buy_range: Some(DeltaRange::new(0.05, 0.20)),
            min_width: dec!(2),
            ..ScreeningConfig::default()
        }
    }

    #[test]
    fn test_scans_every_expiration() {
        let scans = scan_expirations(&table(), Side::Put, &config(), 2).unwrap();
        let days: Vec<i32> = scans.iter().map(|s| s.days_to_expiration).collect();
        assert_eq!(days, vec![17, 45]);
        for scan in &scans {
            assert!(!scan.candidates.is_empty());
            assert!(scan.candidates.len() <= 2);
            assert!(scan
                .candidates
                .iter()
                .all(|c| c.days_to_expiration == scan.days_to_expiration));
        }
    }

    #[test]
    fn test_configured_expiration_only() {
        let config = ScreeningConfig {
            days_to_expiration: Some(45),
            ..config()
        };
        let scans = scan_expirations(&table(), Side::Put, &config, 30).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].days_to_expiration, 45);
    }
}
