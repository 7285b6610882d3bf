pub mod analytics;
pub mod data;
pub mod report;

// Re-export commonly used types
pub use analytics::{scan_expirations, ScreenError, ScreeningConfig, SpreadCandidate, SpreadScreener};
pub use data::{ChainCache, ChainClient, ContractTable, OptionContract, RawChain, Side, Snapshot};
pub use report::{BestReport, BestSpread, ReportFilter};
