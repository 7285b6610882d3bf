pub mod chain;
pub mod client;
pub mod loader;
pub mod types;

pub use chain::{parse_expiration_key, ChainError, IngestOptions, RawChain, RawOption};
pub use client::{ChainClient, ClientError, FetchedChain};
pub use loader::{parse_symbol_list, read_symbol_list, ChainCache, LoaderError};
pub use types::{
    ContractTable, FairValueAnchors, InvalidSide, OptionContract, PriceField, Side, Snapshot,
};
