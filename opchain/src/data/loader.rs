//! On-disk chain cache and symbol list files.
//!
//! Cached chains are stored exactly as the broker returned them:
//! `{data_dir}/{SYMBOL}/{SYMBOL}-{YYYY-MM-DD}.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use super::chain::{ChainError, RawChain};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chain cache rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ChainCache {
    data_dir: PathBuf,
}

impl ChainCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of a symbol's chain for a run date.
    pub fn chain_path(&self, symbol: &str, run_date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(symbol)
            .join(format!("{}-{}.json", symbol, run_date.format("%Y-%m-%d")))
    }

    /// Cached chain document, or `None` when nothing is cached.
    pub fn load_raw(&self, symbol: &str, run_date: NaiveDate) -> Result<Option<String>, LoaderError> {
        let path = self.chain_path(symbol, run_date);
        if !path.is_file() {
            return Ok(None);
        }
        info!("returning data from: {}", path.display());
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Cached chain, parsed.
    pub fn load(&self, symbol: &str, run_date: NaiveDate) -> Result<Option<RawChain>, LoaderError> {
        match self.load_raw(symbol, run_date)? {
            Some(json) => Ok(Some(RawChain::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Store a chain document, creating the symbol directory as needed.
    pub fn save(&self, symbol: &str, run_date: NaiveDate, json: &str) -> Result<PathBuf, LoaderError> {
        let path = self.chain_path(symbol, run_date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Whether a symbol list entry names a tradable symbol.
///
/// Comment entries start with `#`; entries with lowercase letters are
/// headers or notes.
pub fn is_symbol(entry: &str) -> bool {
    !entry.is_empty()
        && !entry.starts_with('#')
        && entry.chars().any(|c| c.is_alphabetic())
        && !entry.chars().any(|c| c.is_lowercase())
}

/// Symbols from the first comma-separated field of each line.
pub fn parse_symbol_list(content: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    for line in content.lines() {
        let entry = line.split(',').next().unwrap_or("").trim();
        if entry.is_empty() {
            continue;
        }
        if !is_symbol(entry) {
            warn!("ignoring symbol: {}", entry);
            continue;
        }
        symbols.push(entry.to_string());
    }
    symbols
}

/// Read a symbol list file.
pub fn read_symbol_list(path: &Path) -> Result<Vec<String>, LoaderError> {
    if !path.is_file() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    Ok(parse_symbol_list(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::chain::SAMPLE_CHAIN;

    #[test]
    fn test_chain_path() {
        let cache = ChainCache::new("data");
        let date = NaiveDate::from_ymd_opt(2021, 4, 8).unwrap();
        assert_eq!(
            cache.chain_path("SPY", date),
            PathBuf::from("data/SPY/SPY-2021-04-08.json")
        );
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChainCache::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2021, 12, 22).unwrap();

        assert!(cache.load("XYZ", date).unwrap().is_none());

        let path = cache.save("XYZ", date, SAMPLE_CHAIN).unwrap();
        assert!(path.is_file());

        let chain = cache.load("XYZ", date).unwrap().unwrap();
        assert_eq!(chain.symbol, "XYZ");
        assert_eq!(chain.underlying_price, Some(100.0));
    }

    #[test]
    fn test_parse_symbol_list() {
        let content = "symbol,name\nSPY,S&P 500\n\n#QQQ,skipped\n$SPX.X\nbrk.b\nIWM\n";
        assert_eq!(parse_symbol_list(content), vec!["SPY", "$SPX.X", "IWM"]);
    }

    #[test]
    fn test_missing_symbol_file() {
        let err = read_symbol_list(Path::new("/nonexistent/symbols.csv")).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }
}
