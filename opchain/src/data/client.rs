//! Broker option chain client.
//!
//! Fetches one underlying's chain per request. The bearer token is supplied
//! by the caller; failed requests are reported, never retried.

use chrono::{Duration, NaiveDate};
use reqwest::Client;
use thiserror::Error;
use tracing::{error, info};

use super::chain::{ChainError, RawChain};

/// Chains endpoint.
pub const CHAINS_URL: &str = "https://api.tdameritrade.com/v1/marketdata/chains";

/// Strikes requested per expiration.
pub const STRIKE_COUNT: u32 = 200;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

/// A fetched chain: the document as received and its parsed form.
#[derive(Debug, Clone)]
pub struct FetchedChain {
    pub body: String,
    pub chain: RawChain,
}

/// Option chain API client.
pub struct ChainClient {
    client: Client,
    token: String,
    base_url: String,
}

impl ChainClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, CHAINS_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            token,
            base_url,
        }
    }

    /// Query parameters for a chain request.
    pub fn query_params(symbol: &str, from: NaiveDate, to: NaiveDate) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", symbol.to_string()),
            ("strikeCount", STRIKE_COUNT.to_string()),
            ("includeQuotes", "TRUE".to_string()),
            ("strategy", "ANALYTICAL".to_string()),
            ("interval", "1".to_string()),
            ("fromDate", from.format("%Y-%m-%d").to_string()),
            ("toDate", to.format("%Y-%m-%d").to_string()),
        ]
    }

    /// Fetch the chain of `symbol` with expirations in `from..=to`.
    pub async fn get_chain(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<FetchedChain, ClientError> {
        info!("get_chain {}, fromDate: {}, toDate: {}", symbol, from, to);

        let response = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .query(&Self::query_params(symbol, from, to))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!("got bad status code: {}", status);
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api(format!("{}: {}", status, text)));
        }

        let body = response.text().await?;
        let chain = RawChain::from_json(&body)?;
        Ok(FetchedChain { body, chain })
    }

    /// Fetch with the default window of one year from `run_date`.
    pub async fn get_chain_for(&self, symbol: &str, run_date: NaiveDate) -> Result<FetchedChain, ClientError> {
        self.get_chain(symbol, run_date, run_date + Duration::days(365))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let from = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2022, 4, 1).unwrap();
        let params = ChainClient::query_params("SPY", from, to);
        assert!(params.contains(&("symbol", "SPY".to_string())));
        assert!(params.contains(&("strikeCount", "200".to_string())));
        assert!(params.contains(&("fromDate", "2021-04-01".to_string())));
        assert!(params.contains(&("toDate", "2022-04-01".to_string())));
    }
}
