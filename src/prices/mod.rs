use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

// Map common symbols to CoinGecko ids.
const COIN_IDS: [(&str, &str); 2] = [("BTC", "bitcoin"), ("HYPE", "hyperliquid")];

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("price provider responded {0}")]
    Status(StatusCode),
}

pub fn symbol_to_coin_id(symbol: &str) -> Option<&'static str> {
    let upper = symbol.trim().to_uppercase();
    COIN_IDS
        .iter()
        .find(|(sym, _)| *sym == upper)
        .map(|(_, id)| *id)
}

/// Upstream quote source, keyed by provider coin id.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_usd_prices(
        &self,
        ids: &str,
    ) -> std::result::Result<HashMap<String, f64>, PriceError>;
}

/// CoinGecko `simple/price` client. A `COINGECKO_API_KEY` in the
/// environment is sent as the demo-tier header; the pro tier uses
/// `x-cg-pro-api-key`.
pub struct CoinGeckoFeed {
    client: Client,
    api_key: Option<String>,
}

impl CoinGeckoFeed {
    pub fn new() -> Self {
        Self::with_api_key(std::env::var("COINGECKO_API_KEY").ok())
    }

    pub fn with_api_key(api_key: Option<String>) -> Self {
        CoinGeckoFeed {
            client: Client::new(),
            api_key,
        }
    }
}

impl Default for CoinGeckoFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: f64,
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn fetch_usd_prices(
        &self,
        ids: &str,
    ) -> std::result::Result<HashMap<String, f64>, PriceError> {
        let mut request = self
            .client
            .get(COINGECKO_URL)
            .query(&[("ids", ids), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Status(response.status()));
        }

        let quotes: HashMap<String, UsdQuote> = response.json().await?;
        Ok(quotes.into_iter().map(|(id, q)| (id, q.usd)).collect())
    }
}

/// Resolves symbols to known coin ids and fetches their USD quotes, keyed
/// back by symbol. Unknown symbols are dropped, and nothing is fetched when
/// none remain. Transient failures get a short linear backoff; a
/// persistently failing provider yields an empty map, never an error.
pub async fn usd_prices_for_symbols(
    feed: &dyn PriceFeed,
    symbols: &[String],
) -> HashMap<String, f64> {
    let known: Vec<(String, &'static str)> = symbols
        .iter()
        .filter_map(|s| symbol_to_coin_id(s).map(|id| (s.trim().to_uppercase(), id)))
        .collect();
    if known.is_empty() {
        return HashMap::new();
    }

    let ids = known
        .iter()
        .map(|(_, id)| *id)
        .collect::<Vec<_>>()
        .join(",");

    let mut last_err = None;
    for attempt in 0..RETRY_ATTEMPTS {
        match feed.fetch_usd_prices(&ids).await {
            Ok(by_id) => {
                return known
                    .iter()
                    .filter_map(|(symbol, id)| by_id.get(*id).map(|p| (symbol.clone(), *p)))
                    .collect();
            }
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(RETRY_BASE_DELAY * (attempt + 1)).await;
    }

    if let Some(e) = last_err {
        warn!("giving up on price fetch after {RETRY_ATTEMPTS} attempts: {e}");
    }
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedFeed {
        failures_left: Mutex<u32>,
        calls: Mutex<u32>,
        quotes: HashMap<String, f64>,
    }

    impl ScriptedFeed {
        fn new(failures: u32, quotes: &[(&str, f64)]) -> Self {
            ScriptedFeed {
                failures_left: Mutex::new(failures),
                calls: Mutex::new(0),
                quotes: quotes
                    .iter()
                    .map(|(id, p)| (id.to_string(), *p))
                    .collect(),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("lock")
        }
    }

    #[async_trait]
    impl PriceFeed for ScriptedFeed {
        async fn fetch_usd_prices(
            &self,
            _ids: &str,
        ) -> std::result::Result<HashMap<String, f64>, PriceError> {
            *self.calls.lock().expect("lock") += 1;
            let mut failures = self.failures_left.lock().expect("lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(PriceError::Status(StatusCode::TOO_MANY_REQUESTS));
            }
            Ok(self.quotes.clone())
        }
    }

    fn symbols(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn symbol_map_is_case_insensitive_and_trims() {
        assert_eq!(symbol_to_coin_id("btc"), Some("bitcoin"));
        assert_eq!(symbol_to_coin_id(" HYPE "), Some("hyperliquid"));
        assert_eq!(symbol_to_coin_id("DOGE"), None);
    }

    #[tokio::test]
    async fn prices_are_keyed_back_by_symbol() {
        let feed = ScriptedFeed::new(0, &[("bitcoin", 70_000.0), ("hyperliquid", 40.0)]);
        let prices = usd_prices_for_symbols(&feed, &symbols(&["btc", "HYPE"])).await;

        assert_eq!(prices.get("BTC"), Some(&70_000.0));
        assert_eq!(prices.get("HYPE"), Some(&40.0));
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_symbols_skip_the_provider_entirely() {
        let feed = ScriptedFeed::new(0, &[("bitcoin", 70_000.0)]);
        let prices = usd_prices_for_symbols(&feed, &symbols(&["DOGE", "SHIB"])).await;

        assert!(prices.is_empty());
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let feed = ScriptedFeed::new(2, &[("bitcoin", 70_000.0)]);
        let prices = usd_prices_for_symbols(&feed, &symbols(&["BTC"])).await;

        assert_eq!(prices.get("BTC"), Some(&70_000.0));
        assert_eq!(feed.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_failure_yields_an_empty_map() {
        let feed = ScriptedFeed::new(u32::MAX, &[("bitcoin", 70_000.0)]);
        let prices = usd_prices_for_symbols(&feed, &symbols(&["BTC"])).await;

        assert!(prices.is_empty());
        assert_eq!(feed.calls(), 3);
    }

    #[tokio::test]
    async fn partial_provider_responses_drop_missing_symbols() {
        let feed = ScriptedFeed::new(0, &[("bitcoin", 70_000.0)]);
        let prices = usd_prices_for_symbols(&feed, &symbols(&["BTC", "HYPE"])).await;

        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("BTC"), Some(&70_000.0));
    }
}
