//! DexScreener token pairs API client.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{classify_status, MarketDataProvider, PriceSample, StatusClass};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";

/// DexScreener client.
///
/// Queries every pair listing the token and keeps the most liquid pair on
/// the configured chain.
#[derive(Debug, Clone)]
pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    /// DexScreener chain slug (e.g. "base")
    chain_id: String,
}

impl DexScreenerClient {
    /// Create a client for the given chain with a request timeout.
    pub fn new(chain_id: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, DEFAULT_BASE_URL, chain_id))
    }

    /// Create a client with a custom HTTP client and base URL.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            chain_id: chain_id.into(),
        }
    }

    /// Pick the best pair for `token` and normalize it.
    fn select_sample(
        &self,
        token: Address,
        response: TokensResponse,
    ) -> Result<Option<PriceSample>, ProviderError> {
        let pairs = response.pairs.unwrap_or_default();
        let best = pairs
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(&self.chain_id))
            .filter(|p| {
                p.base_token
                    .address
                    .parse::<Address>()
                    .map(|a| a == token)
                    .unwrap_or(false)
            })
            .max_by(|a, b| a.liquidity_usd().total_cmp(&b.liquidity_usd()));

        let Some(pair) = best else {
            return Ok(None);
        };

        let (market_cap, fdv_fallback) = match (pair.market_cap, pair.fdv) {
            (Some(mc), _) if mc > 0.0 => (mc, false),
            (_, Some(fdv)) if fdv > 0.0 => (fdv, true),
            _ => return Ok(None),
        };

        let price_usd = match pair.price_usd.as_deref().map(str::parse::<f64>) {
            Some(Ok(price)) => price,
            Some(Err(e)) => {
                debug!(raw = ?pair.price_usd, error = %e, "Unparseable priceUsd, using 0");
                0.0
            }
            None => 0.0,
        };

        Ok(Some(PriceSample {
            token,
            price_usd,
            market_cap,
            volume_24h: pair.volume.and_then(|v| v.h24).unwrap_or(0.0),
            price_change_24h: pair.price_change.and_then(|v| v.h24).unwrap_or(0.0),
            source: self.provider_id().to_string(),
            fdv_fallback,
        }))
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerClient {
    fn provider_id(&self) -> &str {
        "dexscreener"
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn fetch(&self, token: Address) -> Result<Option<PriceSample>, ProviderError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::NotFound => return Ok(None),
            StatusClass::Failure => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::status(status, body));
            }
        }

        let body = response.text().await?;
        let parsed: TokensResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let sample = self.select_sample(token, parsed)?;
        debug!(found = sample.is_some(), "DexScreener response processed");
        Ok(sample)
    }
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: String,
    base_token: TokenRef,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    fdv: Option<f64>,
    #[serde(default)]
    volume: Option<Window>,
    #[serde(default)]
    price_change: Option<Window>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
}

impl Pair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct TokenRef {
    address: String,
}

#[derive(Debug, Deserialize)]
struct Window {
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    #[serde(default)]
    usd: Option<f64>,
}
