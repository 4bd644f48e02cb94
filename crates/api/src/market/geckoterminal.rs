//! GeckoTerminal token API client.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{classify_status, MarketDataProvider, PriceSample, StatusClass};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.geckoterminal.com/api/v2";

/// GeckoTerminal client.
///
/// All numeric fields arrive string-encoded. The token endpoint carries no
/// 24h price change, so samples from here report `0.0` for it.
#[derive(Debug, Clone)]
pub struct GeckoTerminalClient {
    client: reqwest::Client,
    base_url: String,
    /// GeckoTerminal network slug (e.g. "base")
    network: String,
}

impl GeckoTerminalClient {
    /// Create a client for the given network with a request timeout.
    pub fn new(network: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()?;
        Ok(Self::with_client(client, DEFAULT_BASE_URL, network))
    }

    /// Create a client with a custom HTTP client and base URL.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            network: network.into(),
        }
    }

    fn convert(&self, token: Address, response: TokenResponse) -> Result<Option<PriceSample>, ProviderError> {
        let attrs = response.data.attributes;

        let market_cap = parse_decimal("market_cap_usd", attrs.market_cap_usd.as_deref())?;
        let fdv = parse_decimal("fdv_usd", attrs.fdv_usd.as_deref())?;

        let (market_cap, fdv_fallback) = match (market_cap, fdv) {
            (Some(mc), _) if mc > 0.0 => (mc, false),
            (_, Some(fdv)) if fdv > 0.0 => (fdv, true),
            _ => return Ok(None),
        };

        let price_usd = parse_decimal("price_usd", attrs.price_usd.as_deref())?.unwrap_or(0.0);
        let volume_24h = parse_decimal(
            "volume_usd.h24",
            attrs.volume_usd.as_ref().and_then(|v| v.h24.as_deref()),
        )?
        .unwrap_or(0.0);

        Ok(Some(PriceSample {
            token,
            price_usd,
            market_cap,
            volume_24h,
            price_change_24h: 0.0,
            source: self.provider_id().to_string(),
            fdv_fallback,
        }))
    }
}

fn parse_decimal(field: &str, raw: Option<&str>) -> Result<Option<f64>, ProviderError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ProviderError::Malformed(format!("{field} {s:?}: {e}"))),
    }
}

#[async_trait]
impl MarketDataProvider for GeckoTerminalClient {
    fn provider_id(&self) -> &str {
        "geckoterminal"
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn fetch(&self, token: Address) -> Result<Option<PriceSample>, ProviderError> {
        let url = format!(
            "{}/networks/{}/tokens/{}",
            self.base_url,
            self.network,
            format!("{token}").to_lowercase()
        );

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
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let sample = self.convert(token, parsed)?;
        debug!(found = sample.is_some(), "GeckoTerminal response processed");
        Ok(sample)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    attributes: TokenAttributes,
}

#[derive(Debug, Deserialize)]
struct TokenAttributes {
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    market_cap_usd: Option<String>,
    #[serde(default)]
    fdv_usd: Option<String>,
    #[serde(default)]
    volume_usd: Option<VolumeUsd>,
}

#[derive(Debug, Deserialize)]
struct VolumeUsd {
    #[serde(default)]
    h24: Option<String>,
}
