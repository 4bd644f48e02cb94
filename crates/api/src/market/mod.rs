//! Market-data provider abstraction with ordered fallback.
//!
//! Every provider normalizes its response into a [`PriceSample`]. The
//! [`PriceOracle`] queries providers in priority order and returns the first
//! sample that carries a usable market cap.
//!
//! # Supported Providers
//!
//! - `dexscreener`: DexScreener token pairs endpoint (primary)
//! - `geckoterminal`: GeckoTerminal token endpoint (fallback)
//!
//! # Example
//!
//! ```rust,ignore
//! use evolution_api::market::{DexScreenerClient, GeckoTerminalClient, PriceOracle};
//!
//! let oracle = PriceOracle::new(Duration::from_secs(10))
//!     .with_provider(Arc::new(DexScreenerClient::new("base", timeout)?))
//!     .with_provider(Arc::new(GeckoTerminalClient::new("base", timeout)?));
//!
//! match oracle.fetch_market_cap(token).await {
//!     Some(sample) => info!(source = %sample.source, "sampled"),
//!     None => debug!("no provider has data, skipping this cycle"),
//! }
//! ```

mod dexscreener;
mod geckoterminal;

pub use dexscreener::DexScreenerClient;
pub use geckoterminal::GeckoTerminalClient;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::ProviderError;

/// Normalized market data for one token from one provider.
///
/// Ephemeral: produced once per cycle per asset and discarded after the
/// tier has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Token the sample was requested for
    pub token: Address,
    /// Spot price in USD
    pub price_usd: f64,
    /// Market cap in USD (FDV when the provider had no market cap)
    pub market_cap: f64,
    /// 24h volume in USD
    pub volume_24h: f64,
    /// 24h price change in percent
    pub price_change_24h: f64,
    /// Provider id that produced the sample
    pub source: String,
    /// True when `market_cap` was taken from the fully diluted valuation
    #[serde(default)]
    pub fdv_fallback: bool,
}

impl PriceSample {
    /// Whether the market cap is a usable positive number.
    pub fn has_market_cap(&self) -> bool {
        self.market_cap.is_finite() && self.market_cap > 0.0
    }

    /// Convert the USD market cap into ledger fixed-point units.
    ///
    /// Returns `None` for non-finite, negative or sub-unit values.
    pub fn market_cap_fixed(&self, decimals: u8) -> Option<U256> {
        usd_to_fixed(self.market_cap, decimals)
    }
}

/// Scale a USD amount into an integer with `decimals` fractional digits.
pub fn usd_to_fixed(usd: f64, decimals: u8) -> Option<U256> {
    if !usd.is_finite() || usd <= 0.0 {
        return None;
    }
    let scaled = (usd * 10f64.powi(decimals as i32)).floor();
    if !scaled.is_finite() || scaled < 1.0 {
        return None;
    }
    // f64 -> u128 saturates; market caps never come close to 2^128 micro-USD.
    Some(U256::from(scaled as u128))
}

/// Trait for market-data providers.
///
/// `Ok(None)` means the provider answered but has no pair for the token;
/// that is a valid answer, not an error. Both `Ok(None)` and `Err` make the
/// oracle fall through to the next provider.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + Debug {
    /// Provider identifier used as [`PriceSample::source`].
    fn provider_id(&self) -> &str;

    /// Query market data for a token.
    async fn fetch(&self, token: Address) -> Result<Option<PriceSample>, ProviderError>;
}

/// Ordered provider chain.
///
/// No retries happen inside a call: if every provider fails the token is
/// simply skipped and retried on the next monitor cycle.
#[derive(Debug, Clone)]
pub struct PriceOracle {
    /// Providers in priority order (primary first)
    providers: Vec<Arc<dyn MarketDataProvider>>,
    /// Hard time budget per provider call
    provider_timeout: Duration,
}

impl PriceOracle {
    /// Create an empty oracle with the given per-provider timeout.
    pub fn new(provider_timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            provider_timeout,
        }
    }

    /// Append a provider; earlier providers take priority.
    pub fn with_provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Provider ids in query order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_id()).collect()
    }

    /// Number of configured providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Fetch a market-cap sample, trying each provider in order.
    ///
    /// Returns `None` when no provider produced a usable market cap.
    pub async fn fetch_market_cap(&self, token: Address) -> Option<PriceSample> {
        for provider in &self.providers {
            let id = provider.provider_id();
            let guarded = AssertUnwindSafe(provider.fetch(token)).catch_unwind();
            let result = match tokio::time::timeout(self.provider_timeout, guarded).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => {
                    let err = ProviderError::Panicked(panic_message(panic.as_ref()));
                    error!(token = %token, source = id, error = %err, "Provider panicked, trying next");
                    continue;
                }
                Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
            };

            match result {
                Ok(Some(sample)) if sample.has_market_cap() => {
                    debug!(
                        token = %token,
                        source = id,
                        market_cap = sample.market_cap,
                        fdv_fallback = sample.fdv_fallback,
                        "Market cap sampled"
                    );
                    return Some(sample);
                }
                Ok(Some(sample)) => {
                    debug!(
                        token = %token,
                        source = id,
                        market_cap = sample.market_cap,
                        "Provider returned no usable market cap, trying next"
                    );
                }
                Ok(None) => {
                    debug!(token = %token, source = id, "Token not listed, trying next");
                }
                Err(e) => {
                    warn!(token = %token, source = id, error = %e, "Provider failed, trying next");
                }
            }
        }

        debug!(token = %token, providers = self.providers.len(), "No market data from any provider");
        None
    }

    /// Fetch samples for many tokens concurrently.
    ///
    /// Every token is queried at once; results keep the input order. A
    /// panic while fetching one token yields `None` for that token only.
    pub async fn fetch_many(&self, tokens: &[Address]) -> Vec<(Address, Option<PriceSample>)> {
        let futures = tokens.iter().map(|token| async move {
            let sample = match AssertUnwindSafe(self.fetch_market_cap(*token))
                .catch_unwind()
                .await
            {
                Ok(sample) => sample,
                Err(panic) => {
                    error!(
                        token = %token,
                        panic = %panic_message(panic.as_ref()),
                        "Market cap fetch panicked"
                    );
                    None
                }
            };
            (*token, sample)
        });
        futures::future::join_all(futures).await
    }
}

/// How a provider treats an HTTP response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    /// 2xx: parse the body.
    Success,
    /// 404: the token is not listed.
    NotFound,
    /// Anything else: report [`ProviderError::Status`].
    Failure,
}

pub(crate) fn classify_status(status: reqwest::StatusCode) -> StatusClass {
    if status == reqwest::StatusCode::NOT_FOUND {
        StatusClass::NotFound
    } else if status.is_success() {
        StatusClass::Success
    } else {
        StatusClass::Failure
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
