//! Market-data API clients for the evolution monitor.
//!
//! This crate provides:
//! - DexScreener and GeckoTerminal HTTP clients
//! - A normalized [`PriceSample`] record shared by every provider
//! - [`PriceOracle`]: ordered provider fallback with per-provider timeouts

mod error;
pub mod market;

pub use error::ProviderError;
pub use market::{
    DexScreenerClient, GeckoTerminalClient, MarketDataProvider, PriceOracle, PriceSample,
};
