//! Market-cap tier policy.
//!
//! Maps a market cap to a discrete evolution tier using an ascending
//! threshold table. Resolution is pure and monotone: a larger market cap
//! never resolves to a lower tier.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum market cap for one tier, in ledger fixed-point units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    /// Tier number
    pub tier: u8,
    /// Inclusive lower bound
    pub min_market_cap: U256,
}

/// Ascending tier thresholds covering `0..=max_tier`.
///
/// Invariants (checked on construction): non-empty, tiers contiguous from 0,
/// tier 0 starts at zero, thresholds strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierThresholdTable {
    thresholds: Vec<TierThreshold>,
}

impl TierThresholdTable {
    /// Build a table from `(tier, min_market_cap)` pairs in ascending order.
    pub fn new(pairs: impl IntoIterator<Item = (u8, U256)>) -> Result<Self, ConfigError> {
        let thresholds: Vec<TierThreshold> = pairs
            .into_iter()
            .map(|(tier, min_market_cap)| TierThreshold {
                tier,
                min_market_cap,
            })
            .collect();

        let first = thresholds
            .first()
            .ok_or_else(|| ConfigError::TierTable("table is empty".into()))?;
        if first.tier != 0 || !first.min_market_cap.is_zero() {
            return Err(ConfigError::TierTable(
                "first entry must be tier 0 with threshold 0".into(),
            ));
        }

        for window in thresholds.windows(2) {
            let (prev, next) = (window[0], window[1]);
            if next.tier != prev.tier.wrapping_add(1) || next.tier == 0 {
                return Err(ConfigError::TierTable(format!(
                    "tier {} follows tier {}; tiers must be contiguous",
                    next.tier, prev.tier
                )));
            }
            if next.min_market_cap <= prev.min_market_cap {
                return Err(ConfigError::TierTable(format!(
                    "threshold for tier {} ({}) is not above tier {} ({})",
                    next.tier, next.min_market_cap, prev.tier, prev.min_market_cap
                )));
            }
        }

        Ok(Self { thresholds })
    }

    /// Build from whole-USD thresholds, one per tier starting at tier 0.
    pub fn from_usd(thresholds_usd: &[u64], decimals: u8) -> Result<Self, ConfigError> {
        if thresholds_usd.len() > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::TierTable(format!(
                "{} tiers exceeds the u8 tier range",
                thresholds_usd.len()
            )));
        }
        let scale = U256::from(10u64).pow(U256::from(decimals));
        Self::new(
            thresholds_usd
                .iter()
                .enumerate()
                .map(|(tier, usd)| (tier as u8, U256::from(*usd) * scale)),
        )
    }

    /// Highest tier whose threshold is at or below `market_cap`.
    pub fn resolve_tier(&self, market_cap: U256) -> u8 {
        let above = self
            .thresholds
            .partition_point(|t| t.min_market_cap <= market_cap);
        self.thresholds
            .get(above.saturating_sub(1))
            .map(|t| t.tier)
            .unwrap_or(0)
    }

    /// Top tier in the table.
    pub fn max_tier(&self) -> u8 {
        self.thresholds.last().map(|t| t.tier).unwrap_or(0)
    }

    /// Threshold for a tier, if it exists.
    pub fn threshold_for(&self, tier: u8) -> Option<U256> {
        self.thresholds
            .get(usize::from(tier))
            .map(|t| t.min_market_cap)
    }

    /// Threshold of the tier after `tier`, or `None` at the top.
    pub fn next_threshold(&self, tier: u8) -> Option<U256> {
        self.threshold_for(tier.checked_add(1)?)
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Thresholds in ascending order.
    pub fn thresholds(&self) -> &[TierThreshold] {
        &self.thresholds
    }
}
