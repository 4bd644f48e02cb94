//! Evolution candidates.

use alloy::primitives::{Address, U256};
use evolution_api::PriceSample;
use evolution_chain::TrackedAsset;

use crate::tier::TierThresholdTable;

/// An asset whose sampled market cap exceeds its recorded high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvolutionCandidate {
    /// Ledger asset id
    pub asset_id: Address,
    /// Sampled market cap in ledger units
    pub new_market_cap: U256,
    /// Tier the sampled market cap resolves to
    pub resolved_tier: u8,
    /// Tier recorded on the ledger at read time
    pub current_tier: u8,
    /// High recorded on the ledger at read time
    pub previous_high: U256,
    /// Provider that produced the sample
    pub source: String,
}

impl EvolutionCandidate {
    /// Whether this write would also move the tier.
    pub fn crosses_tier(&self) -> bool {
        self.resolved_tier > self.current_tier
    }
}

/// Decide whether a sample makes `asset` a candidate.
///
/// Qualifies only when the sampled cap is strictly above the recorded high
/// and resolves to a tier no lower than the current one. Equal caps never
/// qualify.
pub fn evaluate(
    asset: &TrackedAsset,
    sample: &PriceSample,
    tiers: &TierThresholdTable,
    decimals: u8,
) -> Option<EvolutionCandidate> {
    let new_market_cap = sample.market_cap_fixed(decimals)?;
    if new_market_cap <= asset.highest_market_cap {
        return None;
    }
    let resolved_tier = tiers.resolve_tier(new_market_cap);
    if resolved_tier < asset.current_tier {
        return None;
    }
    Some(EvolutionCandidate {
        asset_id: asset.asset_id,
        new_market_cap,
        resolved_tier,
        current_tier: asset.current_tier,
        previous_high: asset.highest_market_cap,
        source: sample.source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolution_api::market::usd_to_fixed;

    fn tiers() -> TierThresholdTable {
        TierThresholdTable::from_usd(&[0, 5_000, 25_000, 75_000], 6).unwrap()
    }

    fn sample(usd: f64) -> PriceSample {
        PriceSample {
            token: Address::repeat_byte(9),
            price_usd: 0.01,
            market_cap: usd,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            source: "dexscreener".into(),
            fdv_fallback: false,
        }
    }

    fn asset(tier: u8, high_usd: f64) -> TrackedAsset {
        TrackedAsset {
            asset_id: Address::repeat_byte(1),
            external_token: Address::ZERO,
            current_tier: tier,
            highest_market_cap: usd_to_fixed(high_usd, 6).unwrap_or(U256::ZERO),
        }
    }

    #[test]
    fn test_new_high_qualifies() {
        let c = evaluate(&asset(0, 0.0), &sample(6_000.0), &tiers(), 6).unwrap();
        assert_eq!(c.resolved_tier, 1);
        assert!(c.crosses_tier());
        assert_eq!(c.new_market_cap, U256::from(6_000_000_000u64));
    }

    #[test]
    fn test_high_without_tier_change_still_qualifies() {
        let c = evaluate(&asset(1, 6_000.0), &sample(7_000.0), &tiers(), 6).unwrap();
        assert_eq!(c.resolved_tier, 1);
        assert!(!c.crosses_tier());
    }

    #[test]
    fn test_equal_or_lower_never_qualifies() {
        assert!(evaluate(&asset(1, 6_000.0), &sample(6_000.0), &tiers(), 6).is_none());
        assert!(evaluate(&asset(1, 6_000.0), &sample(4_000.0), &tiers(), 6).is_none());
    }

    #[test]
    fn test_tier_below_current_skipped() {
        // Ledger tier above what the configured table yields for this cap.
        assert!(evaluate(&asset(3, 6_000.0), &sample(7_000.0), &tiers(), 6).is_none());
    }

    #[test]
    fn test_unusable_cap_skipped() {
        assert!(evaluate(&asset(0, 0.0), &sample(0.0), &tiers(), 6).is_none());
        assert!(evaluate(&asset(0, 0.0), &sample(f64::NAN), &tiers(), 6).is_none());
    }
}
