//! Evolution ledger contract bindings.
//!
//! The ledger is the source of truth for every tracked asset's tier and
//! highest recorded market cap. Writes are compare-and-advance: the contract
//! only moves state forward when the submitted market cap is strictly above
//! the stored one, and emits `Evolved` only when it actually advanced.

use alloy::primitives::{Address, Bytes, Log, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use tracing::debug;

use crate::ledger::Advancement;

sol! {
    /// Evolution ledger interface.
    #[sol(rpc)]
    interface IEvolutionLedger {
        /// Durable per-asset state.
        struct AssetState {
            address asset;
            address marketToken;
            uint8 tier;
            uint256 highestMarketCap;
        }

        /// All tracked assets with their current state.
        function getTrackedAssets() external view returns (AssetState[] memory);

        /// Advance one asset if `marketCap` is above its stored high.
        function advanceIfHigher(address asset, uint256 marketCap) external;

        /// Element-wise `advanceIfHigher` over parallel arrays.
        function advanceBatchIfHigher(address[] calldata assets, uint256[] calldata marketCaps) external;

        /// Emitted only when stored state actually advanced.
        event Evolved(address indexed asset, uint8 fromTier, uint8 toTier, uint256 marketCap);
    }
}

/// Encode `advanceIfHigher(asset, marketCap)`.
pub fn encode_advance(asset: Address, market_cap: U256) -> Bytes {
    IEvolutionLedger::advanceIfHigherCall {
        asset,
        marketCap: market_cap,
    }
    .abi_encode()
    .into()
}

/// Encode `advanceBatchIfHigher(assets, marketCaps)`.
pub fn encode_advance_batch(assets: &[Address], market_caps: &[U256]) -> Bytes {
    IEvolutionLedger::advanceBatchIfHigherCall {
        assets: assets.to_vec(),
        marketCaps: market_caps.to_vec(),
    }
    .abi_encode()
    .into()
}

/// Decode `Evolved` events emitted by `ledger` from receipt logs.
///
/// Logs from other contracts and logs that fail to decode are skipped.
pub fn decode_advancements<'a>(
    ledger: Address,
    logs: impl IntoIterator<Item = &'a Log>,
) -> Vec<Advancement> {
    logs.into_iter()
        .filter(|log| log.address == ledger)
        .filter(|log| log.topics().first() == Some(&IEvolutionLedger::Evolved::SIGNATURE_HASH))
        .filter_map(|log| match IEvolutionLedger::Evolved::decode_log(log, true) {
            Ok(decoded) => Some(Advancement {
                asset: decoded.data.asset,
                from_tier: decoded.data.fromTier,
                to_tier: decoded.data.toTier,
                market_cap: decoded.data.marketCap,
            }),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable Evolved log");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evolved_log(ledger: Address, asset: Address, from: u8, to: u8, cap: u64) -> Log {
        let event = IEvolutionLedger::Evolved {
            asset,
            fromTier: from,
            toTier: to,
            marketCap: U256::from(cap),
        };
        Log {
            address: ledger,
            data: event.encode_log_data(),
        }
    }

    #[test]
    fn test_decode_filters_by_emitter() {
        let ledger = Address::repeat_byte(0xAA);
        let other = Address::repeat_byte(0xBB);
        let asset = Address::repeat_byte(1);
        let logs = vec![
            evolved_log(ledger, asset, 0, 1, 6000),
            evolved_log(other, asset, 0, 3, 90000),
        ];

        let advancements = decode_advancements(ledger, &logs);
        assert_eq!(advancements.len(), 1);
        assert_eq!(advancements[0].asset, asset);
        assert_eq!(advancements[0].from_tier, 0);
        assert_eq!(advancements[0].to_tier, 1);
        assert_eq!(advancements[0].market_cap, U256::from(6000u64));
    }

    #[test]
    fn test_no_logs_is_no_advancement() {
        let logs: Vec<Log> = Vec::new();
        assert!(decode_advancements(Address::ZERO, &logs).is_empty());
    }

    #[test]
    fn test_calldata_selectors() {
        let single = encode_advance(Address::repeat_byte(1), U256::from(5u64));
        assert_eq!(&single[..4], &IEvolutionLedger::advanceIfHigherCall::SELECTOR);

        let batch = encode_advance_batch(
            &[Address::repeat_byte(1), Address::repeat_byte(2)],
            &[U256::from(1u64), U256::from(2u64)],
        );
        assert_eq!(&batch[..4], &IEvolutionLedger::advanceBatchIfHigherCall::SELECTOR);
        assert!(batch.len() > single.len());
    }
}
