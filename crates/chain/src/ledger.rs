//! Ledger abstraction and the on-chain implementation.
//!
//! [`EvolutionLedger`] is the seam between the monitor and the contract.
//! Every write is idempotent: submitting a market cap that is not above the
//! stored high is accepted and simply produces no advancement.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::contracts::{self, IEvolutionLedger};
use crate::signer::TransactionSender;

/// One asset under evolution tracking, as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedAsset {
    /// On-chain identity of the asset
    pub asset_id: Address,
    /// Token used for market-data lookups (zero = same as `asset_id`)
    pub external_token: Address,
    /// Current evolution tier
    pub current_tier: u8,
    /// Highest market cap ever recorded, in ledger fixed-point units
    pub highest_market_cap: U256,
}

impl TrackedAsset {
    /// A freshly registered asset: tier 0, no recorded market cap.
    pub fn new(asset_id: Address, external_token: Address) -> Self {
        Self {
            asset_id,
            external_token,
            current_tier: 0,
            highest_market_cap: U256::ZERO,
        }
    }

    /// Token to query market data for.
    pub fn market_token(&self) -> Address {
        if self.external_token.is_zero() {
            self.asset_id
        } else {
            self.external_token
        }
    }
}

impl From<IEvolutionLedger::AssetState> for TrackedAsset {
    fn from(state: IEvolutionLedger::AssetState) -> Self {
        Self {
            asset_id: state.asset,
            external_token: state.marketToken,
            current_tier: state.tier,
            highest_market_cap: state.highestMarketCap,
        }
    }
}

/// A confirmed state advancement reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advancement {
    /// Asset that advanced
    pub asset: Address,
    /// Tier before the write
    pub from_tier: u8,
    /// Tier after the write
    pub to_tier: u8,
    /// New highest market cap
    pub market_cap: U256,
}

/// Result of a confirmed ledger write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Transaction hash (zero for writes that never left the process)
    pub tx_hash: B256,
    /// Block the write was included in
    pub block_number: Option<u64>,
    /// Advancements signalled by the ledger; empty = accepted, nothing moved
    pub advancements: Vec<Advancement>,
}

impl AdvanceOutcome {
    /// Number of assets that actually advanced.
    pub fn evolved(&self) -> usize {
        self.advancements.len()
    }
}

/// Local validation failures for ledger writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Batch with nothing in it.
    #[error("empty batch")]
    EmptyBatch,

    /// Parallel arrays differ in length.
    #[error("batch length mismatch: {assets} assets, {market_caps} market caps")]
    LengthMismatch {
        /// Number of asset ids
        assets: usize,
        /// Number of market caps
        market_caps: usize,
    },

    /// Batch larger than the ledger accepts per call.
    #[error("batch of {len} exceeds ledger maximum of {max}")]
    BatchTooLarge {
        /// Requested batch length
        len: usize,
        /// Per-call maximum
        max: usize,
    },
}

impl LedgerError {
    /// Check batch shape before any write is attempted.
    pub fn validate_batch(
        assets: &[Address],
        market_caps: &[U256],
        max: usize,
    ) -> std::result::Result<(), LedgerError> {
        if assets.len() != market_caps.len() {
            return Err(LedgerError::LengthMismatch {
                assets: assets.len(),
                market_caps: market_caps.len(),
            });
        }
        if assets.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        if assets.len() > max {
            return Err(LedgerError::BatchTooLarge {
                len: assets.len(),
                max,
            });
        }
        Ok(())
    }
}

/// Operations the monitor needs from the ledger of record.
#[async_trait]
pub trait EvolutionLedger: Send + Sync + Debug {
    /// Read every tracked asset with its durable state.
    async fn list_tracked_assets(&self) -> Result<Vec<TrackedAsset>>;

    /// Advance one asset if `market_cap` is above its stored high.
    async fn advance_if_higher(&self, asset: Address, market_cap: U256) -> Result<AdvanceOutcome>;

    /// Batched `advance_if_higher`; slices are parallel.
    async fn advance_batch_if_higher(
        &self,
        assets: &[Address],
        market_caps: &[U256],
    ) -> Result<AdvanceOutcome>;

    /// Maximum elements per batch call.
    fn max_batch_size(&self) -> usize;
}

/// Default per-call element cap for batch writes.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Gas for a single `advanceIfHigher`.
const SINGLE_ADVANCE_GAS: u64 = 150_000;
/// Fixed overhead of a batch call.
const BATCH_BASE_GAS: u64 = 60_000;
/// Marginal gas per batch element.
const BATCH_ELEMENT_GAS: u64 = 45_000;
/// Ceiling for any batch write's gas limit.
pub const MAX_BATCH_GAS: u64 = 5_000_000;
/// Largest batch whose scaled gas limit stays under [`MAX_BATCH_GAS`].
pub const MAX_BATCH_ELEMENTS: usize = ((MAX_BATCH_GAS - BATCH_BASE_GAS) / BATCH_ELEMENT_GAS) as usize;

fn clamp_batch_size(max: usize) -> usize {
    max.clamp(1, MAX_BATCH_ELEMENTS)
}

/// On-chain ledger backed by alloy contract bindings.
pub struct LedgerContract {
    /// Ledger contract address
    pub address: Address,
    /// RPC URL for reads
    read_url: String,
    /// Signer for writes
    sender: Arc<TransactionSender>,
    /// Per-call batch cap
    max_batch_size: usize,
}

impl LedgerContract {
    /// Create a ledger client; reads go to the sender's RPC endpoint.
    pub fn new(address: Address, sender: Arc<TransactionSender>) -> Self {
        Self {
            address,
            read_url: sender.rpc_url().to_string(),
            sender,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Use a separate RPC endpoint for reads.
    pub fn with_read_url(mut self, read_url: impl Into<String>) -> Self {
        self.read_url = read_url.into();
        self
    }

    /// Override the per-call batch cap, clamped to `1..=MAX_BATCH_ELEMENTS`.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = clamp_batch_size(max);
        self
    }

    /// Gas limit for a batch of `len` elements, capped at [`MAX_BATCH_GAS`].
    pub fn batch_gas_limit(len: usize) -> u64 {
        BATCH_BASE_GAS
            .saturating_add(BATCH_ELEMENT_GAS.saturating_mul(len as u64))
            .min(MAX_BATCH_GAS)
    }

    fn outcome(&self, receipt: &alloy::rpc::types::TransactionReceipt) -> AdvanceOutcome {
        let advancements = contracts::decode_advancements(
            self.address,
            receipt.inner.logs().iter().map(|log| &log.inner),
        );
        AdvanceOutcome {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            advancements,
        }
    }
}

#[async_trait]
impl EvolutionLedger for LedgerContract {
    #[instrument(skip(self), fields(ledger = %self.address))]
    async fn list_tracked_assets(&self) -> Result<Vec<TrackedAsset>> {
        let start = Instant::now();
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        let contract = IEvolutionLedger::new(self.address, &provider);

        let states = contract
            .getTrackedAssets()
            .call()
            .await
            .context("getTrackedAssets call failed")?;

        let assets: Vec<TrackedAsset> = states._0.into_iter().map(TrackedAsset::from).collect();

        debug!(
            count = assets.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Tracked assets read from ledger"
        );
        Ok(assets)
    }

    #[instrument(skip(self), fields(asset = %asset, market_cap = %market_cap))]
    async fn advance_if_higher(&self, asset: Address, market_cap: U256) -> Result<AdvanceOutcome> {
        let calldata = contracts::encode_advance(asset, market_cap);
        let receipt = self
            .sender
            .send_and_confirm(self.address, calldata, Some(SINGLE_ADVANCE_GAS))
            .await
            .with_context(|| format!("advanceIfHigher({asset}) failed"))?;

        let outcome = self.outcome(&receipt);
        info!(
            tx_hash = %outcome.tx_hash,
            evolved = outcome.evolved(),
            "advanceIfHigher confirmed"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, assets, market_caps), fields(len = assets.len()))]
    async fn advance_batch_if_higher(
        &self,
        assets: &[Address],
        market_caps: &[U256],
    ) -> Result<AdvanceOutcome> {
        LedgerError::validate_batch(assets, market_caps, self.max_batch_size)?;

        let calldata = contracts::encode_advance_batch(assets, market_caps);
        let receipt = self
            .sender
            .send_and_confirm(
                self.address,
                calldata,
                Some(Self::batch_gas_limit(assets.len())),
            )
            .await
            .with_context(|| format!("advanceBatchIfHigher({} assets) failed", assets.len()))?;

        let outcome = self.outcome(&receipt);
        info!(
            tx_hash = %outcome.tx_hash,
            batch = assets.len(),
            evolved = outcome.evolved(),
            "advanceBatchIfHigher confirmed"
        );
        Ok(outcome)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

impl std::fmt::Debug for LedgerContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContract")
            .field("address", &self.address)
            .field("read_url", &self.read_url)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_token_defaults_to_asset() {
        let asset = Address::repeat_byte(1);
        assert_eq!(TrackedAsset::new(asset, Address::ZERO).market_token(), asset);

        let paired = Address::repeat_byte(2);
        assert_eq!(TrackedAsset::new(asset, paired).market_token(), paired);
    }

    #[test]
    fn test_asset_state_conversion() {
        let state = IEvolutionLedger::AssetState {
            asset: Address::repeat_byte(1),
            marketToken: Address::repeat_byte(2),
            tier: 3,
            highestMarketCap: U256::from(80_000u64),
        };
        let asset = TrackedAsset::from(state);
        assert_eq!(asset.current_tier, 3);
        assert_eq!(asset.highest_market_cap, U256::from(80_000u64));
        assert_eq!(asset.external_token, Address::repeat_byte(2));
    }

    #[test]
    fn test_validate_batch() {
        let a = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let caps = [U256::from(1u64), U256::from(2u64)];

        assert!(LedgerError::validate_batch(&a, &caps, 2).is_ok());
        assert_eq!(
            LedgerError::validate_batch(&a, &caps[..1], 2),
            Err(LedgerError::LengthMismatch { assets: 2, market_caps: 1 })
        );
        assert_eq!(
            LedgerError::validate_batch(&a, &caps, 1),
            Err(LedgerError::BatchTooLarge { len: 2, max: 1 })
        );
        assert_eq!(
            LedgerError::validate_batch(&[], &[], 5),
            Err(LedgerError::EmptyBatch)
        );
    }

    #[test]
    fn test_batch_gas_scales() {
        assert!(LedgerContract::batch_gas_limit(50) > LedgerContract::batch_gas_limit(10));
        assert_eq!(LedgerContract::batch_gas_limit(1), BATCH_BASE_GAS + BATCH_ELEMENT_GAS);
        assert_eq!(LedgerContract::batch_gas_limit(50), 2_310_000);
    }

    #[test]
    fn test_batch_gas_capped() {
        assert_eq!(LedgerContract::batch_gas_limit(500), MAX_BATCH_GAS);
        assert_eq!(LedgerContract::batch_gas_limit(usize::MAX), MAX_BATCH_GAS);
        assert!(LedgerContract::batch_gas_limit(MAX_BATCH_ELEMENTS) <= MAX_BATCH_GAS);
        assert_eq!(MAX_BATCH_ELEMENTS, 109);
    }

    #[test]
    fn test_max_batch_size_clamped() {
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(DEFAULT_MAX_BATCH_SIZE), DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(clamp_batch_size(500), MAX_BATCH_ELEMENTS);
    }

    #[test]
    fn test_outcome_counts() {
        let outcome = AdvanceOutcome {
            advancements: vec![Advancement {
                asset: Address::ZERO,
                from_tier: 0,
                to_tier: 1,
                market_cap: U256::from(1u64),
            }],
            ..Default::default()
        };
        assert_eq!(outcome.evolved(), 1);
        assert_eq!(AdvanceOutcome::default().evolved(), 0);
    }
}
