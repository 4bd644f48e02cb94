//! Tracked-asset registry reader.
//!
//! Reads the full asset set from the ledger and keeps a snapshot of the last
//! confirmed read. The snapshot is never treated as fresher than the ledger;
//! it only lets callers skip writes that are already known to be no-ops.

use alloy::primitives::{Address, U256};
use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ledger::{Advancement, EvolutionLedger, TrackedAsset};

/// Registry of assets under evolution tracking.
#[derive(Debug)]
pub struct AssetRegistry {
    /// Ledger of record
    ledger: Arc<dyn EvolutionLedger>,
    /// Last confirmed state per asset
    snapshot: DashMap<Address, TrackedAsset>,
}

impl AssetRegistry {
    /// Create a registry over a ledger.
    pub fn new(ledger: Arc<dyn EvolutionLedger>) -> Self {
        Self {
            ledger,
            snapshot: DashMap::new(),
        }
    }

    /// Read every tracked asset from the ledger.
    ///
    /// On error nothing is returned and the previous snapshot is kept; a
    /// partial read is never acted upon. Duplicate asset ids keep their
    /// first entry.
    pub async fn list_tracked_assets(&self) -> Result<Vec<TrackedAsset>> {
        let raw = self.ledger.list_tracked_assets().await?;

        let mut seen = HashSet::with_capacity(raw.len());
        let mut assets = Vec::with_capacity(raw.len());
        for asset in raw {
            if !seen.insert(asset.asset_id) {
                warn!(asset = %asset.asset_id, "Duplicate asset in ledger listing, keeping first");
                continue;
            }
            assets.push(asset);
        }

        self.snapshot.clear();
        for asset in &assets {
            self.snapshot.insert(asset.asset_id, asset.clone());
        }

        debug!(count = assets.len(), "Registry snapshot refreshed");
        Ok(assets)
    }

    /// Last known state of an asset.
    pub fn cached(&self, asset: &Address) -> Option<TrackedAsset> {
        self.snapshot.get(asset).map(|a| a.clone())
    }

    /// Apply a confirmed advancement to the snapshot.
    ///
    /// Only moves state forward, mirroring the ledger's own rule.
    pub fn record_advancement(&self, advancement: &Advancement) {
        if let Some(mut entry) = self.snapshot.get_mut(&advancement.asset) {
            if advancement.market_cap > entry.highest_market_cap {
                entry.highest_market_cap = advancement.market_cap;
            }
            if advancement.to_tier > entry.current_tier {
                entry.current_tier = advancement.to_tier;
            }
        }
    }

    /// Whether a write of `market_cap` for `asset` is known to be a no-op.
    pub fn is_known_stale(&self, asset: &Address, market_cap: U256) -> bool {
        self.snapshot
            .get(asset)
            .is_some_and(|a| market_cap <= a.highest_market_cap)
    }

    /// Number of assets in the snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Underlying ledger.
    pub fn ledger(&self) -> &Arc<dyn EvolutionLedger> {
        &self.ledger
    }
}
