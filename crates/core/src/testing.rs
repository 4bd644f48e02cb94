//! In-memory ledger and scripted market data for unit tests.

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use evolution_api::{MarketDataProvider, PriceSample, ProviderError};
use evolution_chain::{AdvanceOutcome, Advancement, EvolutionLedger, LedgerError, TrackedAsset};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::tier::TierThresholdTable;

/// Compare-and-advance ledger held in memory.
#[derive(Debug)]
pub(crate) struct InMemoryLedger {
    tiers: TierThresholdTable,
    state: Mutex<Vec<TrackedAsset>>,
    max_batch: usize,
    single_writes: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    failing: Mutex<HashSet<Address>>,
    hanging: Mutex<HashSet<Address>>,
    fail_reads: AtomicBool,
    panic_reads: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    tx_counter: AtomicU64,
}

impl InMemoryLedger {
    pub fn new(tiers: TierThresholdTable, assets: Vec<TrackedAsset>) -> Self {
        Self {
            tiers,
            state: Mutex::new(assets),
            max_batch: 50,
            single_writes: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            fail_reads: AtomicBool::new(false),
            panic_reads: AtomicBool::new(false),
            read_delay: Mutex::new(None),
            reads: AtomicUsize::new(0),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    pub fn fail_writes_for(&self, asset: Address) {
        self.failing.lock().insert(asset);
    }

    pub fn hang_writes_for(&self, asset: Address) {
        self.hanging.lock().insert(asset);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_panic_reads(&self, panic: bool) {
        self.panic_reads.store(panic, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    pub fn asset(&self, asset: Address) -> Option<TrackedAsset> {
        self.state.lock().iter().find(|a| a.asset_id == asset).cloned()
    }

    pub fn single_writes(&self) -> usize {
        self.single_writes.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn apply(&self, asset: Address, market_cap: U256) -> Result<Option<Advancement>> {
        let mut state = self.state.lock();
        let entry = state
            .iter_mut()
            .find(|a| a.asset_id == asset)
            .ok_or_else(|| anyhow::anyhow!("asset {asset} is not tracked"))?;
        if market_cap <= entry.highest_market_cap {
            return Ok(None);
        }
        let from_tier = entry.current_tier;
        entry.highest_market_cap = market_cap;
        entry.current_tier = from_tier.max(self.tiers.resolve_tier(market_cap));
        Ok(Some(Advancement {
            asset,
            from_tier,
            to_tier: entry.current_tier,
            market_cap,
        }))
    }

    fn outcome(&self, advancements: Vec<Advancement>) -> AdvanceOutcome {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        AdvanceOutcome {
            tx_hash: B256::left_padding_from(&n.to_be_bytes()),
            block_number: Some(n),
            advancements,
        }
    }

    fn touches(&self, set: &Mutex<HashSet<Address>>, assets: &[Address]) -> bool {
        let set = set.lock();
        assets.iter().any(|a| set.contains(a))
    }
}

#[async_trait]
impl EvolutionLedger for InMemoryLedger {
    async fn list_tracked_assets(&self) -> Result<Vec<TrackedAsset>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_reads.load(Ordering::SeqCst) {
            panic!("ledger read exploded");
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("ledger read failed");
        }
        Ok(self.state.lock().clone())
    }

    async fn advance_if_higher(&self, asset: Address, market_cap: U256) -> Result<AdvanceOutcome> {
        self.single_writes.fetch_add(1, Ordering::SeqCst);
        if self.touches(&self.hanging, &[asset]) {
            return std::future::pending().await;
        }
        if self.touches(&self.failing, &[asset]) {
            anyhow::bail!("write for {asset} reverted");
        }
        let advancements = self.apply(asset, market_cap)?.into_iter().collect();
        Ok(self.outcome(advancements))
    }

    async fn advance_batch_if_higher(
        &self,
        assets: &[Address],
        market_caps: &[U256],
    ) -> Result<AdvanceOutcome> {
        LedgerError::validate_batch(assets, market_caps, self.max_batch)?;
        self.batch_sizes.lock().push(assets.len());
        if self.touches(&self.hanging, assets) {
            return std::future::pending().await;
        }
        if self.touches(&self.failing, assets) {
            anyhow::bail!("batch write reverted");
        }
        let mut advancements = Vec::new();
        for (asset, cap) in assets.iter().zip(market_caps) {
            advancements.extend(self.apply(*asset, *cap)?);
        }
        Ok(self.outcome(advancements))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

/// Market data answered from a mutable table.
#[derive(Debug, Default)]
pub(crate) struct ScriptedMarket {
    caps: Mutex<HashMap<Address, f64>>,
    failing: Mutex<HashSet<Address>>,
    panicking: Mutex<HashSet<Address>>,
    calls: AtomicUsize,
}

impl ScriptedMarket {
    pub fn set_cap(&self, token: Address, usd: f64) {
        self.caps.lock().insert(token, usd);
    }

    pub fn fail(&self, token: Address) {
        self.failing.lock().insert(token);
    }

    pub fn panic_on(&self, token: Address) {
        self.panicking.lock().insert(token);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarket {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, token: Address) -> Result<Option<PriceSample>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.lock().contains(&token) {
            panic!("scripted panic for {token}");
        }
        if self.failing.lock().contains(&token) {
            return Err(ProviderError::Malformed("scripted failure".into()));
        }
        let cap = self.caps.lock().get(&token).copied();
        Ok(cap.map(|market_cap| PriceSample {
            token,
            price_usd: 0.001,
            market_cap,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            source: "scripted".into(),
            fdv_fallback: false,
        }))
    }
}

/// Default table scaled to six decimals.
pub(crate) fn usd_tiers() -> TierThresholdTable {
    TierThresholdTable::from_usd(&[0, 5_000, 25_000, 75_000, 250_000, 1_000_000], 6)
        .expect("valid table")
}

/// Whole USD in ledger units.
pub(crate) fn usd(v: u64) -> U256 {
    U256::from(v) * U256::from(1_000_000u64)
}

pub(crate) fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}
