//! Evolution monitor.
//!
//! Runs one cycle immediately on start and then one per poll interval:
//! 1. Read every tracked asset from the ledger (abort the cycle on failure)
//! 2. Sample market data for all assets concurrently
//! 3. Keep assets whose sampled cap beats their recorded high
//! 4. Hand candidates to the submitter
//!
//! A cycle that errors or panics is logged and counted; the next tick runs
//! as usual. Cycles never overlap: the next tick is only awaited after the
//! current cycle has finished.

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use evolution_api::{PriceOracle, PriceSample};
use evolution_chain::{AssetRegistry, TrackedAsset};
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::candidate::{evaluate, EvolutionCandidate};
use crate::submitter::{EvolutionSubmitter, SubmissionPath, SubmissionReport};
use crate::tier::TierThresholdTable;

/// Monitor runtime settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Interval between cycle starts
    pub poll_interval: Duration,
    /// Fractional digits of ledger market caps
    pub market_cap_decimals: u8,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            market_cap_decimals: 6,
        }
    }
}

/// Result of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Tracked assets a sample was requested for
    pub checked: usize,
    /// Assets with a usable sample
    pub sampled: usize,
    /// Assets no provider had data for
    pub not_found: usize,
    /// Assets that qualified for a write
    pub candidates: usize,
    /// Confirmed advancements
    pub evolved: usize,
    /// Candidates whose write failed
    pub failed: usize,
    /// Submission path taken
    pub path: SubmissionPath,
    /// Cycle duration
    pub elapsed: Duration,
}

/// Counters across the monitor's lifetime.
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub total_evolved: u64,
    pub total_failed: u64,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

impl MonitorStats {
    fn record(&mut self, summary: &CycleSummary) {
        self.cycles_completed += 1;
        self.total_evolved += summary.evolved as u64;
        self.total_failed += summary.failed as u64;
        self.last_cycle = Some(summary.clone());
    }

    fn record_abort(&mut self, reason: String) {
        self.cycles_aborted += 1;
        self.last_error = Some(reason);
    }
}

/// Result of a manual single-asset check.
#[derive(Debug, Clone)]
pub struct AssetCheck {
    /// Ledger state at read time
    pub asset: TrackedAsset,
    /// Market data, if any provider had it
    pub sample: Option<PriceSample>,
    /// Candidate derived from the sample
    pub candidate: Option<EvolutionCandidate>,
    /// Submission result when a write was attempted
    pub report: Option<SubmissionReport>,
}

struct RunHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodic evolution monitor.
pub struct EvolutionMonitor {
    registry: Arc<AssetRegistry>,
    oracle: Arc<PriceOracle>,
    tiers: TierThresholdTable,
    submitter: EvolutionSubmitter,
    settings: MonitorSettings,
    running: Mutex<Option<RunHandle>>,
    stats: Mutex<MonitorStats>,
}

impl EvolutionMonitor {
    pub fn new(
        registry: Arc<AssetRegistry>,
        oracle: Arc<PriceOracle>,
        tiers: TierThresholdTable,
        submitter: EvolutionSubmitter,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            registry,
            oracle,
            tiers,
            submitter,
            settings,
            running: Mutex::new(None),
            stats: Mutex::new(MonitorStats::default()),
        }
    }

    /// Start the periodic loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|h| !h.task.is_finished()) {
            warn!("Monitor already running, start ignored");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move { monitor.run_loop(stop_rx).await });
        *running = Some(RunHandle { stop_tx, task });

        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            providers = ?self.oracle.provider_ids(),
            max_tier = self.tiers.max_tier(),
            "Monitor started"
        );
        true
    }

    /// Stop the loop and wait for an in-flight cycle to finish.
    ///
    /// Returns false if the monitor was not running.
    pub async fn stop(&self) -> bool {
        let handle = self.running.lock().take();
        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.stop_tx.send(true);
        if let Err(e) = handle.task.await {
            error!(error = %e, "Monitor task ended abnormally");
        }
        info!("Monitor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats.lock().clone()
    }

    async fn run_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let period = self.settings.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            self.guarded_cycle().await;
        }
        debug!("Monitor loop exited");
    }

    async fn guarded_cycle(&self) {
        // Errors are already recorded by run_cycle; only panics need handling here.
        if let Err(panic) = AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            let reason = panic_message(panic.as_ref());
            error!(panic = %reason, "Cycle panicked");
            self.stats.lock().record_abort(reason);
        }
    }

    /// Run one cycle now.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        match self.execute_cycle().await {
            Ok(summary) => {
                self.stats.lock().record(&summary);
                Ok(summary)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(error = %reason, "Cycle aborted");
                self.stats.lock().record_abort(reason);
                Err(e)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<CycleSummary> {
        let started_at = Utc::now();
        let start = Instant::now();

        let assets = self
            .registry
            .list_tracked_assets()
            .await
            .context("failed to read tracked assets")?;
        if assets.is_empty() {
            debug!("No tracked assets");
        }

        let tokens: Vec<Address> = assets.iter().map(TrackedAsset::market_token).collect();
        let samples = self.oracle.fetch_many(&tokens).await;

        let mut sampled = 0;
        let mut not_found = 0;
        let mut candidates = Vec::new();
        for (asset, (_, sample)) in assets.iter().zip(samples) {
            let Some(sample) = sample else {
                not_found += 1;
                debug!(asset = %asset.asset_id, "No market data this cycle");
                continue;
            };
            sampled += 1;
            if let Some(candidate) = self.candidate_for(asset, &sample) {
                candidates.push(candidate);
            }
        }

        let report = self.submitter.submit(&candidates).await;
        for advancement in &report.advancements {
            self.registry.record_advancement(advancement);
        }

        let summary = CycleSummary {
            started_at,
            checked: assets.len(),
            sampled,
            not_found,
            candidates: candidates.len(),
            evolved: report.evolved,
            failed: report.failed,
            path: report.path,
            elapsed: start.elapsed(),
        };
        info!(
            checked = summary.checked,
            sampled = summary.sampled,
            not_found = summary.not_found,
            candidates = summary.candidates,
            evolved = summary.evolved,
            failed = summary.failed,
            path = %summary.path,
            elapsed_ms = summary.elapsed.as_millis(),
            "Cycle complete"
        );
        Ok(summary)
    }

    fn candidate_for(&self, asset: &TrackedAsset, sample: &PriceSample) -> Option<EvolutionCandidate> {
        let candidate = evaluate(asset, sample, &self.tiers, self.settings.market_cap_decimals)?;
        // A concurrent manual check may have landed a higher cap since the read.
        if self
            .registry
            .is_known_stale(&candidate.asset_id, candidate.new_market_cap)
        {
            return None;
        }
        debug!(
            asset = %candidate.asset_id,
            market_cap = %candidate.new_market_cap,
            previous_high = %candidate.previous_high,
            from_tier = candidate.current_tier,
            to_tier = candidate.resolved_tier,
            source = %candidate.source,
            fdv = sample.fdv_fallback,
            "Evolution candidate"
        );
        Some(candidate)
    }

    /// Evaluate and, if it qualifies, write a single asset.
    ///
    /// Unknown asset ids are an error.
    #[instrument(skip(self))]
    pub async fn check_asset(&self, asset_id: Address) -> Result<AssetCheck> {
        let assets = self
            .registry
            .list_tracked_assets()
            .await
            .context("failed to read tracked assets")?;
        let asset = assets
            .into_iter()
            .find(|a| a.asset_id == asset_id)
            .ok_or_else(|| anyhow!("asset {asset_id} is not tracked"))?;

        let sample = self.oracle.fetch_market_cap(asset.market_token()).await;
        let candidate = sample
            .as_ref()
            .and_then(|s| self.candidate_for(&asset, s));

        let report = match &candidate {
            Some(c) => {
                let report = self.submitter.submit(std::slice::from_ref(c)).await;
                for advancement in &report.advancements {
                    self.registry.record_advancement(advancement);
                }
                Some(report)
            }
            None => None,
        };

        info!(
            asset = %asset_id,
            sampled = sample.is_some(),
            candidate = candidate.is_some(),
            evolved = report.as_ref().map(|r| r.evolved).unwrap_or(0),
            "Asset check complete"
        );
        Ok(AssetCheck {
            asset,
            sample,
            candidate,
            report,
        })
    }
}

impl std::fmt::Debug for EvolutionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionMonitor")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("assets", &self.registry.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submitter::SubmitterConfig;
    use crate::testing::{addr, usd, usd_tiers, InMemoryLedger, ScriptedMarket};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        market: Arc<ScriptedMarket>,
        monitor: Arc<EvolutionMonitor>,
    }

    fn monitor_over(ledger: Arc<InMemoryLedger>, market: Arc<ScriptedMarket>) -> Arc<EvolutionMonitor> {
        let registry = Arc::new(AssetRegistry::new(ledger.clone()));
        let oracle = Arc::new(PriceOracle::new(Duration::from_secs(5)).with_provider(market));
        let submitter = EvolutionSubmitter::new(
            ledger,
            SubmitterConfig {
                inter_submission_delay: Duration::ZERO,
                ..Default::default()
            },
        );
        Arc::new(EvolutionMonitor::new(
            registry,
            oracle,
            usd_tiers(),
            submitter,
            MonitorSettings::default(),
        ))
    }

    fn fixture(count: u8) -> Fixture {
        let assets = (1..=count)
            .map(|i| TrackedAsset::new(addr(i), Address::ZERO))
            .collect();
        let ledger = Arc::new(InMemoryLedger::new(usd_tiers(), assets));
        let market = Arc::new(ScriptedMarket::default());
        let monitor = monitor_over(ledger.clone(), market.clone());
        Fixture {
            ledger,
            market,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_high_water_mark_scenario() {
        let f = fixture(1);
        let a = addr(1);

        f.market.set_cap(a, 6_000.0);
        let summary = f.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.evolved, 1);
        let state = f.ledger.asset(a).unwrap();
        assert_eq!(state.current_tier, 1);
        assert_eq!(state.highest_market_cap, usd(6_000));

        f.market.set_cap(a, 4_000.0);
        let summary = f.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.candidates, 0);
        assert_eq!(summary.path, SubmissionPath::Skipped);
        assert_eq!(f.ledger.asset(a).unwrap().current_tier, 1);

        f.market.set_cap(a, 80_000.0);
        f.monitor.run_cycle().await.unwrap();
        let state = f.ledger.asset(a).unwrap();
        assert_eq!(state.current_tier, 3);
        assert_eq!(state.highest_market_cap, usd(80_000));

        let stats = f.monitor.stats();
        assert_eq!(stats.cycles_completed, 3);
        assert_eq!(stats.total_evolved, 2);
    }

    #[tokio::test]
    async fn test_state_never_regresses() {
        let f = fixture(1);
        let a = addr(1);
        let mut last = f.ledger.asset(a).unwrap();

        for cap in [1_000.0, 6_000.0, 3_000.0, 30_000.0, 30_000.0, 20_000.0, 300_000.0, 50.0] {
            f.market.set_cap(a, cap);
            f.monitor.run_cycle().await.unwrap();
            let now = f.ledger.asset(a).unwrap();
            assert!(now.current_tier >= last.current_tier);
            assert!(now.highest_market_cap >= last.highest_market_cap);
            last = now;
        }
        assert_eq!(last.current_tier, 4);
        assert_eq!(last.highest_market_cap, usd(300_000));
    }

    #[tokio::test]
    async fn test_one_failed_fetch_does_not_block_others() {
        let f = fixture(10);
        for i in 1..=10 {
            f.market.set_cap(addr(i), 6_000.0);
        }
        f.market.fail(addr(4));

        let summary = f.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.checked, 10);
        assert_eq!(summary.sampled, 9);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.evolved, 9);
        assert_eq!(f.ledger.asset(addr(4)).unwrap().current_tier, 0);
    }

    #[tokio::test]
    async fn test_panicking_fetch_does_not_abort_cycle() {
        let f = fixture(10);
        for i in 1..=10 {
            f.market.set_cap(addr(i), 6_000.0);
        }
        f.market.panic_on(addr(4));

        let summary = f.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.checked, 10);
        assert_eq!(summary.sampled, 9);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.evolved, 9);
        assert_eq!(f.ledger.asset(addr(4)).unwrap().current_tier, 0);
        assert_eq!(f.ledger.asset(addr(5)).unwrap().current_tier, 1);

        let stats = f.monitor.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.cycles_aborted, 0);
    }

    #[tokio::test]
    async fn test_ledger_read_failure_aborts_cycle() {
        let f = fixture(2);
        f.market.set_cap(addr(1), 6_000.0);
        f.ledger.set_fail_reads(true);

        assert!(f.monitor.run_cycle().await.is_err());
        assert_eq!(f.market.calls(), 0);
        assert_eq!(f.ledger.single_writes(), 0);

        let stats = f.monitor.stats();
        assert_eq!(stats.cycles_aborted, 1);
        assert_eq!(stats.cycles_completed, 0);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn test_large_candidate_set_uses_batch() {
        let f = fixture(11);
        for i in 1..=11 {
            f.market.set_cap(addr(i), 30_000.0);
        }

        let summary = f.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.path, SubmissionPath::Batch);
        assert_eq!(summary.evolved, 11);
        assert_eq!(f.ledger.batch_sizes(), vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_on_interval() {
        let f = fixture(1);

        assert!(f.monitor.start());
        assert!(!f.monitor.start());
        assert!(f.monitor.is_running());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.monitor.stats().cycles_completed, 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.monitor.stats().cycles_completed, 2);

        assert!(f.monitor.stop().await);
        assert!(!f.monitor.is_running());
        assert!(!f.monitor.stop().await);

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(f.monitor.stats().cycles_completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_cycle() {
        let f = fixture(1);
        f.ledger.set_read_delay(Duration::from_secs(10));

        f.monitor.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.monitor.stats().cycles_completed, 0);

        f.monitor.stop().await;
        assert_eq!(f.monitor.stats().cycles_completed, 1);
        assert_eq!(f.ledger.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_does_not_stop_loop() {
        let f = fixture(1);
        f.ledger.set_panic_reads(true);

        f.monitor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.monitor.stats().cycles_aborted, 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.monitor.stats().cycles_aborted, 2);
        assert!(f.monitor.is_running());

        f.ledger.set_panic_reads(false);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.monitor.stats().cycles_completed, 1);

        f.monitor.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_monitors_advance_once() {
        let f = fixture(1);
        let other = monitor_over(f.ledger.clone(), f.market.clone());
        f.market.set_cap(addr(1), 6_000.0);

        let (a, b) = tokio::join!(f.monitor.run_cycle(), other.run_cycle());
        assert_eq!(a.unwrap().evolved + b.unwrap().evolved, 1);
        assert_eq!(f.ledger.asset(addr(1)).unwrap().highest_market_cap, usd(6_000));
    }

    #[tokio::test]
    async fn test_check_asset() {
        let f = fixture(2);
        f.market.set_cap(addr(2), 30_000.0);

        let check = f.monitor.check_asset(addr(2)).await.unwrap();
        assert!(check.candidate.is_some());
        let report = check.report.unwrap();
        assert_eq!(report.path, SubmissionPath::Individual);
        assert_eq!(report.evolved, 1);
        assert_eq!(f.ledger.asset(addr(2)).unwrap().current_tier, 2);

        let check = f.monitor.check_asset(addr(1)).await.unwrap();
        assert!(check.sample.is_none());
        assert!(check.report.is_none());

        assert!(f.monitor.check_asset(addr(9)).await.is_err());
        assert_eq!(f.monitor.stats().cycles_completed, 0);
    }
}
