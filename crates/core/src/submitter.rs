//! Evolution submitter.
//!
//! Turns a cycle's candidates into ledger writes. Small candidate sets go out
//! one write per asset; larger sets go out in chunks through the batch entry
//! point. Every write is compare-and-advance on the ledger, so resubmitting a
//! candidate that already landed is harmless.
//!
//! Failures are isolated: a failed write (or chunk) is logged and counted,
//! and the remaining candidates are still attempted.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use evolution_chain::{AdvanceOutcome, Advancement, EvolutionLedger};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::candidate::EvolutionCandidate;

/// Runtime submission settings.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Up to this many candidates are written one by one
    pub individual_threshold: usize,
    /// Assets per batch write (clamped to the ledger maximum)
    pub batch_size: usize,
    /// Pause between consecutive writes
    pub inter_submission_delay: Duration,
    /// Upper bound on one write including confirmation
    pub write_timeout: Duration,
    /// Log candidates without writing
    pub dry_run: bool,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            individual_threshold: 10,
            batch_size: 50,
            inter_submission_delay: Duration::from_millis(500),
            write_timeout: Duration::from_secs(120),
            dry_run: false,
        }
    }
}

/// How a cycle's candidates were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionPath {
    /// Nothing to write
    Skipped,
    /// One write per candidate
    Individual,
    /// Chunked batch writes
    Batch,
}

impl std::fmt::Display for SubmissionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionPath::Skipped => write!(f, "skipped"),
            SubmissionPath::Individual => write!(f, "individual"),
            SubmissionPath::Batch => write!(f, "batch"),
        }
    }
}

/// Outcome of one submission pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Path taken
    pub path: SubmissionPath,
    /// Candidates sent to the ledger
    pub attempted: usize,
    /// Advancements confirmed by the ledger
    pub evolved: usize,
    /// Candidates whose write failed or timed out
    pub failed: usize,
    /// True when nothing was written because of dry-run mode
    pub dry_run: bool,
    /// Confirmed advancements
    pub advancements: Vec<Advancement>,
}

impl SubmissionReport {
    fn new(path: SubmissionPath) -> Self {
        Self {
            path,
            attempted: 0,
            evolved: 0,
            failed: 0,
            dry_run: false,
            advancements: Vec::new(),
        }
    }

    /// Number of advancements that also crossed a tier boundary.
    pub fn tier_changes(&self) -> usize {
        self.advancements
            .iter()
            .filter(|a| a.to_tier > a.from_tier)
            .count()
    }
}

/// Writes candidates to the ledger.
#[derive(Debug)]
pub struct EvolutionSubmitter {
    ledger: Arc<dyn EvolutionLedger>,
    config: SubmitterConfig,
}

impl EvolutionSubmitter {
    pub fn new(ledger: Arc<dyn EvolutionLedger>, config: SubmitterConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Path for a candidate count.
    pub fn choose_path(&self, candidates: usize) -> SubmissionPath {
        match candidates {
            0 => SubmissionPath::Skipped,
            n if n <= self.config.individual_threshold => SubmissionPath::Individual,
            _ => SubmissionPath::Batch,
        }
    }

    /// Chunk size actually used for batch writes.
    pub fn effective_batch_size(&self) -> usize {
        self.config
            .batch_size
            .min(self.ledger.max_batch_size())
            .max(1)
    }

    /// Write all candidates, isolating failures.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn submit(&self, candidates: &[EvolutionCandidate]) -> SubmissionReport {
        let path = self.choose_path(candidates.len());
        let mut report = SubmissionReport::new(path);

        if self.config.dry_run && path != SubmissionPath::Skipped {
            for c in candidates {
                info!(
                    asset = %c.asset_id,
                    market_cap = %c.new_market_cap,
                    from_tier = c.current_tier,
                    to_tier = c.resolved_tier,
                    "Dry run, would submit"
                );
            }
            report.dry_run = true;
            return report;
        }

        match path {
            SubmissionPath::Skipped => {}
            SubmissionPath::Individual => self.submit_individual(candidates, &mut report).await,
            SubmissionPath::Batch => self.submit_batches(candidates, &mut report).await,
        }

        info!(
            path = %report.path,
            attempted = report.attempted,
            evolved = report.evolved,
            tier_changes = report.tier_changes(),
            failed = report.failed,
            "Submission complete"
        );
        report
    }

    async fn submit_individual(&self, candidates: &[EvolutionCandidate], report: &mut SubmissionReport) {
        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            report.attempted += 1;

            let write = self
                .ledger
                .advance_if_higher(candidate.asset_id, candidate.new_market_cap);
            match self.bounded(write).await {
                Ok(outcome) => Self::absorb(outcome, report),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        asset = %candidate.asset_id,
                        market_cap = %candidate.new_market_cap,
                        error = %e,
                        "Evolution write failed"
                    );
                }
            }
        }
    }

    async fn submit_batches(&self, candidates: &[EvolutionCandidate], report: &mut SubmissionReport) {
        let chunk_size = self.effective_batch_size();
        let chunks = candidates.len().div_ceil(chunk_size);
        debug!(chunk_size, chunks, "Submitting in batches");

        for (i, chunk) in candidates.chunks(chunk_size).enumerate() {
            if i > 0 {
                self.pause().await;
            }
            report.attempted += chunk.len();

            let (assets, caps): (Vec<Address>, Vec<U256>) = chunk
                .iter()
                .map(|c| (c.asset_id, c.new_market_cap))
                .unzip();
            match self.bounded(self.ledger.advance_batch_if_higher(&assets, &caps)).await {
                Ok(outcome) => Self::absorb(outcome, report),
                Err(e) => {
                    report.failed += chunk.len();
                    warn!(
                        chunk = i,
                        size = chunk.len(),
                        error = %e,
                        "Batch write failed"
                    );
                }
            }
        }
    }

    async fn bounded<F>(&self, write: F) -> Result<AdvanceOutcome>
    where
        F: Future<Output = Result<AdvanceOutcome>>,
    {
        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "write not confirmed within {:?}",
                self.config.write_timeout
            )),
        }
    }

    fn absorb(outcome: AdvanceOutcome, report: &mut SubmissionReport) {
        if outcome.advancements.is_empty() {
            // Someone else already recorded an equal or higher cap.
            debug!(tx_hash = %outcome.tx_hash, "Write accepted without advancement");
            return;
        }
        for adv in &outcome.advancements {
            info!(
                asset = %adv.asset,
                from_tier = adv.from_tier,
                to_tier = adv.to_tier,
                market_cap = %adv.market_cap,
                tx_hash = %outcome.tx_hash,
                "Asset evolved"
            );
        }
        report.evolved += outcome.advancements.len();
        report.advancements.extend(outcome.advancements);
    }

    async fn pause(&self) {
        if !self.config.inter_submission_delay.is_zero() {
            tokio::time::sleep(self.config.inter_submission_delay).await;
        }
    }
}
