//! Evolution monitor core logic.
//!
//! This crate provides:
//! - Market-cap tier policy
//! - Candidate selection against the ledger's recorded highs
//! - Individual and batched ledger submission with failure isolation
//! - The periodic monitor loop
//! - Profile-based configuration

mod candidate;
pub mod config;
mod error;
mod monitor;
mod submitter;
mod tier;

#[cfg(test)]
mod testing;

pub use candidate::{evaluate, EvolutionCandidate};
pub use config::{ChainEnv, MonitorConfig};
pub use error::ConfigError;
pub use monitor::{AssetCheck, CycleSummary, EvolutionMonitor, MonitorSettings, MonitorStats};
pub use submitter::{EvolutionSubmitter, SubmissionPath, SubmissionReport, SubmitterConfig};
pub use tier::{TierThreshold, TierThresholdTable};
