//! Configuration system for the evolution monitor.
//!
//! This module provides:
//! - Monitor runtime configuration (profiles, timing, submission, providers, tiers)
//! - Chain connection settings read from the environment

mod chain;
mod monitor;

pub use chain::{
    ChainEnv, CHAIN_ID_ENV, DEFAULT_CHAIN_ID, LEDGER_ADDRESS_ENV, PRIVATE_KEY_ENV,
    READ_RPC_URL_ENV, RPC_URL_ENV,
};
pub use monitor::{
    MonitorConfig, MonitorTimingConfig, OracleSettings, SubmitterSettings, TierSettings,
    CONFIG_FILE_ENV, POLL_INTERVAL_ENV, PROFILE_ENV,
};
