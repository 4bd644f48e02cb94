//! Monitor configuration with profile support.
//!
//! Provides centralized configuration for polling, submission, market data
//! and tier thresholds with support for different profiles (testing,
//! production).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use evolution_api::{DexScreenerClient, GeckoTerminalClient, PriceOracle};
use evolution_chain::{DEFAULT_MAX_BATCH_SIZE, MAX_BATCH_ELEMENTS};

use crate::error::ConfigError;
use crate::monitor::MonitorSettings;
use crate::submitter::SubmitterConfig;
use crate::tier::TierThresholdTable;

/// Profile selector.
pub const PROFILE_ENV: &str = "MONITOR_PROFILE";
/// Path to a TOML config file; takes precedence over the profile.
pub const CONFIG_FILE_ENV: &str = "MONITOR_CONFIG";
/// Poll interval override in seconds.
pub const POLL_INTERVAL_ENV: &str = "POLL_INTERVAL_SECS";

/// Main configuration structure containing all monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Cycle timing
    #[serde(default)]
    pub monitor: MonitorTimingConfig,

    /// Ledger write behaviour
    #[serde(default)]
    pub submitter: SubmitterSettings,

    /// Market-data providers
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Tier thresholds
    #[serde(default)]
    pub tiers: TierSettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Cycle timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTimingConfig {
    /// Interval between cycle starts (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for MonitorTimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl MonitorTimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Ledger write configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterSettings {
    /// Candidate count up to which writes go out one by one
    #[serde(default = "default_individual_threshold")]
    pub individual_threshold: usize,

    /// Maximum assets per batch write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Element cap the ledger contract enforces per batch call
    #[serde(default = "default_ledger_max_batch_size")]
    pub ledger_max_batch_size: usize,

    /// Pause between consecutive writes (milliseconds)
    #[serde(default = "default_inter_submission_delay")]
    pub inter_submission_delay_ms: u64,

    /// Upper bound on a single write including confirmation (seconds)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Receipt wait inside the transaction sender (seconds)
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Blocks a write must be buried under
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,

    /// Log candidates without writing
    #[serde(default)]
    pub dry_run: bool,
}

fn default_individual_threshold() -> usize {
    10
}
fn default_batch_size() -> usize {
    50
}
fn default_ledger_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}
fn default_inter_submission_delay() -> u64 {
    500
}
fn default_write_timeout() -> u64 {
    120
}
fn default_confirmation_timeout() -> u64 {
    90
}
fn default_required_confirmations() -> u64 {
    1
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            individual_threshold: default_individual_threshold(),
            batch_size: default_batch_size(),
            ledger_max_batch_size: default_ledger_max_batch_size(),
            inter_submission_delay_ms: default_inter_submission_delay(),
            write_timeout_secs: default_write_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            required_confirmations: default_required_confirmations(),
            dry_run: false,
        }
    }
}

impl SubmitterSettings {
    pub fn inter_submission_delay(&self) -> Duration {
        Duration::from_millis(self.inter_submission_delay_ms)
    }
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Market-data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Provider ids in priority order
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Time budget per provider call (milliseconds)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,

    /// DexScreener chain id
    #[serde(default = "default_dexscreener_chain")]
    pub dexscreener_chain: String,

    /// GeckoTerminal network id
    #[serde(default = "default_geckoterminal_network")]
    pub geckoterminal_network: String,

    /// Fractional digits of market caps stored on the ledger
    #[serde(default = "default_market_cap_decimals")]
    pub market_cap_decimals: u8,
}

fn default_providers() -> Vec<String> {
    vec!["dexscreener".to_string(), "geckoterminal".to_string()]
}
fn default_provider_timeout() -> u64 {
    10_000
}
fn default_dexscreener_chain() -> String {
    "base".to_string()
}
fn default_geckoterminal_network() -> String {
    "base".to_string()
}
fn default_market_cap_decimals() -> u8 {
    6
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            provider_timeout_ms: default_provider_timeout(),
            dexscreener_chain: default_dexscreener_chain(),
            geckoterminal_network: default_geckoterminal_network(),
            market_cap_decimals: default_market_cap_decimals(),
        }
    }
}

impl OracleSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Build the provider chain in configured order.
    pub fn build_oracle(&self) -> Result<PriceOracle, ConfigError> {
        let timeout = self.provider_timeout();
        let mut oracle = PriceOracle::new(timeout);
        for id in &self.providers {
            oracle = match id.to_lowercase().as_str() {
                "dexscreener" => oracle.with_provider(Arc::new(
                    DexScreenerClient::new(self.dexscreener_chain.clone(), timeout)
                        .map_err(|e| ConfigError::invalid("oracle.providers", e.to_string()))?,
                )),
                "geckoterminal" => oracle.with_provider(Arc::new(
                    GeckoTerminalClient::new(self.geckoterminal_network.clone(), timeout)
                        .map_err(|e| ConfigError::invalid("oracle.providers", e.to_string()))?,
                )),
                other => {
                    return Err(ConfigError::invalid(
                        "oracle.providers",
                        format!("unknown provider '{other}'"),
                    ))
                }
            };
        }
        Ok(oracle)
    }
}

/// Tier threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    /// Minimum market cap per tier in whole USD, tier 0 first
    #[serde(default = "default_thresholds_usd")]
    pub thresholds_usd: Vec<u64>,
}

fn default_thresholds_usd() -> Vec<u64> {
    vec![0, 5_000, 25_000, 75_000, 250_000, 1_000_000]
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            thresholds_usd: default_thresholds_usd(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            monitor: MonitorTimingConfig::default(),
            submitter: SubmitterSettings::default(),
            oracle: OracleSettings::default(),
            tiers: TierSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Create a testing profile: fast polling, low thresholds, no writes.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            monitor: MonitorTimingConfig {
                poll_interval_secs: 30,
            },
            submitter: SubmitterSettings {
                inter_submission_delay_ms: 100,
                write_timeout_secs: 60,
                confirmation_timeout_secs: 45,
                dry_run: true,
                ..Default::default()
            },
            oracle: OracleSettings {
                provider_timeout_ms: 5_000,
                ..Default::default()
            },
            tiers: TierSettings {
                thresholds_usd: vec![0, 100, 500, 1_000, 5_000, 10_000],
            },
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            monitor: MonitorTimingConfig::default(),
            submitter: SubmitterSettings {
                inter_submission_delay_ms: 1_000,
                write_timeout_secs: 180,
                confirmation_timeout_secs: 150,
                required_confirmations: 2,
                ..Default::default()
            },
            oracle: OracleSettings::default(),
            tiers: TierSettings::default(),
        }
    }

    /// Get profile from environment variable MONITOR_PROFILE, or default.
    /// Supported values: testing, production
    pub fn from_profile_name(profile: &str) -> Self {
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Resolve configuration from the process environment.
    ///
    /// `MONITOR_CONFIG` (file) wins over `MONITOR_PROFILE`; `POLL_INTERVAL_SECS`
    /// is applied on top of either. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Self::from_env`] against an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_FILE_ENV) {
            Some(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::from_profile_name(&lookup(PROFILE_ENV).unwrap_or_default()),
        };

        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            config.monitor.poll_interval_secs = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(POLL_INTERVAL_ENV, format!("'{raw}' is not a whole number"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::invalid("monitor.poll_interval_secs", "must be > 0"));
        }
        if self.submitter.individual_threshold == 0 {
            return Err(ConfigError::invalid("submitter.individual_threshold", "must be > 0"));
        }
        if self.submitter.batch_size == 0 {
            return Err(ConfigError::invalid("submitter.batch_size", "must be > 0"));
        }
        if self.submitter.ledger_max_batch_size == 0
            || self.submitter.ledger_max_batch_size > MAX_BATCH_ELEMENTS
        {
            return Err(ConfigError::invalid(
                "submitter.ledger_max_batch_size",
                format!("must be between 1 and {MAX_BATCH_ELEMENTS}"),
            ));
        }
        if self.submitter.batch_size > self.submitter.ledger_max_batch_size {
            return Err(ConfigError::invalid(
                "submitter.batch_size",
                format!(
                    "{} exceeds the ledger cap of {}",
                    self.submitter.batch_size, self.submitter.ledger_max_batch_size
                ),
            ));
        }
        if self.submitter.write_timeout_secs == 0 {
            return Err(ConfigError::invalid("submitter.write_timeout_secs", "must be > 0"));
        }
        if self.oracle.providers.is_empty() {
            return Err(ConfigError::invalid("oracle.providers", "at least one provider is required"));
        }
        self.tier_table()?;
        Ok(())
    }

    /// Validated tier table in ledger units.
    pub fn tier_table(&self) -> Result<TierThresholdTable, ConfigError> {
        TierThresholdTable::from_usd(&self.tiers.thresholds_usd, self.oracle.market_cap_decimals)
    }

    /// Runtime submitter settings.
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            individual_threshold: self.submitter.individual_threshold,
            batch_size: self.submitter.batch_size,
            inter_submission_delay: self.submitter.inter_submission_delay(),
            write_timeout: self.submitter.write_timeout(),
            dry_run: self.submitter.dry_run,
        }
    }

    /// Runtime monitor settings.
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.monitor.poll_interval(),
            market_cap_decimals: self.oracle.market_cap_decimals,
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Monitor configuration loaded");
        tracing::info!(
            poll_interval_secs = self.monitor.poll_interval_secs,
            "Cycle timing"
        );
        tracing::info!(
            individual_threshold = self.submitter.individual_threshold,
            batch_size = self.submitter.batch_size,
            ledger_max_batch_size = self.submitter.ledger_max_batch_size,
            delay_ms = self.submitter.inter_submission_delay_ms,
            write_timeout_secs = self.submitter.write_timeout_secs,
            confirmations = self.submitter.required_confirmations,
            dry_run = self.submitter.dry_run,
            "Submitter parameters"
        );
        tracing::info!(
            providers = ?self.oracle.providers,
            timeout_ms = self.oracle.provider_timeout_ms,
            decimals = self.oracle.market_cap_decimals,
            "Market data providers"
        );
        tracing::info!(thresholds_usd = ?self.tiers.thresholds_usd, "Tier thresholds");
    }
}
