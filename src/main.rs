//! Evolution Monitor
//!
//! Periodically samples market caps for every asset tracked by the evolution
//! ledger and records new highs on-chain.
//! Features:
//! - Ordered market-data fallback (DexScreener, then GeckoTerminal)
//! - Individual or batched compare-and-advance writes
//! - Profile-based configuration with TOML override
//! - Graceful shutdown on Ctrl+C / SIGTERM

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use evolution_chain::{AssetRegistry, EvolutionLedger, LedgerContract, TransactionSenderBuilder};
use evolution_core::{ChainEnv, EvolutionMonitor, EvolutionSubmitter, MonitorConfig};

/// Environment variable names.
mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const RUN_ONCE: &str = "RUN_ONCE";
    pub const CHECK_ASSET: &str = "CHECK_ASSET";
}

const DEFAULT_LOG_FILTER: &str =
    "info,evolution_core=debug,evolution_chain=debug,evolution_api=debug";

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Use MONITOR_PROFILE to select: testing, production; MONITOR_CONFIG for a file
    let config = MonitorConfig::from_env().context("invalid monitor configuration")?;
    config.log_config();

    let chain = ChainEnv::from_env().context("invalid chain configuration")?;
    info!(
        chain_id = chain.chain_id,
        ledger = %chain.ledger_address,
        "Starting Evolution Monitor"
    );

    let monitor = Arc::new(initialize_components(&config, &chain).await?);

    if flag_set(env::RUN_ONCE) {
        info!("Running a single cycle");
        let summary = monitor.run_cycle().await?;
        info!(evolved = summary.evolved, failed = summary.failed, "Single cycle finished");
        return Ok(());
    }

    if let Ok(raw) = std::env::var(env::CHECK_ASSET) {
        let asset: Address = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {} value '{raw}'", env::CHECK_ASSET))?;
        let check = monitor.check_asset(asset).await?;
        info!(
            asset = %asset,
            tier = check.asset.current_tier,
            market_cap = check.sample.as_ref().map(|s| s.market_cap),
            evolved = check.report.as_ref().map(|r| r.evolved).unwrap_or(0),
            "Asset check finished"
        );
        return Ok(());
    }

    monitor.start();
    shutdown_signal().await;

    info!("Shutting down...");
    monitor.stop().await;
    let stats = monitor.stats();
    info!(
        cycles = stats.cycles_completed,
        aborted = stats.cycles_aborted,
        evolved = stats.total_evolved,
        failed = stats.total_failed,
        "Evolution Monitor stopped"
    );

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn initialize_components(config: &MonitorConfig, chain: &ChainEnv) -> Result<EvolutionMonitor> {
    info!("Initializing components...");

    let tiers = config.tier_table()?;
    let oracle = Arc::new(config.oracle.build_oracle()?);
    info!(providers = ?oracle.provider_ids(), "Market data oracle configured");

    // Transaction sender (verifies the endpoint serves the configured chain)
    let sender = Arc::new(
        TransactionSenderBuilder::new(&chain.rpc_url, chain.chain_id)
            .confirmation_timeout(config.submitter.confirmation_timeout())
            .required_confirmations(config.submitter.required_confirmations)
            .build(&chain.private_key)
            .await?,
    );
    match sender.balance().await {
        Ok(balance) => info!(address = %sender.address, balance_wei = %balance, "Signer balance"),
        Err(e) => warn!(error = %e, "Could not read signer balance"),
    }

    let mut contract = LedgerContract::new(chain.ledger_address, sender)
        .with_max_batch_size(config.submitter.ledger_max_batch_size);
    if let Some(read_url) = &chain.read_rpc_url {
        contract = contract.with_read_url(read_url.clone());
    }
    let ledger: Arc<dyn EvolutionLedger> = Arc::new(contract);

    let registry = Arc::new(AssetRegistry::new(ledger.clone()));
    let submitter = EvolutionSubmitter::new(ledger, config.submitter_config());

    info!("All components initialized");

    Ok(EvolutionMonitor::new(
        registry,
        oracle,
        tiers,
        submitter,
        config.monitor_settings(),
    ))
}

fn flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ╔═╗┬  ┬┌─┐┬  ┬ ┬┌┬┐┬┌─┐┌┐┌
    ║╣ └┐┌┘│ ││  │ │ │ ││ ││││
    ╚═╝ └┘ └─┘┴─┘└─┘ ┴ ┴└─┘┘└┘
    Evolution Monitor v0.1.0
    "#);
}
