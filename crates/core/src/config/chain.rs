//! Chain connection settings from the environment.

use alloy::primitives::Address;

use crate::error::ConfigError;

pub const RPC_URL_ENV: &str = "RPC_URL";
pub const READ_RPC_URL_ENV: &str = "READ_RPC_URL";
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const LEDGER_ADDRESS_ENV: &str = "LEDGER_ADDRESS";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";

/// Base mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 8453;

/// Endpoint, signer key and ledger address.
#[derive(Clone)]
pub struct ChainEnv {
    /// RPC endpoint used for writes
    pub rpc_url: String,
    /// Optional separate endpoint for reads
    pub read_rpc_url: Option<String>,
    /// Signer private key (hex, optional 0x prefix)
    pub private_key: String,
    /// Evolution ledger contract
    pub ledger_address: Address,
    /// Expected chain id
    pub chain_id: u64,
}

impl ChainEnv {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        let rpc_url = required(RPC_URL_ENV)?;
        let private_key = required(PRIVATE_KEY_ENV)?;
        let raw_ledger = required(LEDGER_ADDRESS_ENV)?;
        let ledger_address: Address = raw_ledger
            .parse()
            .map_err(|_| ConfigError::invalid(LEDGER_ADDRESS_ENV, format!("'{raw_ledger}' is not an address")))?;
        if ledger_address.is_zero() {
            return Err(ConfigError::invalid(LEDGER_ADDRESS_ENV, "zero address"));
        }

        let chain_id = match lookup(CHAIN_ID_ENV).map(|v| v.trim().to_string()) {
            Some(raw) if !raw.is_empty() => raw
                .parse()
                .map_err(|_| ConfigError::invalid(CHAIN_ID_ENV, format!("'{raw}' is not a chain id")))?,
            _ => DEFAULT_CHAIN_ID,
        };

        let read_rpc_url = lookup(READ_RPC_URL_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            rpc_url,
            read_rpc_url,
            private_key,
            ledger_address,
            chain_id,
        })
    }
}

impl std::fmt::Debug for ChainEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEnv")
            .field("rpc_url", &self.rpc_url)
            .field("read_rpc_url", &self.read_rpc_url)
            .field("private_key", &"<redacted>")
            .field("ledger_address", &self.ledger_address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
