//! Signing and submission of ledger writes.
//!
//! Nonce, fee and chain-id filling is left to alloy's recommended fillers.
//! The sender owns the wallet, applies explicit gas limits and bounds the
//! receipt wait so a stuck write surfaces as an error.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Configures and connects a [`TransactionSender`].
pub struct TransactionSenderBuilder {
    endpoint: String,
    expected_chain_id: u64,
    confirmation_timeout: Duration,
    required_confirmations: u64,
}

impl TransactionSenderBuilder {
    pub fn new(endpoint: impl Into<String>, expected_chain_id: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            expected_chain_id,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            required_confirmations: 1,
        }
    }

    /// Longest wait for a receipt before the write counts as failed.
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Blocks a write must be buried under (at least one).
    pub fn required_confirmations(mut self, confirmations: u64) -> Self {
        self.required_confirmations = confirmations.max(1);
        self
    }

    /// Load the key and check that the endpoint serves the expected chain.
    pub async fn build(self, private_key: &str) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("invalid private key")?;
        let address = signer.address();

        let remote = ProviderBuilder::new()
            .on_http(self.endpoint.parse().context("invalid RPC URL")?)
            .get_chain_id()
            .await
            .context("failed to query chain id")?;
        anyhow::ensure!(
            remote == self.expected_chain_id,
            "RPC endpoint serves chain {remote}, expected {}",
            self.expected_chain_id
        );

        info!(
            signer = %address,
            chain_id = remote,
            confirmations = self.required_confirmations,
            timeout_s = self.confirmation_timeout.as_secs(),
            "Ledger signer ready"
        );

        Ok(TransactionSender {
            endpoint: self.endpoint,
            wallet: EthereumWallet::from(signer),
            address,
            chain_id: remote,
            confirmation_timeout: self.confirmation_timeout,
            required_confirmations: self.required_confirmations,
        })
    }
}

/// Signs, submits and confirms ledger writes.
pub struct TransactionSender {
    endpoint: String,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    confirmation_timeout: Duration,
    required_confirmations: u64,
}

impl TransactionSender {
    /// Connect with default confirmation settings.
    pub async fn new(private_key: &str, endpoint: &str, chain_id: u64) -> Result<Self> {
        TransactionSenderBuilder::new(endpoint, chain_id)
            .build(private_key)
            .await
    }

    /// Submit a call and wait until it is confirmed.
    ///
    /// Fails on submission errors, on a missing receipt after the
    /// confirmation timeout, and on revert.
    pub async fn send_and_confirm(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<TransactionReceipt> {
        let started = Instant::now();

        let mut request = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(U256::ZERO)
            .with_chain_id(self.chain_id);
        if let Some(limit) = gas_limit {
            request = request.with_gas_limit(limit);
        }

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.endpoint.parse()?);
        let pending = provider
            .send_transaction(request)
            .await
            .context("transaction submission failed")?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, %to, ?gas_limit, "Write submitted");

        let receipt = pending
            .with_required_confirmations(self.required_confirmations)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .with_context(|| {
                format!(
                    "transaction {tx_hash} not confirmed within {:?}",
                    self.confirmation_timeout
                )
            })?;

        if !receipt.status() {
            warn!(%tx_hash, elapsed_ms = started.elapsed().as_millis(), "Write reverted");
            anyhow::bail!("transaction {tx_hash} reverted");
        }

        info!(
            %tx_hash,
            block = receipt.block_number.unwrap_or_default(),
            gas_used = receipt.gas_used,
            elapsed_ms = started.elapsed().as_millis(),
            "Write confirmed"
        );
        Ok(receipt)
    }

    /// Native balance of the signer.
    pub async fn balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.endpoint.parse()?);
        Ok(provider.get_balance(self.address).await?)
    }

    pub fn rpc_url(&self) -> &str {
        &self.endpoint
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("endpoint", &self.endpoint)
            .field("required_confirmations", &self.required_confirmations)
            .finish_non_exhaustive()
    }
}
