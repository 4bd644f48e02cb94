//! Evolution ledger interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the evolution ledger
//! - The [`EvolutionLedger`] trait and its on-chain implementation
//! - Tracked-asset registry reads with a per-cycle snapshot
//! - Transaction signing, sending and bounded confirmation

pub mod contracts;
mod ledger;
mod registry;
mod signer;

pub use ledger::{
    AdvanceOutcome, Advancement, EvolutionLedger, LedgerContract, LedgerError, TrackedAsset,
    DEFAULT_MAX_BATCH_SIZE, MAX_BATCH_ELEMENTS, MAX_BATCH_GAS,
};
pub use registry::AssetRegistry;
pub use signer::{TransactionSender, TransactionSenderBuilder};
