// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MultiVault Contracts
//!
//! The vault engine. A vault accepts several assets, hands them to a
//! pluggable strategy, and tracks ownership with fungible shares:
//!
//! - **Share Ledger**: balances, supply, and the supply cap.
//! - **Withdraw Guard**: a block cool-down between any balance change and
//!   a withdrawal, against same-block price manipulation.
//! - **Share Math**: proportional minting, plus the first-deposit bootstrap
//!   that locks a slice of shares forever.
//! - **Hard Work**: gas-metered harvests, reimbursed from the vault.
//! - **Vault**: the orchestrator tying the above to a strategy, custody,
//!   oracles, and an access policy.
//! - **HardWorker**: the keeper-facing batch harvester.
//!
//! ## Design Principles
//!
//! 1. A call commits fully or not at all. Every mutating entry point
//!    snapshots state, strategy and custody, and restores them on error.
//! 2. Share math runs on 256-bit intermediates and never wraps.
//! 3. Collaborators are injected traits, never global lookups.
//! 4. Every public type is serializable (serde) for the API and for storage.

pub mod error;
pub mod events;
pub mod hard_work;
pub mod hard_worker;
pub mod share_ledger;
pub mod share_math;
pub mod vault;
pub mod withdraw_guard;

pub use error::{HardWorkerError, VaultError};
pub use events::VaultEvent;
pub use hard_work::HardWorkOutcome;
pub use hard_worker::{BatchReport, HardWorker, HardWorkerConfig};
pub use vault::{
    AprReport, Checkpoint, DepositPreview, DepositReceipt, HardWorkTarget, Vault, VaultConfig,
    VaultState, WithdrawPreview,
};
