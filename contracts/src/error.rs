//! # Error Taxonomy
//!
//! Every vault entry point returns [`VaultError`]; the batch harvester
//! returns [`HardWorkerError`]. Any error unwinds the whole call: the vault
//! restores its pre-call snapshot before handing the error back.
//!
//! Callers can treat the variants in three groups:
//!
//! - **Caller input** (`ZeroAmount`, `LengthMismatch`, `InsufficientBalance`,
//!   `AssetMismatch`): fix the request.
//! - **Recoverable by retrying later or with new bounds** (`TooSoon`,
//!   `SlippageExceeded`, `SharesSlippageExceeded`,
//!   `InsufficientBalanceToPayHarvestCost`, `Reentrancy`).
//! - **State-dependent refusals** (`FuseTriggered`, `CapExceeded`,
//!   `VaultNotActive`, `Unauthorized`, ...).

use multivault_protocol::access::VaultStatus;
use multivault_protocol::bank::BankError;
use multivault_protocol::math::MathError;
use multivault_protocol::oracle::OracleError;
use multivault_protocol::strategy::StrategyError;
use multivault_protocol::storage::StoreError;
use multivault_protocol::{Address, Amount, AssetId};
use thiserror::Error;

// ---------------------------------------------------------------------------
// VaultError
// ---------------------------------------------------------------------------

/// Errors raised by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The strategy reports zero value while shares are outstanding.
    /// Deposits are blocked; withdrawals fall back to raw pro-rata payouts.
    #[error("fuse triggered: strategy reports zero value with shares outstanding")]
    FuseTriggered,

    /// A withdrawal would pay less than the caller's stated minimum.
    #[error("slippage exceeded for {asset}: got {amount}, minimum {min}")]
    SlippageExceeded {
        asset: AssetId,
        amount: Amount,
        min: Amount,
    },

    /// A deposit would mint fewer shares than the caller's stated minimum.
    #[error("share slippage exceeded: would mint {minted}, minimum {min}")]
    SharesSlippageExceeded { minted: Amount, min: Amount },

    #[error("insufficient share balance: have {available}, need {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("length mismatch: {assets} assets, {amounts} amounts")]
    LengthMismatch { assets: usize, amounts: usize },

    /// The asset list does not match what the path requires.
    #[error("asset list does not match the strategy assets")]
    AssetMismatch,

    /// The withdraw cool-down has not elapsed for this account.
    #[error("withdrawal too soon: available at block {available_at}")]
    TooSoon { available_at: u64 },

    #[error("supply cap exceeded: supply would be {would_be}, cap {cap}")]
    CapExceeded { would_be: Amount, cap: Amount },

    /// The first deposit into an empty vault is priced below the bootstrap minimum.
    #[error("insufficient initial deposit: priced {value}, required {required}")]
    InsufficientInitialDeposit { value: Amount, required: Amount },

    /// The strategy accepted the deposit but reported no added value.
    #[error("deposit produced zero investment")]
    ZeroInvestment,

    /// The vault cannot reimburse the harvester and is too small to harvest for free.
    #[error("insufficient native balance to pay harvest cost: cost {cost}, balance {balance}")]
    InsufficientBalanceToPayHarvestCost { cost: Amount, balance: Amount },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("vault is not active (status {0})")]
    VaultNotActive(VaultStatus),

    /// Persisted state is bound to a different strategy than the one supplied.
    #[error("strategy mismatch: state bound to {expected}, got {got}")]
    StrategyMismatch { expected: Address, got: Address },

    /// A batch checkpoint was handed to a target that did not take it.
    #[error("checkpoint does not belong to vault {0}")]
    ForeignCheckpoint(Address),

    /// Another call is already executing against this vault.
    #[error("reentrant call rejected")]
    Reentrancy,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("custody error: {0}")]
    Bank(#[from] BankError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<MathError> for VaultError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::Overflow => VaultError::Overflow,
            MathError::DivisionByZero => VaultError::DivisionByZero,
        }
    }
}

impl VaultError {
    /// `true` for failures the caller can fix by retrying with wider bounds.
    pub fn is_slippage(&self) -> bool {
        matches!(
            self,
            VaultError::SlippageExceeded { .. } | VaultError::SharesSlippageExceeded { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// HardWorkerError
// ---------------------------------------------------------------------------

/// Errors raised by the batch harvester.
#[derive(Debug, Error)]
pub enum HardWorkerError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A vault's harvest failed; the batch stopped there.
    #[error("hard work failed on vault {vault}: {source}")]
    VaultFailed {
        vault: Address,
        #[source]
        source: VaultError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_errors_map_to_vault_variants() {
        assert!(matches!(VaultError::from(MathError::Overflow), VaultError::Overflow));
        assert!(matches!(
            VaultError::from(MathError::DivisionByZero),
            VaultError::DivisionByZero
        ));
    }

    #[test]
    fn vault_failed_names_vault_and_cause() {
        let err = HardWorkerError::VaultFailed {
            vault: Address::new("0x7a"),
            source: VaultError::InsufficientBalanceToPayHarvestCost { cost: 5, balance: 1 },
        };
        let msg = err.to_string();
        assert!(msg.contains("0x7a"));
        assert!(msg.contains("cost 5"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn slippage_classification() {
        assert!(VaultError::SharesSlippageExceeded { minted: 1, min: 2 }.is_slippage());
        assert!(!VaultError::ZeroAmount.is_slippage());
    }
}
