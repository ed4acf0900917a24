//! # Withdraw Guard
//!
//! Flash-loan protection. Every mint, burn and transfer stamps the accounts
//! it touches with the current block; a withdrawal is refused until
//! [`WITHDRAW_DELAY_BLOCKS`] have passed since the caller's last stamp.
//!
//! Without the cool-down, a single transaction could deposit, move the
//! strategy's pricing, and withdraw at the manipulated price.

use std::collections::BTreeMap;

use multivault_protocol::config::WITHDRAW_DELAY_BLOCKS;
use multivault_protocol::Address;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Per-account last-activity block markers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawGuard {
    last_activity: BTreeMap<Address, u64>,
}

impl WithdrawGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps `account` with `block`.
    pub fn record(&mut self, account: &Address, block: u64) {
        self.last_activity.insert(account.clone(), block);
    }

    /// Block of the last balance-affecting event on `account`, if any.
    pub fn last_activity(&self, account: &Address) -> Option<u64> {
        self.last_activity.get(account).copied()
    }

    /// First block at which `account` may withdraw.
    pub fn available_at(&self, account: &Address) -> u64 {
        self.last_activity(account)
            .map(|last| last.saturating_add(WITHDRAW_DELAY_BLOCKS))
            .unwrap_or(0)
    }

    /// Refuses the withdrawal if the cool-down has not elapsed, otherwise
    /// stamps `account` at `block`.
    ///
    /// # Errors
    ///
    /// [`VaultError::TooSoon`] with the first block at which the withdrawal
    /// would pass.
    pub fn check_and_refresh(&mut self, account: &Address, block: u64) -> Result<(), VaultError> {
        if let Some(last) = self.last_activity(account) {
            if block.saturating_sub(last) < WITHDRAW_DELAY_BLOCKS {
                return Err(VaultError::TooSoon {
                    available_at: last.saturating_add(WITHDRAW_DELAY_BLOCKS),
                });
            }
        }
        self.record(account, block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_account_passes() {
        let mut guard = WithdrawGuard::new();
        let alice = Address::new("0xa1");
        assert!(guard.check_and_refresh(&alice, 1).is_ok());
        assert_eq!(guard.last_activity(&alice), Some(1));
    }

    #[test]
    fn cool_down_is_inclusive_at_delay() {
        let mut guard = WithdrawGuard::new();
        let alice = Address::new("0xa1");
        guard.record(&alice, 100);

        let err = guard
            .check_and_refresh(&alice, 100 + WITHDRAW_DELAY_BLOCKS - 1)
            .unwrap_err();
        assert!(matches!(err, VaultError::TooSoon { available_at } if available_at == 105));
        // A refused check leaves the stamp alone.
        assert_eq!(guard.last_activity(&alice), Some(100));

        assert!(guard
            .check_and_refresh(&alice, 100 + WITHDRAW_DELAY_BLOCKS)
            .is_ok());
        assert_eq!(guard.last_activity(&alice), Some(105));
    }

    #[test]
    fn successful_check_restarts_the_window() {
        let mut guard = WithdrawGuard::new();
        let alice = Address::new("0xa1");
        guard.check_and_refresh(&alice, 10).unwrap();
        assert!(guard.check_and_refresh(&alice, 11).is_err());
        assert_eq!(guard.available_at(&alice), 15);
    }
}
