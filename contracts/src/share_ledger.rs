//! # Share Ledger
//!
//! Vault share balances, total supply, and the optional supply cap.
//!
//! Invariants held after every successful call:
//!
//! - `total_supply == Σ balances`
//! - `total_supply <= max_supply` whenever `max_supply != 0` and the last
//!   operation was a mint
//!
//! Every balance change stamps the touched accounts in the
//! [`WithdrawGuard`] passed alongside.

use std::collections::BTreeMap;

use multivault_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::withdraw_guard::WithdrawGuard;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: BTreeMap<Address, Amount>,
    total_supply: Amount,
    /// Zero means uncapped.
    max_supply: Amount,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn max_supply(&self) -> Amount {
        self.max_supply
    }

    /// Sets the cap. Lowering it below the current supply only blocks
    /// further mints.
    pub fn set_max_supply(&mut self, cap: Amount) {
        self.max_supply = cap;
    }

    /// Accounts with a non-zero balance, in address order.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Checks that minting `amount` more shares respects the cap.
    pub fn check_cap(&self, amount: Amount) -> Result<(), VaultError> {
        let would_be = self
            .total_supply
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        if self.max_supply != 0 && would_be > self.max_supply {
            return Err(VaultError::CapExceeded {
                would_be,
                cap: self.max_supply,
            });
        }
        Ok(())
    }

    /// Mints `amount` shares to `to`.
    ///
    /// # Errors
    ///
    /// [`VaultError::CapExceeded`] if a non-zero cap would be exceeded,
    /// [`VaultError::Overflow`] on arithmetic overflow.
    pub fn mint(
        &mut self,
        guard: &mut WithdrawGuard,
        to: &Address,
        amount: Amount,
        block: u64,
    ) -> Result<(), VaultError> {
        self.check_cap(amount)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.total_supply += amount;
        self.balances.insert(to.clone(), balance);
        guard.record(to, block);
        Ok(())
    }

    /// Burns `amount` shares held by `from`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if `from` holds fewer shares.
    pub fn burn(
        &mut self,
        guard: &mut WithdrawGuard,
        from: &Address,
        amount: Amount,
        block: u64,
    ) -> Result<(), VaultError> {
        self.debit(from, amount)?;
        self.total_supply -= amount;
        guard.record(from, block);
        Ok(())
    }

    /// Moves `amount` shares from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`VaultError::ZeroAmount`], [`VaultError::InsufficientBalance`], and
    /// [`VaultError::Unauthorized`] for transfers out of the share sink.
    pub fn transfer(
        &mut self,
        guard: &mut WithdrawGuard,
        from: &Address,
        to: &Address,
        amount: Amount,
        block: u64,
    ) -> Result<(), VaultError> {
        if from.is_dead() {
            return Err(VaultError::Unauthorized(
                "shares in the sink cannot move".into(),
            ));
        }
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        if from != to {
            let credited = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(VaultError::Overflow)?;
            self.debit(from, amount)?;
            self.balances.insert(to.clone(), credited);
        }
        guard.record(from, block);
        guard.record(to, block);
        Ok(())
    }

    fn debit(&mut self, from: &Address, amount: Amount) -> Result<(), VaultError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), remaining);
        }
        Ok(())
    }
}
