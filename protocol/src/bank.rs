//! # Asset Custody
//!
//! The [`AssetBank`] trait is the vault's view of fungible-asset custody:
//! token balances per account plus the native gas currency. On an EVM host
//! this is the set of ERC-20 contracts and the account balance table; in
//! tests and on devnet it is a [`MemoryBank`].
//!
//! Every debit checks the source balance and every credit checks for
//! overflow. Wrapping arithmetic and money do not mix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, AssetId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by asset custody operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// The source account does not hold enough of the asset.
    #[error("insufficient {asset} balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        asset: String,
        account: Address,
        available: Amount,
        requested: Amount,
    },

    /// A credit would overflow the destination balance.
    #[error("balance overflow crediting {amount} of {asset} to {account}")]
    Overflow {
        asset: String,
        account: Address,
        amount: Amount,
    },
}

/// Label used for the native currency in error messages.
const NATIVE: &str = "native";

// ---------------------------------------------------------------------------
// AssetBank
// ---------------------------------------------------------------------------

/// Custody of fungible assets and native currency.
pub trait AssetBank: Send {
    /// Balance of `asset` held by `account`. Unknown pairs are zero.
    fn balance(&self, asset: &AssetId, account: &Address) -> Amount;

    /// Moves `amount` of `asset` from `from` to `to`.
    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BankError>;

    /// Native currency balance of `account`.
    fn native_balance(&self, account: &Address) -> Amount;

    /// Moves native currency from `from` to `to`.
    fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BankError>;

    /// Issues new units of `asset` to `to`. Strategies use this to realize
    /// farm rewards; devnet faucets use it to fund accounts.
    fn mint(&mut self, asset: &AssetId, to: &Address, amount: Amount) -> Result<(), BankError>;
}

// ---------------------------------------------------------------------------
// MemoryBank
// ---------------------------------------------------------------------------

/// In-memory [`AssetBank`]. Cheap to clone, which is what lets a vault
/// snapshot custody before a call and restore it on failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryBank {
    /// `asset -> (account -> balance)`.
    balances: BTreeMap<AssetId, BTreeMap<Address, Amount>>,
    /// Native currency balances.
    native: BTreeMap<Address, Amount>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits native currency out of thin air (genesis / faucet).
    pub fn fund_native(&mut self, to: &Address, amount: Amount) -> Result<(), BankError> {
        credit(&mut self.native, NATIVE, to, amount)
    }

    /// Sum of all balances of `asset`.
    pub fn total_issued(&self, asset: &AssetId) -> Amount {
        self.balances
            .get(asset)
            .map(|accounts| accounts.values().sum())
            .unwrap_or(0)
    }
}

impl AssetBank for MemoryBank {
    fn balance(&self, asset: &AssetId, account: &Address) -> Amount {
        self.balances
            .get(asset)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BankError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let accounts = self.balances.entry(asset.clone()).or_default();
        debit(accounts, asset.as_str(), from, amount)?;
        credit(accounts, asset.as_str(), to, amount)
    }

    fn native_balance(&self, account: &Address) -> Amount {
        self.native.get(account).copied().unwrap_or(0)
    }

    fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BankError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        debit(&mut self.native, NATIVE, from, amount)?;
        credit(&mut self.native, NATIVE, to, amount)
    }

    fn mint(&mut self, asset: &AssetId, to: &Address, amount: Amount) -> Result<(), BankError> {
        let accounts = self.balances.entry(asset.clone()).or_default();
        credit(accounts, asset.as_str(), to, amount)
    }
}

fn debit(
    accounts: &mut BTreeMap<Address, Amount>,
    asset: &str,
    from: &Address,
    amount: Amount,
) -> Result<(), BankError> {
    let available = accounts.get(from).copied().unwrap_or(0);
    if available < amount {
        return Err(BankError::InsufficientBalance {
            asset: asset.to_string(),
            account: from.clone(),
            available,
            requested: amount,
        });
    }
    let remaining = available - amount;
    if remaining == 0 {
        accounts.remove(from);
    } else {
        accounts.insert(from.clone(), remaining);
    }
    Ok(())
}

fn credit(
    accounts: &mut BTreeMap<Address, Amount>,
    asset: &str,
    to: &Address,
    amount: Amount,
) -> Result<(), BankError> {
    if amount == 0 {
        return Ok(());
    }
    let balance = accounts.entry(to.clone()).or_insert(0);
    *balance = balance.checked_add(amount).ok_or_else(|| BankError::Overflow {
        asset: asset.to_string(),
        account: to.clone(),
        amount,
    })?;
    Ok(())
}
