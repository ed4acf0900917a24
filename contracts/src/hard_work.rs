//! # Hard Work Coordination
//!
//! A harvest costs the caller gas. The vault pays it back out of its own
//! native balance when it can. When it cannot, small vaults refuse to
//! harvest at all (a keeper should not subsidize a vault that is not worth
//! compounding) while vaults above [`MIN_TVL_FOR_UNCOMPENSATED_HARDWORK`]
//! harvest anyway and leave the caller unpaid.
//!
//! ```text
//! gas_used = gas_left_before - gas_left_after
//! gas_cost = gas_used * gas_price
//! ```

use multivault_protocol::access::AccessPolicy;
use multivault_protocol::bank::AssetBank;
use multivault_protocol::config::MIN_TVL_FOR_UNCOMPENSATED_HARDWORK;
use multivault_protocol::strategy::Strategy;
use multivault_protocol::{Address, Amount, ExecutionEnv};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::VaultError;

/// Result of a compensated harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardWorkOutcome {
    pub gas_used: u64,
    pub gas_cost: Amount,
    pub compensated: bool,
}

/// Harvest authorization and gas settlement for one vault.
pub struct HardWorkCoordinator<'a> {
    vault: &'a Address,
    policy: &'a dyn AccessPolicy,
}

impl<'a> HardWorkCoordinator<'a> {
    pub fn new(vault: &'a Address, policy: &'a dyn AccessPolicy) -> Self {
        Self { vault, policy }
    }

    /// Only the platform hard worker or an operator may trigger a paid harvest.
    pub fn authorize(&self, caller: &Address) -> Result<(), VaultError> {
        if self.policy.is_hard_worker(caller) || self.policy.is_operator(caller) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized(format!(
                "{caller} is neither hard worker nor operator"
            )))
        }
    }

    /// Runs the strategy harvest and returns the gas it burned.
    pub fn harvest<S: Strategy + ?Sized>(
        strategy: &mut S,
        bank: &mut dyn AssetBank,
        env: &dyn ExecutionEnv,
    ) -> Result<u64, VaultError> {
        let gas_before = env.gas_left();
        strategy.do_hard_work(bank, env)?;
        Ok(gas_before.saturating_sub(env.gas_left()))
    }

    /// Reimburses `caller` for `gas_used`, or decides the harvest may stand
    /// unpaid. `tvl` is only evaluated when the vault cannot pay.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalanceToPayHarvestCost`] when the vault
    /// cannot pay and its TVL is below the uncompensated threshold.
    pub fn settle_gas<F>(
        &self,
        caller: &Address,
        bank: &mut dyn AssetBank,
        gas_used: u64,
        gas_price: u128,
        tvl: F,
    ) -> Result<HardWorkOutcome, VaultError>
    where
        F: FnOnce(&dyn AssetBank) -> Result<Amount, VaultError>,
    {
        let gas_cost = (gas_used as u128)
            .checked_mul(gas_price)
            .ok_or(VaultError::Overflow)?;
        let mut outcome = HardWorkOutcome {
            gas_used,
            gas_cost,
            compensated: false,
        };
        if gas_cost == 0 {
            return Ok(outcome);
        }

        let balance = bank.native_balance(self.vault);
        if balance >= gas_cost {
            bank.transfer_native(self.vault, caller, gas_cost)?;
            outcome.compensated = true;
            debug!(vault = %self.vault, %caller, gas_cost, "harvest gas reimbursed");
            return Ok(outcome);
        }

        let value = tvl(&*bank)?;
        if value < MIN_TVL_FOR_UNCOMPENSATED_HARDWORK {
            return Err(VaultError::InsufficientBalanceToPayHarvestCost {
                cost: gas_cost,
                balance,
            });
        }
        warn!(
            vault = %self.vault,
            gas_cost,
            balance,
            "vault cannot reimburse harvest gas, continuing uncompensated"
        );
        Ok(outcome)
    }
}
