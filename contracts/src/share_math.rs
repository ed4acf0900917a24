//! # Share Minting
//!
//! How many shares a deposit is worth. One pure function,
//! [`plan_mint`], serves both `preview_deposit_assets` and the real deposit
//! so that a preview can never disagree with the execution it previews.
//!
//! ## Steady State
//!
//! ```text
//! mint = value * total_supply_before / total_value_before      (floor)
//! ```
//!
//! `value` and `total_value_before` are both in the strategy's unit, so the
//! unit cancels out.
//!
//! ## Bootstrap
//!
//! An empty vault has no share price to mint against. The first deposit is
//! priced in USD by the oracle and shares are minted at parity, except that
//! [`INITIAL_SHARES`] go to the sink forever. Those locked shares keep the
//! share price anchored if every real holder later exits.

use multivault_protocol::config::{INITIAL_SHARES, MIN_INITIAL_DEPOSIT};
use multivault_protocol::math::mul_div_down;
use multivault_protocol::Amount;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// What the vault knows about itself before the deposit lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintBasis {
    /// Shares outstanding: mint proportionally to value added.
    Proportional {
        total_supply: Amount,
        total_value: Amount,
    },
    /// No shares outstanding: mint at parity with the oracle-priced deposit.
    Bootstrap { priced_value: Amount },
}

/// Shares a deposit mints, split between the receiver and the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPlan {
    pub to_receiver: Amount,
    pub to_sink: Amount,
}

impl MintPlan {
    /// Shares added to the total supply.
    pub fn total(&self) -> Amount {
        self.to_receiver.saturating_add(self.to_sink)
    }
}

/// Computes the shares minted for a deposit worth `value` strategy units.
///
/// # Errors
///
/// - [`VaultError::InsufficientInitialDeposit`] when bootstrapping below the minimum.
/// - [`VaultError::DivisionByZero`] when shares are outstanding but the
///   strategy reports no value (callers check the fuse first).
/// - [`VaultError::Overflow`] if the quotient does not fit.
pub fn plan_mint(basis: MintBasis, value: Amount) -> Result<MintPlan, VaultError> {
    match basis {
        MintBasis::Proportional {
            total_supply,
            total_value,
        } => {
            let to_receiver = mul_div_down(value, total_supply, total_value)?;
            Ok(MintPlan {
                to_receiver,
                to_sink: 0,
            })
        }
        MintBasis::Bootstrap { priced_value } => {
            if priced_value < MIN_INITIAL_DEPOSIT {
                return Err(VaultError::InsufficientInitialDeposit {
                    value: priced_value,
                    required: MIN_INITIAL_DEPOSIT,
                });
            }
            Ok(MintPlan {
                to_receiver: priced_value - INITIAL_SHARES,
                to_sink: INITIAL_SHARES,
            })
        }
    }
}

/// Enforces the caller's minimum on the receiver's shares.
pub fn check_min_shares(plan: &MintPlan, min_shares_out: Amount) -> Result<(), VaultError> {
    if plan.to_receiver < min_shares_out {
        return Err(VaultError::SharesSlippageExceeded {
            minted: plan.to_receiver,
            min: min_shares_out,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multivault_protocol::config::PRICE_PRECISION;

    const ONE: u128 = PRICE_PRECISION;

    #[test]
    fn bootstrap_locks_initial_shares() {
        let plan = plan_mint(
            MintBasis::Bootstrap {
                priced_value: 1_000 * ONE,
            },
            20 * ONE,
        )
        .unwrap();
        assert_eq!(plan.to_sink, INITIAL_SHARES);
        assert_eq!(plan.to_receiver, 1_000 * ONE - INITIAL_SHARES);
        assert_eq!(plan.total(), 1_000 * ONE);
    }

    #[test]
    fn bootstrap_below_minimum_rejected() {
        let err = plan_mint(
            MintBasis::Bootstrap {
                priced_value: MIN_INITIAL_DEPOSIT - 1,
            },
            1,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientInitialDeposit { required, .. } if required == MIN_INITIAL_DEPOSIT
        ));
    }

    #[test]
    fn bootstrap_at_exact_minimum_accepted() {
        let plan = plan_mint(
            MintBasis::Bootstrap {
                priced_value: MIN_INITIAL_DEPOSIT,
            },
            1,
        )
        .unwrap();
        assert_eq!(plan.to_receiver, MIN_INITIAL_DEPOSIT - INITIAL_SHARES);
    }

    #[test]
    fn proportional_mint_floors() {
        let basis = MintBasis::Proportional {
            total_supply: 1_000,
            total_value: 3_000,
        };
        // 10 * 1000 / 3000 = 3.33..
        assert_eq!(plan_mint(basis, 10).unwrap().to_receiver, 3);
        assert_eq!(plan_mint(basis, 10).unwrap().to_sink, 0);
    }

    #[test]
    fn proportional_mint_is_monotonic_in_value() {
        let basis = MintBasis::Proportional {
            total_supply: 999 * ONE,
            total_value: 1_234 * ONE,
        };
        let mut prev = 0;
        for value in (0..50u128).map(|i| i * ONE / 7) {
            let minted = plan_mint(basis, value).unwrap().to_receiver;
            assert!(minted >= prev);
            prev = minted;
        }
    }

    #[test]
    fn proportional_mint_survives_large_products() {
        let basis = MintBasis::Proportional {
            total_supply: u128::MAX / 2,
            total_value: u128::MAX / 2,
        };
        assert_eq!(plan_mint(basis, u128::MAX / 4).unwrap().to_receiver, u128::MAX / 4);
    }

    #[test]
    fn min_shares_enforced() {
        let plan = MintPlan {
            to_receiver: 10,
            to_sink: 0,
        };
        assert!(check_min_shares(&plan, 10).is_ok());
        assert!(matches!(
            check_min_shares(&plan, 11),
            Err(VaultError::SharesSlippageExceeded { minted: 10, min: 11 })
        ));
    }
}
