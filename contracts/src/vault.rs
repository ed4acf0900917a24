//! # Vault
//!
//! The orchestrator. A vault takes deposits of several assets, hands them to
//! its strategy, mints shares against the value added, and pays withdrawals
//! out of the strategy in proportion to the shares burned.
//!
//! ## Lifecycle of a Call
//!
//! 1. The call takes the vault lock. A call re-entering the same vault from
//!    inside a collaborator is refused with [`VaultError::Reentrancy`];
//!    calls from other threads wait their turn.
//! 2. State, strategy and custody are snapshotted.
//! 3. The operation runs. On any error the snapshot is restored, so a call
//!    either commits fully or leaves no trace.
//!
//! ## Fuse
//!
//! `total_supply > 0 && strategy.total() == 0` means the strategy has
//! detected a loss it cannot value. Deposits are refused and withdrawals
//! pay each holder their pro-rata slice of whatever raw balances remain.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use multivault_protocol::access::AccessPolicy;
use multivault_protocol::bank::AssetBank;
use multivault_protocol::config::{
    MIN_HARDWORK_DELAY_SECS, PRICE_PRECISION, VAULT_SCHEMA_VERSION,
};
use multivault_protocol::math::mul_div_down;
use multivault_protocol::oracle::{AprOracle, PriceOracle};
use multivault_protocol::storage::VaultStore;
use multivault_protocol::strategy::Strategy;
use multivault_protocol::{Address, Amount, AssetId, ExecutionEnv};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VaultError;
use crate::events::{EventJournal, VaultEvent};
use crate::hard_work::{HardWorkCoordinator, HardWorkOutcome};
use crate::share_ledger::ShareLedger;
use crate::share_math::{check_min_shares, plan_mint, MintBasis, MintPlan};
use crate::withdraw_guard::WithdrawGuard;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identity of a vault, fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub address: Address,
    pub name: String,
    pub symbol: String,
}

/// The durable part of a vault. Everything here round-trips through
/// [`VaultStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub schema_version: u16,
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub strategy_id: Address,
    pub ledger: ShareLedger,
    pub guard: WithdrawGuard,
    pub do_hard_work_on_deposit: bool,
    pub events: EventJournal,
}

impl VaultState {
    fn new(config: VaultConfig, strategy_id: Address) -> Self {
        Self {
            schema_version: VAULT_SCHEMA_VERSION,
            address: config.address,
            name: config.name,
            symbol: config.symbol,
            strategy_id,
            ledger: ShareLedger::new(),
            guard: WithdrawGuard::new(),
            do_hard_work_on_deposit: true,
            events: EventJournal::default(),
        }
    }
}

/// Result of a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub amounts_consumed: Vec<Amount>,
    pub shares_minted: Amount,
    pub value: Amount,
}

/// Result of [`Vault::preview_deposit_assets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPreview {
    pub amounts_consumed: Vec<Amount>,
    pub shares_out: Amount,
    pub value_out: Amount,
}

/// Result of [`Vault::preview_withdraw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawPreview {
    /// Strategy value the shares redeem. Zero while the fuse is triggered.
    pub value: Amount,
    /// Estimated payout per strategy asset, from current raw balances.
    pub amounts: Vec<Amount>,
    pub fuse: bool,
}

/// Output of [`Vault::get_apr`]. 1e18 = 100%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AprReport {
    pub total_apr: u128,
    pub strategy_apr: u128,
    /// Raw APR of each strategy asset, unweighted.
    pub asset_aprs: Vec<u128>,
}

/// Opaque copy of a target's books, taken by [`HardWorkTarget::checkpoint`].
pub type Checkpoint = Box<dyn Any + Send>;

/// Anything the batch harvester can harvest.
pub trait HardWorkTarget: Send + Sync {
    fn address(&self) -> &Address;

    fn do_hard_work(
        &self,
        caller: &Address,
        env: &dyn ExecutionEnv,
    ) -> Result<HardWorkOutcome, VaultError>;

    /// Copies the target's books so a later failure in the same batch can
    /// put them back.
    fn checkpoint(&self) -> Result<Checkpoint, VaultError>;

    /// Puts back books taken by [`HardWorkTarget::checkpoint`] on this
    /// target.
    ///
    /// # Errors
    ///
    /// [`VaultError::ForeignCheckpoint`] if the checkpoint came from a
    /// different kind of target.
    fn restore(&self, checkpoint: Checkpoint) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Inner<S, B> {
    state: VaultState,
    strategy: S,
    bank: B,
}

/// A multi-asset vault over strategy `S` with custody in `B`.
///
/// `S` and `B` are owned value handles; `Clone` is how the vault snapshots
/// them before a call.
pub struct Vault<S, B> {
    address: Address,
    inner: ReentrantMutex<RefCell<Inner<S, B>>>,
    policy: Arc<dyn AccessPolicy>,
    price_oracle: Arc<dyn PriceOracle>,
    apr_oracle: Option<Arc<dyn AprOracle>>,
}

impl<S, B> Vault<S, B>
where
    S: Strategy + Clone,
    B: AssetBank + Clone,
{
    /// Creates an empty vault bound to `strategy`.
    pub fn new(
        config: VaultConfig,
        strategy: S,
        bank: B,
        policy: Arc<dyn AccessPolicy>,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let state = VaultState::new(config, strategy.id().clone());
        Self::assemble(state, strategy, bank, policy, price_oracle)
    }

    /// Rebuilds a vault from persisted state.
    ///
    /// # Errors
    ///
    /// [`VaultError::StrategyMismatch`] if `strategy` is not the one the
    /// state was created with.
    pub fn from_state(
        state: VaultState,
        strategy: S,
        bank: B,
        policy: Arc<dyn AccessPolicy>,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, VaultError> {
        if &state.strategy_id != strategy.id() {
            return Err(VaultError::StrategyMismatch {
                expected: state.strategy_id,
                got: strategy.id().clone(),
            });
        }
        Ok(Self::assemble(state, strategy, bank, policy, price_oracle))
    }

    /// Loads a vault from `store`. `Ok(None)` if it was never saved.
    pub fn load(
        store: &VaultStore,
        address: &Address,
        strategy: S,
        bank: B,
        policy: Arc<dyn AccessPolicy>,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Result<Option<Self>, VaultError> {
        match store.get_vault::<VaultState>(address)? {
            Some(state) => Self::from_state(state, strategy, bank, policy, price_oracle).map(Some),
            None => Ok(None),
        }
    }

    fn assemble(
        state: VaultState,
        strategy: S,
        bank: B,
        policy: Arc<dyn AccessPolicy>,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            address: state.address.clone(),
            inner: ReentrantMutex::new(RefCell::new(Inner {
                state,
                strategy,
                bank,
            })),
            policy,
            price_oracle,
            apr_oracle: None,
        }
    }

    /// Attaches an APR oracle for [`Vault::get_apr`].
    pub fn with_apr_oracle(mut self, oracle: Arc<dyn AprOracle>) -> Self {
        self.apr_oracle = Some(oracle);
        self
    }

    // -- Call plumbing ------------------------------------------------------

    /// Runs a mutating operation with snapshot-and-restore semantics.
    fn transact<R>(
        &self,
        op: impl FnOnce(&mut Inner<S, B>) -> Result<R, VaultError>,
    ) -> Result<R, VaultError> {
        let lock = self.inner.lock();
        let mut inner = lock.try_borrow_mut().map_err(|_| VaultError::Reentrancy)?;
        let snapshot = inner.clone();
        match op(&mut inner) {
            Ok(out) => Ok(out),
            Err(err) => {
                *inner = snapshot;
                debug!(vault = %self.address, error = %err, "call reverted");
                Err(err)
            }
        }
    }

    fn view<R>(
        &self,
        op: impl FnOnce(&Inner<S, B>) -> Result<R, VaultError>,
    ) -> Result<R, VaultError> {
        let lock = self.inner.lock();
        let inner = lock.try_borrow().map_err(|_| VaultError::Reentrancy)?;
        op(&inner)
    }

    // -- Deposits -----------------------------------------------------------

    /// Deposits up to `amounts_max` of `assets` from `caller` and mints
    /// shares to `receiver` (the caller if `None`).
    ///
    /// # Errors
    ///
    /// Input errors (`LengthMismatch`, `ZeroAmount`), registry gating
    /// (`VaultNotActive`), `FuseTriggered`, `ZeroInvestment`,
    /// `InsufficientInitialDeposit`, `SharesSlippageExceeded`,
    /// `CapExceeded`, and anything custody or the strategy raise.
    pub fn deposit_assets(
        &self,
        caller: &Address,
        assets: &[AssetId],
        amounts_max: &[Amount],
        min_shares_out: Amount,
        receiver: Option<&Address>,
        env: &dyn ExecutionEnv,
    ) -> Result<DepositReceipt, VaultError> {
        let status = self.policy.vault_status(&self.address);
        if !status.allows_deposits() {
            return Err(VaultError::VaultNotActive(status));
        }
        check_lengths(assets, amounts_max)?;
        let receiver = receiver.unwrap_or(caller);
        let block = env.block_number();

        self.transact(|inner| {
            if inner.state.do_hard_work_on_deposit
                && env.timestamp()
                    > inner
                        .strategy
                        .last_hard_work()
                        .saturating_add(MIN_HARDWORK_DELAY_SECS)
            {
                HardWorkCoordinator::harvest(&mut inner.strategy, &mut inner.bank, env)?;
                debug!(vault = %self.address, "harvested before deposit");
            }

            let total_supply = inner.state.ledger.total_supply();
            let total_value = inner.strategy.total(&inner.bank);
            if total_supply > 0 && total_value == 0 {
                return Err(VaultError::FuseTriggered);
            }

            let strategy_id = inner.strategy.id().clone();
            let (amounts_consumed, basket, value) =
                if is_underlying(&inner.strategy, assets) {
                    let amount = amounts_max[0];
                    inner
                        .bank
                        .transfer(&assets[0], caller, &strategy_id, amount)?;
                    let basket = inner.strategy.deposit_underlying(&mut inner.bank, amount)?;
                    (vec![amount], basket, amount)
                } else {
                    let preview =
                        inner
                            .strategy
                            .preview_deposit_assets(&inner.bank, assets, amounts_max)?;
                    for (asset, amount) in assets.iter().zip(&preview.amounts_consumed) {
                        inner.bank.transfer(asset, caller, &strategy_id, *amount)?;
                    }
                    let value = inner
                        .strategy
                        .deposit_assets(&mut inner.bank, &preview.amounts_consumed)?;
                    (preview.amounts_consumed.clone(), preview.amounts_consumed, value)
                };
            if value == 0 {
                return Err(VaultError::ZeroInvestment);
            }

            let basis = self.mint_basis(&inner.strategy, total_supply, total_value, &basket)?;
            let plan = plan_mint(basis, value)?;
            check_min_shares(&plan, min_shares_out)?;
            mint_plan(&mut inner.state, receiver, &plan, block)?;

            inner.state.events.push(VaultEvent::DepositAssets {
                account: receiver.clone(),
                assets: assets.to_vec(),
                amounts: amounts_consumed.clone(),
                minted: plan.to_receiver,
            });
            info!(
                vault = %self.address,
                %caller,
                %receiver,
                value,
                minted = plan.to_receiver,
                bootstrap = plan.to_sink > 0,
                "deposit"
            );

            Ok(DepositReceipt {
                amounts_consumed,
                shares_minted: plan.to_receiver,
                value,
            })
        })
    }

    /// What [`Vault::deposit_assets`] would consume and mint right now.
    ///
    /// Does not run the pre-deposit harvest, so the estimate can drift from
    /// the real deposit by whatever that harvest compounds.
    pub fn preview_deposit_assets(
        &self,
        assets: &[AssetId],
        amounts_max: &[Amount],
    ) -> Result<DepositPreview, VaultError> {
        check_lengths(assets, amounts_max)?;
        self.view(|inner| {
            let total_supply = inner.state.ledger.total_supply();
            let total_value = inner.strategy.total(&inner.bank);
            if total_supply > 0 && total_value == 0 {
                return Err(VaultError::FuseTriggered);
            }

            let (amounts_consumed, basket, value) = if is_underlying(&inner.strategy, assets) {
                // Dry-run the underlying conversion on scratch copies.
                let amount = amounts_max[0];
                let mut strategy = inner.strategy.clone();
                let mut bank = inner.bank.clone();
                let strategy_id = strategy.id().clone();
                bank.mint(&assets[0], &strategy_id, amount)?;
                let basket = strategy.deposit_underlying(&mut bank, amount)?;
                (vec![amount], basket, amount)
            } else {
                let preview =
                    inner
                        .strategy
                        .preview_deposit_assets(&inner.bank, assets, amounts_max)?;
                (
                    preview.amounts_consumed.clone(),
                    preview.amounts_consumed,
                    preview.value,
                )
            };

            let shares_out = if value == 0 {
                0
            } else {
                let basis = self.mint_basis(&inner.strategy, total_supply, total_value, &basket)?;
                plan_mint(basis, value)?.to_receiver
            };
            Ok(DepositPreview {
                amounts_consumed,
                shares_out,
                value_out: value,
            })
        })
    }

    fn mint_basis(
        &self,
        strategy: &S,
        total_supply: Amount,
        total_value: Amount,
        basket: &[Amount],
    ) -> Result<MintBasis, VaultError> {
        if total_supply > 0 {
            return Ok(MintBasis::Proportional {
                total_supply,
                total_value,
            });
        }
        let priced = self
            .price_oracle
            .get_assets_price(&strategy.assets(), basket)?;
        Ok(MintBasis::Bootstrap {
            priced_value: priced.total,
        })
    }

    // -- Withdrawals --------------------------------------------------------

    /// Burns `shares` from `caller` and pays the redeemed assets to
    /// `receiver` (the caller if `None`). Returns the amounts paid.
    ///
    /// # Errors
    ///
    /// `ZeroAmount`, `InsufficientBalance`, `LengthMismatch`, `TooSoon`,
    /// `AssetMismatch` (fuse mode), `SlippageExceeded`, and anything custody
    /// or the strategy raise.
    pub fn withdraw_assets(
        &self,
        caller: &Address,
        assets: &[AssetId],
        shares: Amount,
        min_amounts_out: &[Amount],
        receiver: Option<&Address>,
        env: &dyn ExecutionEnv,
    ) -> Result<Vec<Amount>, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        check_lengths(assets, min_amounts_out)?;
        let receiver = receiver.unwrap_or(caller);
        self.transact(|inner| {
            self.withdraw_locked(inner, caller, assets, shares, min_amounts_out, receiver, env)
        })
    }

    /// Redeems the caller's entire share balance to the caller.
    pub fn withdraw_all(
        &self,
        caller: &Address,
        assets: &[AssetId],
        min_amounts_out: &[Amount],
        env: &dyn ExecutionEnv,
    ) -> Result<Vec<Amount>, VaultError> {
        check_lengths(assets, min_amounts_out)?;
        self.transact(|inner| {
            let shares = inner.state.ledger.balance_of(caller);
            if shares == 0 {
                return Err(VaultError::ZeroAmount);
            }
            self.withdraw_locked(inner, caller, assets, shares, min_amounts_out, caller, env)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw_locked(
        &self,
        inner: &mut Inner<S, B>,
        caller: &Address,
        assets: &[AssetId],
        shares: Amount,
        min_amounts_out: &[Amount],
        receiver: &Address,
        env: &dyn ExecutionEnv,
    ) -> Result<Vec<Amount>, VaultError> {
        if caller.is_dead() {
            return Err(VaultError::Unauthorized(
                "shares in the sink cannot be redeemed".into(),
            ));
        }
        let available = inner.state.ledger.balance_of(caller);
        if available < shares {
            return Err(VaultError::InsufficientBalance {
                available,
                requested: shares,
            });
        }
        let block = env.block_number();
        inner.state.guard.check_and_refresh(caller, block)?;

        // Pre-burn supply; the burn happens last, under this same lock.
        let total_supply = inner.state.ledger.total_supply();
        let total_value = inner.strategy.total(&inner.bank);
        let underlying = is_underlying(&inner.strategy, assets);
        let fuse = total_value == 0;

        let amounts = if !fuse {
            let value = mul_div_down(shares, total_value, total_supply)?;
            if underlying {
                inner
                    .strategy
                    .withdraw_underlying(&mut inner.bank, value, receiver)?;
                vec![value]
            } else {
                inner
                    .strategy
                    .withdraw_assets(&mut inner.bank, assets, value, receiver)?
            }
        } else if underlying {
            let held = inner.bank.balance(&assets[0], inner.strategy.id());
            let amount = mul_div_down(held, shares, total_supply)?;
            inner
                .strategy
                .withdraw_underlying(&mut inner.bank, amount, receiver)?;
            vec![amount]
        } else {
            if assets != inner.strategy.assets().as_slice() {
                return Err(VaultError::AssetMismatch);
            }
            let amounts = inner
                .strategy
                .assets_amounts(&inner.bank)
                .into_iter()
                .map(|raw| mul_div_down(raw, shares, total_supply))
                .collect::<Result<Vec<_>, _>>()?;
            inner
                .strategy
                .transfer_assets(&mut inner.bank, &amounts, receiver)?;
            amounts
        };

        for ((asset, amount), min) in assets.iter().zip(&amounts).zip(min_amounts_out) {
            if amount < min {
                return Err(VaultError::SlippageExceeded {
                    asset: asset.clone(),
                    amount: *amount,
                    min: *min,
                });
            }
        }

        let state = &mut inner.state;
        state.ledger.burn(&mut state.guard, caller, shares, block)?;
        state.events.push(VaultEvent::WithdrawAssets {
            sender: caller.clone(),
            receiver: receiver.clone(),
            assets: assets.to_vec(),
            shares,
            amounts: amounts.clone(),
        });
        info!(vault = %self.address, %caller, %receiver, shares, fuse, "withdraw");
        Ok(amounts)
    }

    /// Estimated payout for redeeming `shares` right now.
    pub fn preview_withdraw(&self, shares: Amount) -> Result<WithdrawPreview, VaultError> {
        self.view(|inner| {
            let total_supply = inner.state.ledger.total_supply();
            let raw = inner.strategy.assets_amounts(&inner.bank);
            if total_supply == 0 {
                return Ok(WithdrawPreview {
                    value: 0,
                    amounts: vec![0; raw.len()],
                    fuse: false,
                });
            }
            let total_value = inner.strategy.total(&inner.bank);
            let shares = shares.min(total_supply);
            let amounts = raw
                .into_iter()
                .map(|held| mul_div_down(held, shares, total_supply))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(WithdrawPreview {
                value: mul_div_down(shares, total_value, total_supply)?,
                amounts,
                fuse: total_value == 0,
            })
        })
    }

    // -- Hard work ----------------------------------------------------------

    /// Harvests the strategy and reimburses `caller`'s gas from the vault's
    /// native balance.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the caller is the platform hard worker or an
    /// operator; `InsufficientBalanceToPayHarvestCost` when the vault can
    /// neither pay nor justify an unpaid harvest.
    pub fn do_hard_work(
        &self,
        caller: &Address,
        env: &dyn ExecutionEnv,
    ) -> Result<HardWorkOutcome, VaultError> {
        let coordinator = HardWorkCoordinator::new(&self.address, self.policy.as_ref());
        coordinator.authorize(caller)?;

        self.transact(|inner| {
            let Inner {
                state,
                strategy,
                bank,
            } = inner;
            let gas_used = HardWorkCoordinator::harvest(strategy, bank, env)?;
            let oracle = self.price_oracle.as_ref();
            let outcome = coordinator.settle_gas(caller, bank, gas_used, env.gas_price(), |bank| {
                tvl_of(&*strategy, bank, oracle).map(|(value, _)| value)
            })?;

            state.events.push(VaultEvent::HardWorkGas {
                gas_used: outcome.gas_used,
                gas_cost: outcome.gas_cost,
                compensated: outcome.compensated,
            });
            info!(
                vault = %self.address,
                %caller,
                gas_used = outcome.gas_used,
                gas_cost = outcome.gas_cost,
                compensated = outcome.compensated,
                "hard work"
            );
            Ok(outcome)
        })
    }

    // -- Governance ---------------------------------------------------------

    fn authorize_governance(&self, caller: &Address) -> Result<(), VaultError> {
        if self.policy.is_governance(caller) || self.policy.is_operator(caller) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized(format!(
                "{caller} is neither governance nor operator"
            )))
        }
    }

    /// Sets the share supply cap. Zero removes it.
    pub fn set_max_supply(&self, caller: &Address, max_supply: Amount) -> Result<(), VaultError> {
        self.authorize_governance(caller)?;
        self.transact(|inner| {
            inner.state.ledger.set_max_supply(max_supply);
            inner
                .state
                .events
                .push(VaultEvent::MaxSupplyChanged { max_supply });
            info!(vault = %self.address, max_supply, "max supply changed");
            Ok(())
        })
    }

    pub fn set_do_hard_work_on_deposit(
        &self,
        caller: &Address,
        enabled: bool,
    ) -> Result<(), VaultError> {
        self.authorize_governance(caller)?;
        self.transact(|inner| {
            inner.state.do_hard_work_on_deposit = enabled;
            inner
                .state
                .events
                .push(VaultEvent::DoHardWorkOnDepositChanged { enabled });
            info!(vault = %self.address, enabled, "hard work on deposit toggled");
            Ok(())
        })
    }

    // -- Shares -------------------------------------------------------------

    /// Moves `amount` shares from `caller` to `to`. Both accounts restart
    /// their withdraw cool-down.
    pub fn transfer(
        &self,
        caller: &Address,
        to: &Address,
        amount: Amount,
        env: &dyn ExecutionEnv,
    ) -> Result<(), VaultError> {
        let block = env.block_number();
        self.transact(|inner| {
            let state = &mut inner.state;
            state
                .ledger
                .transfer(&mut state.guard, caller, to, amount, block)?;
            state.events.push(VaultEvent::Transfer {
                from: caller.clone(),
                to: to.clone(),
                amount,
            });
            Ok(())
        })
    }

    // -- Queries ------------------------------------------------------------

    /// USD value of the strategy's raw holdings, and whether every price
    /// feed was trusted.
    pub fn tvl(&self) -> Result<(Amount, bool), VaultError> {
        self.view(|inner| tvl_of(&inner.strategy, &inner.bank, self.price_oracle.as_ref()))
    }

    /// USD value of one share (1e18 = $1). `(0, false)` while no shares exist.
    pub fn price(&self) -> Result<(Amount, bool), VaultError> {
        self.view(|inner| {
            let total_supply = inner.state.ledger.total_supply();
            if total_supply == 0 {
                return Ok((0, false));
            }
            let (tvl, trusted) =
                tvl_of(&inner.strategy, &inner.bank, self.price_oracle.as_ref())?;
            Ok((mul_div_down(tvl, PRICE_PRECISION, total_supply)?, trusted))
        })
    }

    /// Strategy APR plus the yield its assets earn on their own, weighted
    /// by the strategy's current asset proportions.
    pub fn get_apr(&self) -> Result<AprReport, VaultError> {
        self.view(|inner| {
            let strategy_apr = inner.strategy.last_apr();
            let proportions = inner.strategy.get_assets_proportions(&inner.bank);
            let mut total_apr = strategy_apr;
            let mut asset_aprs = Vec::new();
            for (asset, proportion) in inner.strategy.assets().iter().zip(&proportions) {
                let apr = self
                    .apr_oracle
                    .as_ref()
                    .map(|oracle| oracle.asset_apr(asset))
                    .unwrap_or(0);
                let weighted = mul_div_down(apr, *proportion, PRICE_PRECISION)?;
                total_apr = total_apr.checked_add(weighted).ok_or(VaultError::Overflow)?;
                asset_aprs.push(apr);
            }
            Ok(AprReport {
                total_apr,
                strategy_apr,
                asset_aprs,
            })
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn balance_of(&self, account: &Address) -> Result<Amount, VaultError> {
        self.view(|inner| Ok(inner.state.ledger.balance_of(account)))
    }

    pub fn total_supply(&self) -> Result<Amount, VaultError> {
        self.view(|inner| Ok(inner.state.ledger.total_supply()))
    }

    pub fn max_supply(&self) -> Result<Amount, VaultError> {
        self.view(|inner| Ok(inner.state.ledger.max_supply()))
    }

    pub fn do_hard_work_on_deposit(&self) -> Result<bool, VaultError> {
        self.view(|inner| Ok(inner.state.do_hard_work_on_deposit))
    }

    /// Block of the last balance-affecting event on `account`.
    pub fn last_activity(&self, account: &Address) -> Result<Option<u64>, VaultError> {
        self.view(|inner| Ok(inner.state.guard.last_activity(account)))
    }

    /// The strategy's asset list, in deposit order.
    pub fn assets(&self) -> Result<Vec<AssetId>, VaultError> {
        self.view(|inner| Ok(inner.strategy.assets()))
    }

    pub fn underlying(&self) -> Result<Option<AssetId>, VaultError> {
        self.view(|inner| Ok(inner.strategy.underlying()))
    }

    /// Full copy of the durable state.
    pub fn state(&self) -> Result<VaultState, VaultError> {
        self.view(|inner| Ok(inner.state.clone()))
    }

    /// Drains the event journal, oldest first.
    pub fn take_events(&self) -> Result<Vec<VaultEvent>, VaultError> {
        let lock = self.inner.lock();
        let mut inner = lock.try_borrow_mut().map_err(|_| VaultError::Reentrancy)?;
        Ok(inner.state.events.drain())
    }

    // -- Host access --------------------------------------------------------

    /// Persists the durable state to `store`.
    pub fn save(&self, store: &VaultStore) -> Result<(), VaultError> {
        let state = self.state()?;
        store.put_vault(&self.address, &state)?;
        Ok(())
    }

    /// Read access to custody. For hosts and tests.
    pub fn with_bank<R>(&self, f: impl FnOnce(&B) -> R) -> Result<R, VaultError> {
        self.view(|inner| Ok(f(&inner.bank)))
    }

    /// Direct custody mutation outside any vault call (faucets, gas top-ups).
    pub fn with_bank_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, VaultError> {
        let lock = self.inner.lock();
        let mut inner = lock.try_borrow_mut().map_err(|_| VaultError::Reentrancy)?;
        Ok(f(&mut inner.bank))
    }

    /// Direct strategy access outside any vault call (reward accrual,
    /// operational controls).
    pub fn with_strategy_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, VaultError> {
        let lock = self.inner.lock();
        let mut inner = lock.try_borrow_mut().map_err(|_| VaultError::Reentrancy)?;
        Ok(f(&mut inner.strategy))
    }
}

impl<S, B> HardWorkTarget for Vault<S, B>
where
    S: Strategy + Clone + 'static,
    B: AssetBank + Clone + 'static,
{
    fn address(&self) -> &Address {
        &self.address
    }

    fn do_hard_work(
        &self,
        caller: &Address,
        env: &dyn ExecutionEnv,
    ) -> Result<HardWorkOutcome, VaultError> {
        Vault::do_hard_work(self, caller, env)
    }

    fn checkpoint(&self) -> Result<Checkpoint, VaultError> {
        self.view(|inner| Ok(Box::new(inner.clone()) as Checkpoint))
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), VaultError> {
        let books = checkpoint
            .downcast::<Inner<S, B>>()
            .map_err(|_| VaultError::ForeignCheckpoint(self.address.clone()))?;
        let lock = self.inner.lock();
        let mut inner = lock.try_borrow_mut().map_err(|_| VaultError::Reentrancy)?;
        *inner = *books;
        debug!(vault = %self.address, "books restored from checkpoint");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_lengths(assets: &[AssetId], amounts: &[Amount]) -> Result<(), VaultError> {
    if assets.len() != amounts.len() {
        return Err(VaultError::LengthMismatch {
            assets: assets.len(),
            amounts: amounts.len(),
        });
    }
    if assets.is_empty() {
        return Err(VaultError::ZeroAmount);
    }
    Ok(())
}

/// `true` when `assets` is exactly the strategy's underlying.
fn is_underlying<S: Strategy + ?Sized>(strategy: &S, assets: &[AssetId]) -> bool {
    assets.len() == 1 && strategy.underlying().as_ref() == Some(&assets[0])
}

fn tvl_of<S: Strategy + ?Sized>(
    strategy: &S,
    bank: &dyn AssetBank,
    oracle: &dyn PriceOracle,
) -> Result<(Amount, bool), VaultError> {
    let priced = oracle.get_assets_price(&strategy.assets(), &strategy.assets_amounts(bank))?;
    Ok((priced.total, priced.trusted))
}

fn mint_plan(
    state: &mut VaultState,
    receiver: &Address,
    plan: &MintPlan,
    block: u64,
) -> Result<(), VaultError> {
    state.ledger.check_cap(plan.total())?;
    if plan.to_sink > 0 {
        state
            .ledger
            .mint(&mut state.guard, &Address::dead(), plan.to_sink, block)?;
    }
    state
        .ledger
        .mint(&mut state.guard, receiver, plan.to_receiver, block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multivault_protocol::access::{StaticAccessPolicy, VaultStatus};
    use multivault_protocol::bank::MemoryBank;
    use multivault_protocol::config::INITIAL_SHARES;
    use multivault_protocol::sim::{FixedPriceOracle, SimEnv, SimStrategy};

    const ONE: u128 = PRICE_PRECISION;

    struct Fixture {
        vault: Vault<SimStrategy, MemoryBank>,
        policy: Arc<StaticAccessPolicy>,
        assets: Vec<AssetId>,
        alice: Address,
        env: SimEnv,
    }

    fn fixture() -> Fixture {
        let assets = vec![Address::new("0xa0"), Address::new("0xb0")];
        let alice = Address::new("0xa1");
        let strategy = SimStrategy::new(Address::new("0x5e"), assets.clone(), vec![ONE, ONE])
            .with_last_hard_work(1_700_000_000);
        let mut bank = MemoryBank::new();
        for asset in &assets {
            bank.mint(asset, &alice, 1_000 * ONE).unwrap();
        }
        let policy = Arc::new(StaticAccessPolicy::with_roles(
            Address::new("0x60"),
            Address::new("0x77"),
        ));
        let oracle = Arc::new(FixedPriceOracle::with_prices(
            assets.iter().cloned().map(|a| (a, 50 * ONE)),
        ));
        let vault = Vault::new(
            VaultConfig {
                address: Address::new("0x7a"),
                name: "Test Vault".into(),
                symbol: "TV".into(),
            },
            strategy,
            bank,
            policy.clone(),
            oracle,
        );
        Fixture {
            vault,
            policy,
            assets,
            alice,
            env: SimEnv::default(),
        }
    }

    #[test]
    fn first_deposit_bootstraps_at_oracle_price() {
        let f = fixture();
        let receipt = f
            .vault
            .deposit_assets(&f.alice, &f.assets, &[10 * ONE, 10 * ONE], 0, None, &f.env)
            .unwrap();

        // 20 tokens at $50 each.
        assert_eq!(receipt.shares_minted, 1_000 * ONE - INITIAL_SHARES);
        assert_eq!(f.vault.total_supply().unwrap(), 1_000 * ONE);
        assert_eq!(f.vault.balance_of(&Address::dead()).unwrap(), INITIAL_SHARES);
        assert_eq!(f.vault.last_activity(&f.alice).unwrap(), Some(f.env.block_number()));
    }

    #[test]
    fn status_gates_deposits_only() {
        let f = fixture();
        f.vault
            .deposit_assets(&f.alice, &f.assets, &[10 * ONE, 10 * ONE], 0, None, &f.env)
            .unwrap();
        f.policy
            .set_vault_status(f.vault.address().clone(), VaultStatus::Deprecated);

        assert!(matches!(
            f.vault
                .deposit_assets(&f.alice, &f.assets, &[ONE, ONE], 0, None, &f.env),
            Err(VaultError::VaultNotActive(VaultStatus::Deprecated))
        ));
        f.env.advance_blocks(5);
        assert!(f
            .vault
            .withdraw_all(&f.alice, &f.assets, &[0, 0], &f.env)
            .is_ok());
    }

    #[test]
    fn failed_deposit_leaves_no_trace() {
        let f = fixture();
        let before = f.vault.state().unwrap();
        let err = f
            .vault
            .deposit_assets(&f.alice, &f.assets, &[10 * ONE, 10 * ONE], u128::MAX, None, &f.env)
            .unwrap_err();
        assert!(matches!(err, VaultError::SharesSlippageExceeded { .. }));
        assert_eq!(f.vault.state().unwrap(), before);
        let alice_a = f
            .vault
            .with_bank(|bank| bank.balance(&f.assets[0], &f.alice))
            .unwrap();
        assert_eq!(alice_a, 1_000 * ONE);
    }

    #[test]
    fn length_mismatch_and_empty_lists() {
        let f = fixture();
        assert!(matches!(
            f.vault.deposit_assets(&f.alice, &f.assets, &[ONE], 0, None, &f.env),
            Err(VaultError::LengthMismatch { assets: 2, amounts: 1 })
        ));
        assert!(matches!(
            f.vault.deposit_assets(&f.alice, &[], &[], 0, None, &f.env),
            Err(VaultError::ZeroAmount)
        ));
    }

    #[test]
    fn withdraw_respects_cool_down() {
        let f = fixture();
        f.vault
            .deposit_assets(&f.alice, &f.assets, &[10 * ONE, 10 * ONE], 0, None, &f.env)
            .unwrap();
        let start = f.env.block_number();

        f.env.advance_blocks(4);
        assert!(matches!(
            f.vault.withdraw_all(&f.alice, &f.assets, &[0, 0], &f.env),
            Err(VaultError::TooSoon { available_at }) if available_at == start + 5
        ));
        f.env.advance_blocks(1);
        let out = f
            .vault
            .withdraw_all(&f.alice, &f.assets, &[0, 0], &f.env)
            .unwrap();
        // Everything but the sink's slice comes back.
        assert!(out[0] < 10 * ONE && out[0] > 9 * ONE);
        assert_eq!(f.vault.total_supply().unwrap(), INITIAL_SHARES);
    }

    #[test]
    fn governance_setters_require_role() {
        let f = fixture();
        assert!(matches!(
            f.vault.set_max_supply(&f.alice, 1),
            Err(VaultError::Unauthorized(_))
        ));
        let gov = Address::new("0x60");
        f.vault.set_max_supply(&gov, 5 * ONE).unwrap();
        f.vault.set_do_hard_work_on_deposit(&gov, false).unwrap();
        assert_eq!(f.vault.max_supply().unwrap(), 5 * ONE);
        assert!(!f.vault.do_hard_work_on_deposit().unwrap());

        let events = f.vault.take_events().unwrap();
        assert_eq!(
            events,
            vec![
                VaultEvent::MaxSupplyChanged { max_supply: 5 * ONE },
                VaultEvent::DoHardWorkOnDepositChanged { enabled: false },
            ]
        );
        assert!(f.vault.take_events().unwrap().is_empty());
    }

    #[test]
    fn price_is_zero_without_supply() {
        let f = fixture();
        assert_eq!(f.vault.price().unwrap(), (0, false));
        f.vault
            .deposit_assets(&f.alice, &f.assets, &[10 * ONE, 10 * ONE], 0, None, &f.env)
            .unwrap();
        let (price, trusted) = f.vault.price().unwrap();
        assert_eq!(price, ONE);
        assert!(trusted);
    }
}
