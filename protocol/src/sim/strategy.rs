//! A constant-weight strategy that keeps its capital idle in the bank.
//!
//! Value unit: each asset has a fixed value per whole token (`unit_values`,
//! 18-decimal). `total()` is the value of everything the strategy holds.
//! Deposits are balanced against target value weights, so an unbalanced
//! offer is only partially consumed.
//!
//! The optional underlying is modelled as an LP token backed 1:1 in value
//! by a pool account. Depositing underlying swaps it into the pool for the
//! matching asset basket; withdrawing underlying does the reverse.
//!
//! Harvests mint whatever rewards were queued with
//! [`SimStrategy::accrue_rewards`] and measure APR from them.

use crate::bank::AssetBank;
use crate::config::PRICE_PRECISION;
use crate::math::{mul_div_down, MathError};
use crate::strategy::{AssetsPreview, Strategy, StrategyError};
use crate::types::{Address, Amount, AssetId, ExecutionEnv};

const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;

/// Gas a simulated harvest burns by default.
pub const DEFAULT_HARD_WORK_GAS: u64 = 250_000;

#[derive(Clone, Debug)]
struct SimUnderlying {
    asset: AssetId,
    pool: Address,
}

/// In-memory strategy. `Clone` is a full snapshot of its books.
#[derive(Clone, Debug)]
pub struct SimStrategy {
    id: Address,
    assets: Vec<AssetId>,
    unit_values: Vec<u128>,
    weights: Vec<u128>,
    underlying: Option<SimUnderlying>,
    pending_rewards: Vec<Amount>,
    last_hard_work: u64,
    last_apr: u128,
    hard_work_gas: u64,
    fuse_triggered: bool,
    fail_next_hard_work: Option<String>,
}

impl SimStrategy {
    /// Equal-weight strategy over `assets`, each worth `unit_values[i]` per token.
    pub fn new(id: Address, assets: Vec<AssetId>, unit_values: Vec<u128>) -> Self {
        let n = assets.len().max(1) as u128;
        let weights = vec![PRICE_PRECISION / n; assets.len()];
        let pending_rewards = vec![0; assets.len()];
        Self {
            id,
            assets,
            unit_values,
            weights,
            underlying: None,
            pending_rewards,
            last_hard_work: 0,
            last_apr: 0,
            hard_work_gas: DEFAULT_HARD_WORK_GAS,
            fuse_triggered: false,
            fail_next_hard_work: None,
        }
    }

    /// Overrides the target value weights (1e18 = 100%).
    pub fn with_weights(mut self, weights: Vec<u128>) -> Self {
        self.weights = weights;
        self
    }

    /// Adds an LP-style underlying asset backed by `pool`.
    pub fn with_underlying(mut self, asset: AssetId, pool: Address) -> Self {
        self.underlying = Some(SimUnderlying { asset, pool });
        self
    }

    pub fn with_hard_work_gas(mut self, gas: u64) -> Self {
        self.hard_work_gas = gas;
        self
    }

    /// Marks a harvest as having happened at `timestamp`.
    pub fn with_last_hard_work(mut self, timestamp: u64) -> Self {
        self.last_hard_work = timestamp;
        self
    }

    /// Queues rewards that the next harvest will realize.
    pub fn accrue_rewards(&mut self, amounts: &[Amount]) {
        for (pending, amount) in self.pending_rewards.iter_mut().zip(amounts) {
            *pending = pending.saturating_add(*amount);
        }
    }

    /// Simulates a catastrophic loss detection: `total()` reads zero.
    pub fn trip_fuse(&mut self) {
        self.fuse_triggered = true;
    }

    pub fn reset_fuse(&mut self) {
        self.fuse_triggered = false;
    }

    pub fn fail_next_hard_work(&mut self, reason: impl Into<String>) {
        self.fail_next_hard_work = Some(reason.into());
    }

    fn value_of(&self, amounts: &[Amount]) -> Result<Amount, MathError> {
        let mut total: Amount = 0;
        for (amount, unit_value) in amounts.iter().zip(&self.unit_values) {
            let value = mul_div_down(*amount, *unit_value, PRICE_PRECISION)?;
            total = total.checked_add(value).ok_or(MathError::Overflow)?;
        }
        Ok(total)
    }

    fn require_assets(&self, assets: &[AssetId]) -> Result<(), StrategyError> {
        if assets.len() != self.assets.len() {
            return Err(StrategyError::LengthMismatch {
                expected: self.assets.len(),
                got: assets.len(),
            });
        }
        if let Some(unknown) = assets.iter().zip(&self.assets).find(|(a, b)| a != b) {
            return Err(StrategyError::UnknownAsset(unknown.0.clone()));
        }
        Ok(())
    }

    fn require_len(&self, amounts: &[Amount]) -> Result<(), StrategyError> {
        if amounts.len() != self.assets.len() {
            return Err(StrategyError::LengthMismatch {
                expected: self.assets.len(),
                got: amounts.len(),
            });
        }
        Ok(())
    }

    fn underlying_ref(&self) -> Result<&SimUnderlying, StrategyError> {
        self.underlying.as_ref().ok_or(StrategyError::NoUnderlying)
    }

    /// Asset basket worth `value`, split by target weights.
    fn basket_for_value(&self, value: Amount) -> Result<Vec<Amount>, MathError> {
        self.weights
            .iter()
            .zip(&self.unit_values)
            .map(|(weight, unit_value)| {
                let share = mul_div_down(value, *weight, PRICE_PRECISION)?;
                mul_div_down(share, PRICE_PRECISION, *unit_value)
            })
            .collect()
    }

    /// Pro-rata slice of current holdings worth `value`.
    fn holdings_slice(
        &self,
        bank: &dyn AssetBank,
        value: Amount,
    ) -> Result<Vec<Amount>, StrategyError> {
        let total = self.total(bank);
        if value > total {
            return Err(StrategyError::InsufficientLiquidity {
                requested: value,
                available: total,
            });
        }
        self.assets_amounts(bank)
            .into_iter()
            .map(|held| mul_div_down(held, value, total).map_err(StrategyError::from))
            .collect()
    }
}

impl Strategy for SimStrategy {
    fn id(&self) -> &Address {
        &self.id
    }

    fn total(&self, bank: &dyn AssetBank) -> Amount {
        if self.fuse_triggered {
            return 0;
        }
        // Books too large to value read as a tripped fuse.
        self.value_of(&self.assets_amounts(bank)).unwrap_or(0)
    }

    fn assets(&self) -> Vec<AssetId> {
        self.assets.clone()
    }

    fn underlying(&self) -> Option<AssetId> {
        self.underlying.as_ref().map(|u| u.asset.clone())
    }

    fn last_hard_work(&self) -> u64 {
        self.last_hard_work
    }

    fn last_apr(&self) -> u128 {
        self.last_apr
    }

    fn get_assets_proportions(&self, bank: &dyn AssetBank) -> Vec<u128> {
        let amounts = self.assets_amounts(bank);
        let total = match self.value_of(&amounts) {
            Ok(total) if total > 0 => total,
            _ => return self.weights.clone(),
        };
        amounts
            .iter()
            .zip(&self.unit_values)
            .map(|(amount, unit_value)| {
                mul_div_down(*amount, *unit_value, PRICE_PRECISION)
                    .and_then(|value| mul_div_down(value, PRICE_PRECISION, total))
                    .unwrap_or(0)
            })
            .collect()
    }

    fn assets_amounts(&self, bank: &dyn AssetBank) -> Vec<Amount> {
        self.assets
            .iter()
            .map(|asset| bank.balance(asset, &self.id))
            .collect()
    }

    fn preview_deposit_assets(
        &self,
        _bank: &dyn AssetBank,
        assets: &[AssetId],
        amounts_max: &[Amount],
    ) -> Result<AssetsPreview, StrategyError> {
        self.require_assets(assets)?;
        self.require_len(amounts_max)?;

        // The scarcest asset relative to its weight caps the deposit value.
        let mut capacity: Option<Amount> = None;
        for ((amount, unit_value), weight) in amounts_max
            .iter()
            .zip(&self.unit_values)
            .zip(&self.weights)
        {
            if *weight == 0 {
                continue;
            }
            let value = mul_div_down(*amount, *unit_value, PRICE_PRECISION)?;
            let cap = mul_div_down(value, PRICE_PRECISION, *weight)?;
            capacity = Some(capacity.map_or(cap, |c| c.min(cap)));
        }
        let capacity = capacity.unwrap_or(0);

        let amounts_consumed: Vec<Amount> = self
            .basket_for_value(capacity)?
            .into_iter()
            .zip(amounts_max)
            .map(|(wanted, offered)| wanted.min(*offered))
            .collect();
        let value = self.value_of(&amounts_consumed)?;

        Ok(AssetsPreview {
            amounts_consumed,
            value,
        })
    }

    fn deposit_assets(
        &mut self,
        _bank: &mut dyn AssetBank,
        amounts: &[Amount],
    ) -> Result<Amount, StrategyError> {
        self.require_len(amounts)?;
        Ok(self.value_of(amounts)?)
    }

    fn deposit_underlying(
        &mut self,
        bank: &mut dyn AssetBank,
        amount: Amount,
    ) -> Result<Vec<Amount>, StrategyError> {
        let underlying = self.underlying_ref()?.clone();
        let basket = self.basket_for_value(amount)?;

        bank.transfer(&underlying.asset, &self.id, &underlying.pool, amount)?;
        for (asset, units) in self.assets.iter().zip(&basket) {
            bank.transfer(asset, &underlying.pool, &self.id, *units)?;
        }
        Ok(basket)
    }

    fn withdraw_assets(
        &mut self,
        bank: &mut dyn AssetBank,
        assets: &[AssetId],
        value: Amount,
        receiver: &Address,
    ) -> Result<Vec<Amount>, StrategyError> {
        self.require_assets(assets)?;
        let amounts = self.holdings_slice(bank, value)?;
        for (asset, amount) in self.assets.iter().zip(&amounts) {
            bank.transfer(asset, &self.id, receiver, *amount)?;
        }
        Ok(amounts)
    }

    fn withdraw_underlying(
        &mut self,
        bank: &mut dyn AssetBank,
        amount: Amount,
        receiver: &Address,
    ) -> Result<(), StrategyError> {
        let underlying = self.underlying_ref()?.clone();

        // Underlying already on hand (fuse exits) is paid out directly.
        if bank.balance(&underlying.asset, &self.id) >= amount {
            bank.transfer(&underlying.asset, &self.id, receiver, amount)?;
            return Ok(());
        }

        let basket = self.holdings_slice(bank, amount)?;
        for (asset, units) in self.assets.iter().zip(&basket) {
            bank.transfer(asset, &self.id, &underlying.pool, *units)?;
        }
        bank.transfer(&underlying.asset, &underlying.pool, receiver, amount)?;
        Ok(())
    }

    fn transfer_assets(
        &mut self,
        bank: &mut dyn AssetBank,
        amounts: &[Amount],
        receiver: &Address,
    ) -> Result<(), StrategyError> {
        self.require_len(amounts)?;
        for (asset, amount) in self.assets.iter().zip(amounts) {
            bank.transfer(asset, &self.id, receiver, *amount)?;
        }
        Ok(())
    }

    fn do_hard_work(
        &mut self,
        bank: &mut dyn AssetBank,
        env: &dyn ExecutionEnv,
    ) -> Result<(), StrategyError> {
        if let Some(reason) = self.fail_next_hard_work.take() {
            return Err(StrategyError::HardWork(reason));
        }
        env.consume_gas(self.hard_work_gas);

        let total_before = self.total(&*bank);
        let rewards = std::mem::replace(&mut self.pending_rewards, vec![0; self.assets.len()]);
        for (asset, amount) in self.assets.iter().zip(&rewards) {
            bank.mint(asset, &self.id, *amount)?;
        }
        let earned = self.value_of(&rewards)?;

        let now = env.timestamp();
        let elapsed = now.saturating_sub(self.last_hard_work) as u128;
        if self.last_hard_work > 0 && elapsed > 0 && total_before > 0 {
            let ratio = mul_div_down(earned, PRICE_PRECISION, total_before)?;
            self.last_apr = mul_div_down(ratio, SECONDS_PER_YEAR, elapsed)?;
        }
        self.last_hard_work = now;
        Ok(())
    }
}
