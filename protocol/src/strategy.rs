//! # Strategy Interface
//!
//! A strategy owns custody of vault capital and runs the yield logic: LP
//! provisioning, farm staking, reward compounding. The vault never looks
//! inside; it only asks for valuations and hands over or pulls out assets.
//!
//! ## Units
//!
//! `total()` and the `value` returned by deposits are in the strategy's own
//! internal unit (LP value, a priced unit, anything monotonic). The vault
//! only ever compares values from the same strategy, so the unit never
//! leaks into share math except through ratios.
//!
//! ## Custody
//!
//! Every call that reads or moves custody receives the [`AssetBank`]
//! explicitly. The strategy's custody account is [`Strategy::id`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bank::{AssetBank, BankError};
use crate::math::MathError;
use crate::types::{Address, Amount, AssetId, ExecutionEnv};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a strategy may surface to the vault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// An asset list did not match the strategy's assets.
    #[error("asset {0} is not managed by this strategy")]
    UnknownAsset(AssetId),

    /// An amounts list did not match the asset list.
    #[error("expected {expected} amounts, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Underlying operations on a strategy without an underlying asset.
    #[error("strategy has no underlying asset")]
    NoUnderlying,

    /// The strategy cannot source the requested value.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    /// The harvest itself failed (farm paused, router reverted, ...).
    #[error("hard work failed: {0}")]
    HardWork(String),

    #[error("custody error: {0}")]
    Bank(#[from] BankError),

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Result of [`Strategy::preview_deposit_assets`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsPreview {
    /// How much of each offered asset the strategy would take.
    pub amounts_consumed: Vec<Amount>,
    /// Value the deposit would add, in the strategy's unit.
    pub value: Amount,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// A yield strategy bound to exactly one vault.
pub trait Strategy: Send {
    /// The strategy's address; also its custody account in the bank.
    fn id(&self) -> &Address;

    /// Total managed value in the strategy's unit. Zero while the fuse is
    /// triggered.
    fn total(&self, bank: &dyn AssetBank) -> Amount;

    /// Assets the strategy accepts, in canonical order.
    fn assets(&self) -> Vec<AssetId>;

    /// The pre-composed single asset (LP token, vault share) that can be
    /// deposited and withdrawn directly, if any.
    fn underlying(&self) -> Option<AssetId>;

    /// Unix timestamp of the last successful harvest.
    fn last_hard_work(&self) -> u64;

    /// APR measured at the last harvest. 1e18 = 100%.
    fn last_apr(&self) -> u128;

    /// Current value share of each asset. 1e18 = 100%; sums to 1e18 when
    /// the strategy holds anything.
    fn get_assets_proportions(&self, bank: &dyn AssetBank) -> Vec<u128>;

    /// Raw on-hand amounts of each asset, bypassing valuation.
    fn assets_amounts(&self, bank: &dyn AssetBank) -> Vec<Amount>;

    /// How much of each offered asset would be consumed, and the value.
    fn preview_deposit_assets(
        &self,
        bank: &dyn AssetBank,
        assets: &[AssetId],
        amounts_max: &[Amount],
    ) -> Result<AssetsPreview, StrategyError>;

    /// Invests assets already transferred to [`Strategy::id`]. Returns value added.
    fn deposit_assets(
        &mut self,
        bank: &mut dyn AssetBank,
        amounts: &[Amount],
    ) -> Result<Amount, StrategyError>;

    /// Invests underlying already transferred to [`Strategy::id`]. Returns
    /// the per-asset amounts it represents.
    fn deposit_underlying(
        &mut self,
        bank: &mut dyn AssetBank,
        amount: Amount,
    ) -> Result<Vec<Amount>, StrategyError>;

    /// Divests `value` and sends the resulting assets to `receiver`.
    fn withdraw_assets(
        &mut self,
        bank: &mut dyn AssetBank,
        assets: &[AssetId],
        value: Amount,
        receiver: &Address,
    ) -> Result<Vec<Amount>, StrategyError>;

    /// Sends `amount` of the underlying to `receiver`.
    fn withdraw_underlying(
        &mut self,
        bank: &mut dyn AssetBank,
        amount: Amount,
        receiver: &Address,
    ) -> Result<(), StrategyError>;

    /// Sends raw on-hand amounts to `receiver` without touching valuation.
    /// The fuse-mode exit path.
    fn transfer_assets(
        &mut self,
        bank: &mut dyn AssetBank,
        amounts: &[Amount],
        receiver: &Address,
    ) -> Result<(), StrategyError>;

    /// Harvests and compounds. Metered through `env`.
    fn do_hard_work(
        &mut self,
        bank: &mut dyn AssetBank,
        env: &dyn ExecutionEnv,
    ) -> Result<(), StrategyError>;
}
