//! # Price & APR Oracles
//!
//! The vault prices asset vectors twice: once to bootstrap the share price
//! on the first deposit, and on every `tvl()` query. Both go through
//! [`PriceOracle::get_assets_price`]. APR lookups for `get_apr()` go through
//! the optional [`AprOracle`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Amount, AssetId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no price feed for asset {0}")]
    UnknownAsset(AssetId),

    #[error("expected {expected} amounts, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("price overflow")]
    Overflow,
}

/// Output of [`PriceOracle::get_assets_price`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsPrice {
    /// Total USD value, 18 decimals.
    pub total: Amount,
    /// USD value of each input amount, same order as the input.
    pub per_asset: Vec<Amount>,
    /// `false` when any feed is stale or comes from an untrusted source.
    pub trusted: bool,
}

/// Converts asset amount vectors into a USD-denominated value.
pub trait PriceOracle: Send + Sync {
    fn get_assets_price(
        &self,
        assets: &[AssetId],
        amounts: &[Amount],
    ) -> Result<AssetsPrice, OracleError>;
}

/// Per-asset yield source (staking APR of an LST, lending APR of a
/// receipt token, ...). 1e18 = 100%.
pub trait AprOracle: Send + Sync {
    fn asset_apr(&self, asset: &AssetId) -> u128;
}
