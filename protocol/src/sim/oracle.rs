//! Fixed-table price and APR oracles.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::config::PRICE_PRECISION;
use crate::math::mul_div_down;
use crate::oracle::{AprOracle, AssetsPrice, OracleError, PriceOracle};
use crate::types::{Amount, AssetId};

/// Prices every asset from a table of USD prices per whole token
/// (18-decimal fixed point). Assets marked untrusted price normally but
/// clear the `trusted` flag.
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    prices: RwLock<BTreeMap<AssetId, u128>>,
    untrusted: RwLock<BTreeSet<AssetId>>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: impl IntoIterator<Item = (AssetId, u128)>) -> Self {
        let oracle = Self::new();
        oracle.prices.write().extend(prices);
        oracle
    }

    pub fn set_price(&self, asset: AssetId, price: u128) {
        self.prices.write().insert(asset, price);
    }

    pub fn set_trusted(&self, asset: AssetId, trusted: bool) {
        let mut untrusted = self.untrusted.write();
        if trusted {
            untrusted.remove(&asset);
        } else {
            untrusted.insert(asset);
        }
    }
}

impl PriceOracle for FixedPriceOracle {
    fn get_assets_price(
        &self,
        assets: &[AssetId],
        amounts: &[Amount],
    ) -> Result<AssetsPrice, OracleError> {
        if assets.len() != amounts.len() {
            return Err(OracleError::LengthMismatch {
                expected: assets.len(),
                got: amounts.len(),
            });
        }

        let prices = self.prices.read();
        let untrusted = self.untrusted.read();
        let mut per_asset = Vec::with_capacity(assets.len());
        let mut total: Amount = 0;
        let mut trusted = true;

        for (asset, amount) in assets.iter().zip(amounts) {
            let price = prices
                .get(asset)
                .copied()
                .ok_or_else(|| OracleError::UnknownAsset(asset.clone()))?;
            let value =
                mul_div_down(*amount, price, PRICE_PRECISION).map_err(|_| OracleError::Overflow)?;
            total = total.checked_add(value).ok_or(OracleError::Overflow)?;
            trusted &= !untrusted.contains(asset);
            per_asset.push(value);
        }

        Ok(AssetsPrice {
            total,
            per_asset,
            trusted,
        })
    }
}

/// APR table. Assets without an entry yield zero.
#[derive(Debug, Default)]
pub struct FixedAprOracle {
    aprs: RwLock<BTreeMap<AssetId, u128>>,
}

impl FixedAprOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_apr(&self, asset: AssetId, apr: u128) {
        self.aprs.write().insert(asset, apr);
    }
}

impl AprOracle for FixedAprOracle {
    fn asset_apr(&self, asset: &AssetId) -> u128 {
        self.aprs.read().get(asset).copied().unwrap_or(0)
    }
}
