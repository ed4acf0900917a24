//! Shared fixtures for the vault integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use multivault_contracts::{Vault, VaultConfig};
use multivault_protocol::access::StaticAccessPolicy;
use multivault_protocol::bank::{AssetBank, MemoryBank};
use multivault_protocol::config::PRICE_PRECISION;
use multivault_protocol::sim::{FixedAprOracle, FixedPriceOracle, SimEnv, SimStrategy};
use multivault_protocol::{Address, AssetId, ExecutionEnv};

pub const ONE: u128 = PRICE_PRECISION;

/// USD price of each of the two test assets.
pub const ASSET_PRICE: u128 = 50 * ONE;

pub type TestVault = Vault<SimStrategy, MemoryBank>;

pub struct Harness {
    pub vault: Arc<TestVault>,
    pub policy: Arc<StaticAccessPolicy>,
    pub prices: Arc<FixedPriceOracle>,
    pub aprs: Arc<FixedAprOracle>,
    pub env: SimEnv,
    pub assets: Vec<AssetId>,
    pub lp: AssetId,
    pub pool: Address,
    pub governance: Address,
    pub keeper: Address,
}

pub fn addr(raw: &str) -> Address {
    Address::new(raw)
}

pub fn alice() -> Address {
    addr("0x00000000000000000000000000000000000000a1")
}

pub fn bob() -> Address {
    addr("0x00000000000000000000000000000000000000b0")
}

/// A two-asset vault at address `vault`, each asset worth one strategy unit
/// and $50. Alice and Bob hold 1000 of each asset and 100 of the LP token.
pub fn harness_at(vault: &str) -> Harness {
    let env = SimEnv::default();
    let assets = vec![addr("0x00000000000000000000000000000000000000aa"), addr("0x00000000000000000000000000000000000000bb")];
    let lp = addr("0x00000000000000000000000000000000000000c0");
    let pool = addr("0x00000000000000000000000000000000000000f0");
    let governance = addr("0x0000000000000000000000000000000000000060");
    let keeper = addr("0x0000000000000000000000000000000000000077");

    let strategy_id = Address::derive(b"test/strategy", &addr(vault));
    let strategy = SimStrategy::new(strategy_id, assets.clone(), vec![ONE, ONE])
        .with_underlying(lp.clone(), pool.clone())
        .with_last_hard_work(env.timestamp());

    let mut bank = MemoryBank::new();
    for account in [alice(), bob()] {
        for asset in &assets {
            bank.mint(asset, &account, 1_000 * ONE).unwrap();
        }
        bank.mint(&lp, &account, 100 * ONE).unwrap();
    }
    for asset in &assets {
        bank.mint(asset, &pool, 100_000 * ONE).unwrap();
    }

    let policy = Arc::new(StaticAccessPolicy::with_roles(governance.clone(), keeper.clone()));
    let prices = Arc::new(FixedPriceOracle::with_prices(
        assets.iter().cloned().map(|asset| (asset, ASSET_PRICE)),
    ));
    let aprs = Arc::new(FixedAprOracle::new());

    let vault = Vault::new(
        VaultConfig {
            address: addr(vault),
            name: "MultiVault AA-BB".into(),
            symbol: "mvAABB".into(),
        },
        strategy,
        bank,
        policy.clone(),
        prices.clone(),
    )
    .with_apr_oracle(aprs.clone());

    Harness {
        vault: Arc::new(vault),
        policy,
        prices,
        aprs,
        env,
        assets,
        lp,
        pool,
        governance,
        keeper,
    }
}

pub fn harness() -> Harness {
    harness_at("0x00000000000000000000000000000000000007a0")
}

impl Harness {
    /// Deposits `amount` of each asset for `account`. Returns shares minted.
    pub fn deposit(&self, account: &Address, amount: u128) -> u128 {
        self.vault
            .deposit_assets(account, &self.assets, &[amount, amount], 0, None, &self.env)
            .unwrap()
            .shares_minted
    }

    pub fn asset_balance(&self, asset: &AssetId, account: &Address) -> u128 {
        self.vault
            .with_bank(|bank| bank.balance(asset, account))
            .unwrap()
    }

    pub fn native_balance(&self, account: &Address) -> u128 {
        self.vault
            .with_bank(|bank| bank.native_balance(account))
            .unwrap()
    }

    pub fn strategy_id(&self) -> Address {
        self.vault
            .with_strategy_mut(|s| multivault_protocol::strategy::Strategy::id(s).clone())
            .unwrap()
    }

    /// Moves past the withdraw cool-down.
    pub fn cool_down(&self) {
        self.env
            .advance_blocks(multivault_protocol::config::WITHDRAW_DELAY_BLOCKS);
    }
}
