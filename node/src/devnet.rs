//! # Devnet Wiring
//!
//! Assembles one simulated vault from [`NodeConfig`]: a constant-weight
//! strategy, in-memory custody with faucet balances, fixed-price oracles,
//! a static access policy, and the batch harvester the keeper loop drives.
//!
//! Custody and strategy books are in-memory, so a restart begins a fresh
//! chain. The vault store only keeps the latest ledger snapshot and the
//! last simulated block; a snapshot left over from a previous run is
//! discarded at startup because its balances no longer have assets behind
//! them.

use std::sync::Arc;

use anyhow::{Context, Result};
use multivault_contracts::{
    BatchReport, HardWorkTarget, HardWorker, HardWorkerConfig, HardWorkerError, Vault,
    VaultConfig, VaultError, VaultState,
};
use multivault_protocol::access::StaticAccessPolicy;
use multivault_protocol::bank::{AssetBank, MemoryBank};
use multivault_protocol::config::DEFAULT_MAX_HW_PER_CALL;
use multivault_protocol::sim::{FixedAprOracle, FixedPriceOracle, SimEnv, SimStrategy};
use multivault_protocol::storage::VaultStore;
use multivault_protocol::{Address, Amount, AssetId, ExecutionEnv};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;

/// Domain tag for the devnet strategy's address.
const STRATEGY_DOMAIN: &[u8] = b"multivault/devnet-strategy";

/// Pool liquidity, as a multiple of the faucet amount.
const POOL_DEPTH: Amount = 100;

pub type DevnetVault = Vault<SimStrategy, MemoryBank>;

pub struct Devnet {
    pub vault: Arc<DevnetVault>,
    pub env: Arc<SimEnv>,
    pub hard_worker: Arc<HardWorker>,
    pub store: Arc<VaultStore>,
    /// The gas meter is shared, so one harvest measures at a time.
    harvest_lock: Mutex<()>,
    assets: Vec<AssetId>,
    dedicated_server: Address,
    faucet_amount: Amount,
    reward_per_harvest: Amount,
}

impl Devnet {
    pub fn build(config: &NodeConfig, store: Arc<VaultStore>) -> Result<Self> {
        let section = &config.vault;
        let roles = &config.roles;

        let start_block = store
            .last_block()
            .context("failed to read last simulated block")?
            .map_or(1, |block| block + 1);
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let env = Arc::new(SimEnv::new(start_block, now));
        env.set_gas_price(config.gas_price);

        let assets: Vec<AssetId> = section.assets.iter().map(|a| a.address.clone()).collect();
        let unit_values = section.assets.iter().map(|a| a.unit_value).collect();

        let strategy_id = Address::derive(STRATEGY_DOMAIN, &section.address);
        let mut strategy = SimStrategy::new(strategy_id.clone(), assets.clone(), unit_values)
            .with_last_hard_work(now);
        if let Some(lp) = &section.underlying {
            strategy = strategy.with_underlying(lp.clone(), section.pool.clone());
        }

        let mut bank = MemoryBank::new();
        for account in &section.faucet_accounts {
            fund(&mut bank, &assets, section.underlying.as_ref(), account, section.faucet_amount)
                .with_context(|| format!("failed to fund faucet account {account}"))?;
        }
        let pool_liquidity = section.faucet_amount.saturating_mul(POOL_DEPTH);
        fund(&mut bank, &assets, section.underlying.as_ref(), &section.pool, pool_liquidity)
            .context("failed to fund pool")?;
        bank.fund_native(&section.address, section.native_float)
            .context("failed to fund vault gas float")?;

        let policy = Arc::new(StaticAccessPolicy::with_roles(
            roles.governance.clone(),
            roles.hard_worker.clone(),
        ));
        for operator in &roles.operators {
            policy.add_operator(operator.clone());
        }
        let prices = Arc::new(FixedPriceOracle::with_prices(
            section.assets.iter().map(|a| (a.address.clone(), a.price)),
        ));

        if store
            .get_vault::<VaultState>(&section.address)
            .context("failed to read vault snapshot")?
            .is_some()
        {
            warn!(vault = %section.address, "discarding snapshot from a previous run");
            store
                .remove_vault(&section.address)
                .context("failed to discard vault snapshot")?;
        }

        let vault = Vault::new(
            VaultConfig {
                address: section.address.clone(),
                name: section.name.clone(),
                symbol: section.symbol.clone(),
            },
            strategy,
            bank,
            policy,
            prices,
        )
        .with_apr_oracle(Arc::new(FixedAprOracle::new()));

        let hard_worker = HardWorker::new(HardWorkerConfig {
            address: roles.hard_worker.clone(),
            owner: roles.owner.clone(),
            max_hw_per_call: DEFAULT_MAX_HW_PER_CALL,
            dedicated_servers: vec![roles.dedicated_server.clone()],
        })
        .context("invalid hard worker config")?;

        info!(
            vault = %section.address,
            strategy = %strategy_id,
            assets = assets.len(),
            start_block,
            "devnet vault assembled"
        );

        Ok(Self {
            vault: Arc::new(vault),
            env,
            hard_worker: Arc::new(hard_worker),
            store,
            harvest_lock: Mutex::new(()),
            assets,
            dedicated_server: roles.dedicated_server.clone(),
            faucet_amount: section.faucet_amount,
            reward_per_harvest: section.reward_per_harvest,
        })
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn targets(&self) -> Vec<Arc<dyn HardWorkTarget>> {
        vec![self.vault.clone()]
    }

    /// Produces one block and records it in the store.
    pub fn tick(&self) -> Result<u64> {
        let block = self.env.advance_blocks(1);
        self.store
            .set_last_block(block)
            .context("failed to record block height")?;
        Ok(block)
    }

    /// Runs one harvest batch as `caller`, queueing the configured rewards
    /// first.
    pub fn harvest(&self, caller: &Address) -> Result<BatchReport, HardWorkerError> {
        let _metering = self.harvest_lock.lock();
        if self.reward_per_harvest > 0 {
            let rewards = vec![self.reward_per_harvest; self.assets.len()];
            if let Err(e) = self
                .vault
                .with_strategy_mut(|strategy| strategy.accrue_rewards(&rewards))
            {
                debug!(error = %e, "vault busy, skipping this round's rewards");
            }
        }
        self.env.reset_gas();
        self.hard_worker
            .call(caller, &self.targets(), self.env.as_ref())
    }

    /// One keeper round, called from the dedicated server.
    pub fn keeper_round(&self) -> Result<BatchReport, HardWorkerError> {
        self.harvest(&self.dedicated_server)
    }

    /// Credits `account` with the faucet amount of every asset.
    pub fn faucet(&self, account: &Address) -> Result<Amount, VaultError> {
        let amount = self.faucet_amount;
        self.vault
            .with_bank_mut(|bank| fund(bank, &self.assets, None, account, amount))??;
        info!(%account, amount, "faucet drip");
        Ok(amount)
    }

    /// Persists the current vault ledger.
    pub fn snapshot(&self) -> Result<(), VaultError> {
        self.vault.save(&self.store)
    }

    pub fn block_number(&self) -> u64 {
        self.env.block_number()
    }
}

fn fund(
    bank: &mut MemoryBank,
    assets: &[AssetId],
    underlying: Option<&AssetId>,
    account: &Address,
    amount: Amount,
) -> Result<(), multivault_protocol::bank::BankError> {
    for asset in assets.iter().chain(underlying) {
        bank.mint(asset, account, amount)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multivault_protocol::config::PRICE_PRECISION;

    const ONE: Amount = PRICE_PRECISION;

    fn devnet() -> Devnet {
        let store = Arc::new(VaultStore::open_temporary().unwrap());
        Devnet::build(&NodeConfig::default(), store).unwrap()
    }

    fn alice() -> Address {
        NodeConfig::default().vault.faucet_accounts[0].clone()
    }

    #[test]
    fn faucet_accounts_can_deposit() {
        let net = devnet();
        let receipt = net
            .vault
            .deposit_assets(&alice(), net.assets(), &[ONE, 2_000 * ONE], 0, None, net.env.as_ref())
            .unwrap();
        assert!(receipt.shares_minted > 0);
        assert_eq!(receipt.amounts_consumed, vec![ONE, 2_000 * ONE]);
    }

    #[test]
    fn keeper_round_harvests_and_reimburses() {
        let net = devnet();
        net.vault
            .deposit_assets(&alice(), net.assets(), &[ONE, 2_000 * ONE], 0, None, net.env.as_ref())
            .unwrap();

        let report = net.keeper_round().unwrap();
        assert_eq!(report.harvested, vec![net.vault.address().clone()]);
        assert!(report.compensated_total > 0);
    }

    #[test]
    fn strangers_cannot_drive_the_harvester() {
        let net = devnet();
        assert!(matches!(
            net.harvest(&alice()),
            Err(HardWorkerError::Unauthorized(_))
        ));
    }

    #[test]
    fn ticks_are_recorded_and_resume_after_restart() {
        let store = Arc::new(VaultStore::open_temporary().unwrap());
        let net = Devnet::build(&NodeConfig::default(), store.clone()).unwrap();
        net.tick().unwrap();
        let last = net.tick().unwrap();
        assert_eq!(store.last_block().unwrap(), Some(last));

        let restarted = Devnet::build(&NodeConfig::default(), store).unwrap();
        assert_eq!(restarted.block_number(), last + 1);
    }

    #[test]
    fn stale_snapshot_is_discarded_on_build() {
        let store = Arc::new(VaultStore::open_temporary().unwrap());
        let net = Devnet::build(&NodeConfig::default(), store.clone()).unwrap();
        net.vault
            .deposit_assets(&alice(), net.assets(), &[ONE, 2_000 * ONE], 0, None, net.env.as_ref())
            .unwrap();
        net.snapshot().unwrap();
        let address = net.vault.address().clone();
        assert!(store.get_vault::<VaultState>(&address).unwrap().is_some());

        let fresh = Devnet::build(&NodeConfig::default(), store.clone()).unwrap();
        assert_eq!(fresh.vault.total_supply().unwrap(), 0);
        assert!(store.get_vault::<VaultState>(&address).unwrap().is_none());
    }

    #[test]
    fn overlapping_harvests_are_each_reimbursed() {
        let net = devnet();
        let per_harvest = multivault_protocol::sim::strategy::DEFAULT_HARD_WORK_GAS as u128
            * NodeConfig::default().gas_price as u128;

        let reports: Vec<BatchReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| net.keeper_round())).collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });
        for report in &reports {
            assert_eq!(report.compensated_total, per_harvest);
        }
    }

    #[test]
    fn configured_rewards_compound_on_harvest() {
        let mut config = NodeConfig::default();
        config.vault.reward_per_harvest = ONE;
        let store = Arc::new(VaultStore::open_temporary().unwrap());
        let net = Devnet::build(&config, store).unwrap();
        net.vault
            .deposit_assets(&alice(), net.assets(), &[ONE, 2_000 * ONE], 0, None, net.env.as_ref())
            .unwrap();
        let (tvl_before, _) = net.vault.tvl().unwrap();

        net.keeper_round().unwrap();
        assert!(net.vault.tvl().unwrap().0 > tvl_before);
    }

    #[test]
    fn faucet_tops_up_every_asset() {
        let net = devnet();
        let stranger = Address::new("0x00000000000000000000000000000000000000cc");
        let amount = net.faucet(&stranger).unwrap();
        for asset in net.assets() {
            let held = net
                .vault
                .with_bank(|bank| bank.balance(asset, &stranger))
                .unwrap();
            assert_eq!(held, amount);
        }
    }
}
