//! Integration tests for the vault deposit / withdraw lifecycle.
//!
//! These drive a real `Vault` over the simulated strategy, custody and
//! oracles: first-deposit bootstrap, proportional minting, the withdraw
//! cool-down, the underlying path, caps, persistence and reentrancy.

mod common;

use std::sync::{Arc, OnceLock, Weak};

use common::*;
use multivault_contracts::{Vault, VaultError, VaultEvent};
use multivault_protocol::bank::MemoryBank;
use multivault_protocol::config::{INITIAL_SHARES, MIN_HARDWORK_DELAY_SECS};
use multivault_protocol::math::mul_div_down;
use multivault_protocol::oracle::{AssetsPrice, OracleError, PriceOracle};
use multivault_protocol::sim::{FixedPriceOracle, SimStrategy};
use multivault_protocol::storage::VaultStore;
use multivault_protocol::strategy::Strategy;
use multivault_protocol::{Address, Amount, AssetId, ExecutionEnv};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Share Minting
// ---------------------------------------------------------------------------

#[test]
fn first_and_second_deposit_scenario() {
    let h = harness();

    // 10 A + 10 B at $50 each = $1000.
    let minted = h.deposit(&alice(), 10 * ONE);
    assert_eq!(minted, 1_000 * ONE - INITIAL_SHARES);
    assert_eq!(h.vault.balance_of(&Address::dead()).unwrap(), INITIAL_SHARES);
    assert_eq!(h.vault.total_supply().unwrap(), 1_000 * ONE);

    // Same value again, strategy total unchanged.
    let supply_before = h.vault.total_supply().unwrap();
    let value_before = 20 * ONE;
    let minted = h.deposit(&bob(), 10 * ONE);
    assert_eq!(
        minted,
        mul_div_down(20 * ONE, supply_before, value_before).unwrap()
    );
    assert_eq!(minted, 1_000 * ONE);
}

#[test]
fn full_exit_leaves_only_sink_shares() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.cool_down();

    h.vault
        .withdraw_all(&alice(), &h.assets, &[0, 0], &h.env)
        .unwrap();
    assert_eq!(h.vault.total_supply().unwrap(), INITIAL_SHARES);
    assert_eq!(h.vault.balance_of(&Address::dead()).unwrap(), INITIAL_SHARES);
    assert_eq!(h.vault.balance_of(&alice()).unwrap(), 0);
}

#[test]
fn undersized_first_deposit_mints_nothing() {
    let h = harness();
    // 0.005 A + 0.005 B = $0.50.
    let err = h
        .vault
        .deposit_assets(&alice(), &h.assets, &[ONE / 200, ONE / 200], 0, None, &h.env)
        .unwrap_err();
    assert!(matches!(err, VaultError::InsufficientInitialDeposit { .. }));
    assert_eq!(h.vault.total_supply().unwrap(), 0);
    assert_eq!(h.asset_balance(&h.assets[0], &alice()), 1_000 * ONE);
}

#[test]
fn unbalanced_offer_consumes_only_what_fits() {
    let h = harness();
    let receipt = h
        .vault
        .deposit_assets(&alice(), &h.assets, &[10 * ONE, 4 * ONE], 0, None, &h.env)
        .unwrap();
    assert_eq!(receipt.amounts_consumed, vec![4 * ONE, 4 * ONE]);
    assert_eq!(receipt.value, 8 * ONE);
    assert_eq!(h.asset_balance(&h.assets[0], &alice()), 996 * ONE);
}

#[test]
fn zero_amounts_are_zero_investment() {
    let h = harness();
    assert!(matches!(
        h.vault
            .deposit_assets(&alice(), &h.assets, &[0, 0], 0, None, &h.env),
        Err(VaultError::ZeroInvestment)
    ));
}

#[test]
fn deposit_can_mint_to_another_receiver() {
    let h = harness();
    let receipt = h
        .vault
        .deposit_assets(&alice(), &h.assets, &[10 * ONE, 10 * ONE], 0, Some(&bob()), &h.env)
        .unwrap();
    assert_eq!(h.vault.balance_of(&bob()).unwrap(), receipt.shares_minted);
    assert_eq!(h.vault.balance_of(&alice()).unwrap(), 0);
    assert_eq!(h.asset_balance(&h.assets[0], &alice()), 990 * ONE);
}

#[test]
fn preview_matches_execution() {
    let h = harness();
    let first = h
        .vault
        .preview_deposit_assets(&h.assets, &[10 * ONE, 10 * ONE])
        .unwrap();
    assert_eq!(first.shares_out, h.deposit(&alice(), 10 * ONE));

    let second = h
        .vault
        .preview_deposit_assets(&h.assets, &[3 * ONE, 7 * ONE])
        .unwrap();
    let receipt = h
        .vault
        .deposit_assets(&bob(), &h.assets, &[3 * ONE, 7 * ONE], 0, None, &h.env)
        .unwrap();
    assert_eq!(second.shares_out, receipt.shares_minted);
    assert_eq!(second.amounts_consumed, receipt.amounts_consumed);
    assert_eq!(second.value_out, receipt.value);
}

// ---------------------------------------------------------------------------
// Withdraw Guard
// ---------------------------------------------------------------------------

#[test]
fn withdrawal_succeeds_exactly_at_delay() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    let deposited_at = h.env.block_number();

    h.env.advance_blocks(4);
    let err = h
        .vault
        .withdraw_assets(&alice(), &h.assets, ONE, &[0, 0], None, &h.env)
        .unwrap_err();
    assert!(matches!(err, VaultError::TooSoon { available_at } if available_at == deposited_at + 5));

    h.env.advance_blocks(1);
    assert!(h
        .vault
        .withdraw_assets(&alice(), &h.assets, ONE, &[0, 0], None, &h.env)
        .is_ok());
}

#[test]
fn share_transfer_restarts_both_cool_downs() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.env.advance_blocks(10);
    h.vault
        .transfer(&alice(), &bob(), 100 * ONE, &h.env)
        .unwrap();
    let moved_at = h.env.block_number();

    h.env.advance_blocks(1);
    assert!(matches!(
        h.vault.withdraw_all(&alice(), &h.assets, &[0, 0], &h.env),
        Err(VaultError::TooSoon { .. })
    ));
    assert!(matches!(
        h.vault.withdraw_all(&bob(), &h.assets, &[0, 0], &h.env),
        Err(VaultError::TooSoon { .. })
    ));

    h.env.advance_blocks(4);
    assert_eq!(h.env.block_number(), moved_at + 5);
    h.vault
        .withdraw_all(&bob(), &h.assets, &[0, 0], &h.env)
        .unwrap();
    assert_eq!(h.vault.balance_of(&bob()).unwrap(), 0);
}

#[test]
fn two_half_withdrawals_match_one_full() {
    let full = harness();
    let halves = harness();
    for h in [&full, &halves] {
        h.deposit(&alice(), 10 * ONE);
        h.deposit(&bob(), 30 * ONE);
        h.cool_down();
    }

    let all = full
        .vault
        .withdraw_all(&alice(), &full.assets, &[0, 0], &full.env)
        .unwrap();

    let balance = halves.vault.balance_of(&alice()).unwrap();
    let first = halves
        .vault
        .withdraw_assets(&alice(), &halves.assets, balance / 2, &[0, 0], None, &halves.env)
        .unwrap();
    halves.cool_down();
    let second = halves
        .vault
        .withdraw_all(&alice(), &halves.assets, &[0, 0], &halves.env)
        .unwrap();

    for i in 0..2 {
        let split = first[i] + second[i];
        assert!(all[i].abs_diff(split) <= 2, "asset {i}: {} vs {split}", all[i]);
        assert!(first[i].abs_diff(all[i] / 2) <= 2);
    }
}

#[test]
fn withdraw_slippage_names_asset() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.cool_down();
    let before = h.vault.state().unwrap();

    let err = h
        .vault
        .withdraw_all(&alice(), &h.assets, &[0, 10 * ONE], &h.env)
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::SlippageExceeded { ref asset, min, .. } if asset == &h.assets[1] && min == 10 * ONE
    ));
    assert_eq!(h.vault.state().unwrap(), before);
    assert!(err.is_slippage());
}

#[test]
fn withdraw_input_errors() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.cool_down();
    assert!(matches!(
        h.vault
            .withdraw_assets(&alice(), &h.assets, 0, &[0, 0], None, &h.env),
        Err(VaultError::ZeroAmount)
    ));
    assert!(matches!(
        h.vault
            .withdraw_assets(&alice(), &h.assets, ONE, &[0], None, &h.env),
        Err(VaultError::LengthMismatch { .. })
    ));
    assert!(matches!(
        h.vault
            .withdraw_assets(&bob(), &h.assets, ONE, &[0, 0], None, &h.env),
        Err(VaultError::InsufficientBalance { available: 0, .. })
    ));
    assert!(matches!(
        h.vault
            .withdraw_assets(&Address::dead(), &h.assets, ONE, &[0, 0], None, &h.env),
        Err(VaultError::Unauthorized(_))
    ));
}

// ---------------------------------------------------------------------------
// Underlying Path
// ---------------------------------------------------------------------------

#[test]
fn underlying_deposit_and_withdraw() {
    let h = harness();
    let lp = vec![h.lp.clone()];

    let preview = h.vault.preview_deposit_assets(&lp, &[10 * ONE]).unwrap();
    let receipt = h
        .vault
        .deposit_assets(&alice(), &lp, &[10 * ONE], 0, None, &h.env)
        .unwrap();
    // 10 LP splits into 5 A + 5 B, priced at $500.
    assert_eq!(receipt.shares_minted, 500 * ONE - INITIAL_SHARES);
    assert_eq!(receipt.shares_minted, preview.shares_out);
    assert_eq!(receipt.value, 10 * ONE);
    assert_eq!(h.asset_balance(&h.lp, &alice()), 90 * ONE);

    h.cool_down();
    let out = h
        .vault
        .withdraw_all(&alice(), &lp, &[9 * ONE], &h.env)
        .unwrap();
    let expected = mul_div_down(500 * ONE - INITIAL_SHARES, 10 * ONE, 500 * ONE).unwrap();
    assert_eq!(out, vec![expected]);
    assert_eq!(h.asset_balance(&h.lp, &alice()), 90 * ONE + expected);
}

// ---------------------------------------------------------------------------
// Cap, Toggles, Queries
// ---------------------------------------------------------------------------

#[test]
fn cap_blocks_deposit_without_side_effects() {
    let h = harness();
    h.vault
        .set_max_supply(&h.governance, 1_500 * ONE)
        .unwrap();
    h.deposit(&alice(), 10 * ONE);
    let before = h.vault.state().unwrap();

    let err = h
        .vault
        .deposit_assets(&bob(), &h.assets, &[10 * ONE, 10 * ONE], 0, None, &h.env)
        .unwrap_err();
    assert!(matches!(err, VaultError::CapExceeded { cap, .. } if cap == 1_500 * ONE));
    assert_eq!(h.vault.state().unwrap(), before);
    assert_eq!(h.asset_balance(&h.assets[0], &bob()), 1_000 * ONE);
}

#[test]
fn stale_strategy_is_harvested_before_deposit() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.vault
        .with_strategy_mut(|s| s.accrue_rewards(&[ONE, ONE]))
        .unwrap();
    h.env.advance_time(MIN_HARDWORK_DELAY_SECS + 1);

    // Rewards compound before Bob is priced in, so he gets fewer shares.
    let minted = h.deposit(&bob(), 10 * ONE);
    assert_eq!(minted, mul_div_down(20 * ONE, 1_000 * ONE, 22 * ONE).unwrap());
    let last = h.vault.with_strategy_mut(|s| s.last_hard_work()).unwrap();
    assert_eq!(last, h.env.timestamp());
}

#[test]
fn disabled_toggle_skips_harvest() {
    let h = harness();
    h.vault
        .set_do_hard_work_on_deposit(&h.governance, false)
        .unwrap();
    let before = h.vault.with_strategy_mut(|s| s.last_hard_work()).unwrap();
    h.env.advance_time(MIN_HARDWORK_DELAY_SECS + 1);
    h.deposit(&alice(), 10 * ONE);
    assert_eq!(h.vault.with_strategy_mut(|s| s.last_hard_work()).unwrap(), before);
}

#[test]
fn apr_weights_asset_yield_by_proportion() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.aprs.set_apr(h.assets[0].clone(), ONE / 10);

    let report = h.vault.get_apr().unwrap();
    assert_eq!(report.strategy_apr, 0);
    assert_eq!(report.asset_aprs, vec![ONE / 10, 0]);
    // 10% on half the book.
    assert_eq!(report.total_apr, ONE / 20);
}

#[test]
fn untrusted_feed_flows_through_tvl() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    assert_eq!(h.vault.tvl().unwrap(), (1_000 * ONE, true));
    h.prices.set_trusted(h.assets[1].clone(), false);
    assert_eq!(h.vault.tvl().unwrap(), (1_000 * ONE, false));
}

#[test]
fn events_record_deposit_and_withdraw() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.cool_down();
    h.vault
        .withdraw_all(&alice(), &h.assets, &[0, 0], &h.env)
        .unwrap();

    let events = h.vault.take_events().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        VaultEvent::DepositAssets { account, minted, .. }
            if account == &alice() && *minted == 1_000 * ONE - INITIAL_SHARES
    ));
    assert!(matches!(&events[1], VaultEvent::WithdrawAssets { sender, .. } if sender == &alice()));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn state_round_trips_through_store() {
    let h = harness();
    h.deposit(&alice(), 10 * ONE);
    h.vault.set_max_supply(&h.governance, 5_000 * ONE).unwrap();

    let store = VaultStore::open_temporary().unwrap();
    h.vault.save(&store).unwrap();

    let strategy = h.vault.with_strategy_mut(|s| s.clone()).unwrap();
    let bank = h.vault.with_bank(|b| b.clone()).unwrap();
    let restored = Vault::load(
        &store,
        h.vault.address(),
        strategy,
        bank,
        h.policy.clone(),
        h.prices.clone(),
    )
    .unwrap()
    .unwrap();

    assert_eq!(restored.state().unwrap(), h.vault.state().unwrap());
    assert_eq!(restored.max_supply().unwrap(), 5_000 * ONE);
    assert_eq!(restored.tvl().unwrap(), h.vault.tvl().unwrap());
}

#[test]
fn loading_with_another_strategy_fails() {
    let h = harness();
    let store = VaultStore::open_temporary().unwrap();
    h.vault.save(&store).unwrap();

    let stranger = SimStrategy::new(addr("0x5f"), h.assets.clone(), vec![ONE, ONE]);
    let result = Vault::load(
        &store,
        h.vault.address(),
        stranger,
        MemoryBank::new(),
        h.policy.clone(),
        h.prices.clone(),
    );
    assert!(matches!(result, Err(VaultError::StrategyMismatch { .. })));
}

// ---------------------------------------------------------------------------
// Reentrancy
// ---------------------------------------------------------------------------

/// A price feed that calls back into the vault it is pricing for.
struct ReentrantOracle {
    prices: FixedPriceOracle,
    vault: OnceLock<Weak<TestVault>>,
    observed: Mutex<Option<Result<Amount, String>>>,
}

impl PriceOracle for ReentrantOracle {
    fn get_assets_price(
        &self,
        assets: &[AssetId],
        amounts: &[Amount],
    ) -> Result<AssetsPrice, OracleError> {
        if let Some(vault) = self.vault.get().and_then(Weak::upgrade) {
            let seen = vault
                .set_max_supply(&addr("0x0000000000000000000000000000000000000060"), 1)
                .map(|_| 1)
                .map_err(|e| e.to_string());
            *self.observed.lock() = Some(seen);
        }
        self.prices.get_assets_price(assets, amounts)
    }
}

#[test]
fn reentrant_call_is_rejected() {
    let base = harness();
    let oracle = Arc::new(ReentrantOracle {
        prices: FixedPriceOracle::with_prices(
            base.assets.iter().cloned().map(|a| (a, ASSET_PRICE)),
        ),
        vault: OnceLock::new(),
        observed: Mutex::new(None),
    });

    let strategy = base.vault.with_strategy_mut(|s| s.clone()).unwrap();
    let bank = base.vault.with_bank(|b| b.clone()).unwrap();
    let vault = Arc::new(Vault::new(
        multivault_contracts::VaultConfig {
            address: addr("0x7b"),
            name: "Reentrant".into(),
            symbol: "RE".into(),
        },
        strategy,
        bank,
        base.policy.clone(),
        oracle.clone(),
    ));
    let _ = oracle.vault.set(Arc::downgrade(&vault));

    // The bootstrap deposit prices through the oracle while the vault is busy.
    vault
        .deposit_assets(&alice(), &base.assets, &[10 * ONE, 10 * ONE], 0, None, &base.env)
        .unwrap();

    let observed = oracle.observed.lock().clone();
    assert_eq!(
        observed,
        Some(Err(VaultError::Reentrancy.to_string()))
    );
    // The nested call changed nothing.
    assert_eq!(vault.max_supply().unwrap(), 0);
}
