//! # Protocol Configuration & Constants
//!
//! Every magic number in MultiVault lives here. These values are fixed at
//! build time on purpose: a vault whose cool-down or bootstrap size can be
//! changed at runtime is a vault whose share price can be gamed at runtime.
//!
//! Runtime knobs (ports, keeper intervals, the devnet asset list) belong to
//! the node's configuration file, not here.

/// Fixed-point precision used for prices, share prices and APR ratios.
/// 1e18 = 1.0, the same scale as an 18-decimal ERC-20.
pub const PRICE_PRECISION: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Share Bootstrap
// ---------------------------------------------------------------------------

/// Shares minted to [`DEAD_ADDRESS`] on the first deposit into an empty vault.
///
/// They can never be redeemed, so the share-to-value ratio survives even
/// when every real holder exits.
pub const INITIAL_SHARES: u128 = 1_000_000_000_000_000;

/// The first deposit must be priced at least `INITIAL_SHARES * INITIAL_DEPOSIT_MULTIPLIER`.
pub const INITIAL_DEPOSIT_MULTIPLIER: u128 = 1_000;

/// Minimum USD value (18 decimals) of the very first deposit. $1.
pub const MIN_INITIAL_DEPOSIT: u128 = INITIAL_SHARES * INITIAL_DEPOSIT_MULTIPLIER;

/// The unrecoverable sink for [`INITIAL_SHARES`]. Nobody signs as this address.
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Blocks that must pass between a balance-affecting event on an account
/// and a withdrawal by that account.
pub const WITHDRAW_DELAY_BLOCKS: u64 = 5;

/// Seconds since the strategy's last harvest before a deposit triggers one.
pub const MIN_HARDWORK_DELAY_SECS: u64 = 3_600;

// ---------------------------------------------------------------------------
// Hard Work
// ---------------------------------------------------------------------------

/// Vaults with a TVL below this (USD, 18 decimals) refuse to harvest when
/// they cannot pay the harvester's gas. $100.
pub const MIN_TVL_FOR_UNCOMPENSATED_HARDWORK: u128 = 100 * PRICE_PRECISION;

/// Default cap on vaults harvested by a single batch call.
pub const DEFAULT_MAX_HW_PER_CALL: usize = 5;

/// Domain separator for automation relay address derivation.
pub const RELAY_DERIVATION_DOMAIN: &[u8] = b"multivault/relay";

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Current persisted layout of `VaultState`. Bump on any field change and
/// add a migration arm in `storage::db`.
pub const VAULT_SCHEMA_VERSION: u16 = 1;

/// Events kept in a vault's in-state journal before the oldest are dropped.
pub const MAX_EVENT_JOURNAL: usize = 1_024;

/// Protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_initial_deposit_is_one_dollar() {
        assert_eq!(MIN_INITIAL_DEPOSIT, PRICE_PRECISION);
    }

    #[test]
    fn test_initial_shares_below_min_deposit() {
        // The sink must never swallow the whole first deposit.
        assert!(INITIAL_SHARES < MIN_INITIAL_DEPOSIT);
    }

    #[test]
    fn test_dead_address_is_lowercase_hex() {
        let hex_part = DEAD_ADDRESS.strip_prefix("0x").unwrap();
        assert_eq!(hex_part.len(), 40);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_timing_constants_sanity() {
        assert!(WITHDRAW_DELAY_BLOCKS > 0);
        assert!(MIN_HARDWORK_DELAY_SECS > 0);
        assert!(DEFAULT_MAX_HW_PER_CALL > 0);
    }
}
