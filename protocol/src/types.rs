//! # Core Types
//!
//! Addresses, amounts, and the execution environment a vault call runs in.
//!
//! Addresses are EVM-style `0x`-prefixed, 20-byte hex strings, normalized to
//! lowercase on construction so that `0xABC..` and `0xabc..` are the same
//! account in every map that keys on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-point token or value amount. 18 decimals unless stated otherwise.
pub type Amount = u128;

/// Assets are identified by their token contract address.
pub type AssetId = Address;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An account, contract, or asset address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an address string, lowercasing it.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// The unrecoverable share sink.
    pub fn dead() -> Self {
        Self::new(crate::config::DEAD_ADDRESS)
    }

    /// Returns `true` for the share sink.
    pub fn is_dead(&self) -> bool {
        self.0 == crate::config::DEAD_ADDRESS
    }

    /// Deterministically derives an address from a domain tag and a seed.
    ///
    /// `0x || hex(blake3(domain || seed)[..20])`. Used for automation relay
    /// addresses, which must be reproducible by anyone who knows the owner.
    pub fn derive(domain: &[u8], seed: &Address) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(seed.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..20])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Execution Environment
// ---------------------------------------------------------------------------

/// The host a vault call executes in: block height, wall time, and gas.
///
/// Methods take `&self`; gas accounting uses interior mutability so that a
/// strategy can meter its own work through the same shared reference the
/// vault reads `gas_left` from.
pub trait ExecutionEnv: Send + Sync {
    /// Current block number.
    fn block_number(&self) -> u64;

    /// Current block timestamp, unix seconds.
    fn timestamp(&self) -> u64;

    /// Price of one gas unit in native currency (wei-like units).
    fn gas_price(&self) -> u128;

    /// Gas remaining in the current call.
    fn gas_left(&self) -> u64;

    /// Charges `units` of gas to the current call. Saturates at zero.
    fn consume_gas(&self, units: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_case_insensitive() {
        let a = Address::new("0xAbCdEf0000000000000000000000000000000001");
        let b = Address::new("0xabcdef0000000000000000000000000000000001");
        assert_eq!(a, b);
    }

    #[test]
    fn dead_address_is_recognized() {
        assert!(Address::dead().is_dead());
        assert!(!Address::new("0x01").is_dead());
    }

    #[test]
    fn derived_addresses_are_deterministic() {
        let owner = Address::new("0x00000000000000000000000000000000000000aa");
        let a = Address::derive(b"domain", &owner);
        let b = Address::derive(b"domain", &owner);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 42);
        assert!(a.as_str().starts_with("0x"));
    }

    #[test]
    fn derived_addresses_depend_on_domain_and_seed() {
        let owner = Address::new("0xaa");
        let other = Address::new("0xbb");
        assert_ne!(Address::derive(b"one", &owner), Address::derive(b"two", &owner));
        assert_ne!(Address::derive(b"one", &owner), Address::derive(b"one", &other));
    }

    #[test]
    fn address_serializes_as_plain_string() {
        let a = Address::new("0xAA");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"0xaa\"");
    }
}
