// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MultiVault Protocol: Core Library
//!
//! Everything a MultiVault vault needs that is not the vault itself. The
//! vault engine lives in `multivault-contracts`; this crate gives it the
//! vocabulary and the seams it plugs into.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants. Share bootstrap, cool-downs, harvest thresholds.
//! - **types**: Addresses, amounts, and the execution environment (blocks, time, gas).
//! - **math**: 256-bit intermediate `mul_div`. Money math never wraps.
//! - **strategy**: The interface every yield strategy implements.
//! - **oracle**: Asset pricing and APR lookups.
//! - **access**: Capability checks and vault status gating.
//! - **bank**: Custody of fungible assets and native currency.
//! - **sim**: In-memory reference collaborators for tests and devnet.
//! - **storage**: Durable vault state on sled.
//!
//! ## Design Philosophy
//!
//! 1. Collaborators are traits injected at construction. No global lookups.
//! 2. All amounts are `u128` in 18-decimal fixed point. No floats, ever.
//! 3. If it touches money, it has tests. Plural.

pub mod access;
pub mod bank;
pub mod config;
pub mod math;
pub mod oracle;
pub mod sim;
pub mod storage;
pub mod strategy;
pub mod types;

pub use types::{Address, Amount, AssetId, ExecutionEnv};
