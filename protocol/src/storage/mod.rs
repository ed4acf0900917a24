//! # Storage Module
//!
//! Durable vault state. A vault's balances, supply, cap, withdraw markers
//! and toggles must survive restarts; this module is where they land.
//!
//! ```text
//! db.rs: sled trees, versioned bincode envelopes, schema migration hook
//! ```
//!
//! Bincode for on-disk serialization: compact, fast, deterministic. JSON is
//! for APIs and debugging.

pub mod db;

pub use db::{StoreError, StoreResult, StoredRecord, VaultStore};
