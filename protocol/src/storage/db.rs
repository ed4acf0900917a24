//! # VaultStore: Durable Vault State
//!
//! The persistence layer for vault state, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                  | Value                         |
//! |------------|----------------------|-------------------------------|
//! | `vaults`   | vault address (UTF-8)| `bincode(StoredRecord)`       |
//! | `metadata` | key (UTF-8)          | value (bytes)                 |
//!
//! ## Schema Versions
//!
//! Every record is wrapped in a [`StoredRecord`] envelope carrying the
//! schema version it was written with. Loading a record written by an older
//! layout runs it through [`migrate`] first; loading one written by a newer
//! layout fails with [`StoreError::UnsupportedSchema`] rather than guessing.
//! This keeps the field layout stable across releases without any
//! location-hashing tricks.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;

use crate::config::VAULT_SCHEMA_VERSION;
use crate::types::Address;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedSchema { found: u16, supported: u16 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Well-known key in the `metadata` tree for the last block a snapshot covers.
const META_LAST_BLOCK: &[u8] = b"last_snapshot_block";

/// Versioned envelope around a serialized vault state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub schema_version: u16,
    pub payload: Vec<u8>,
}

/// Upgrades a payload written with `from_version` to the current layout.
///
/// Only version 1 exists so far; new layouts add an arm here that rewrites
/// the old payload before it reaches `bincode::deserialize`.
pub fn migrate(from_version: u16, payload: Vec<u8>) -> StoreResult<Vec<u8>> {
    match from_version {
        VAULT_SCHEMA_VERSION => Ok(payload),
        found => Err(StoreError::UnsupportedSchema {
            found,
            supported: VAULT_SCHEMA_VERSION,
        }),
    }
}

// ---------------------------------------------------------------------------
// VaultStore
// ---------------------------------------------------------------------------

/// Persistent storage for vault state snapshots.
///
/// # Thread Safety
///
/// sled is thread-safe; `VaultStore` can be shared via `Arc<VaultStore>`
/// without external synchronization.
#[derive(Debug, Clone)]
pub struct VaultStore {
    db: Db,
    vaults: Tree,
    metadata: Tree,
}

impl VaultStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that is removed when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let vaults = db.open_tree("vaults")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            vaults,
            metadata,
        })
    }

    /// Persist a vault state under the current schema version and flush.
    pub fn put_vault<T: Serialize>(&self, vault: &Address, state: &T) -> StoreResult<()> {
        let payload =
            bincode::serialize(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let record = StoredRecord {
            schema_version: VAULT_SCHEMA_VERSION,
            payload,
        };
        self.put_record(vault, &record)
    }

    /// Persist a pre-built envelope as-is. Used by migration tooling.
    pub fn put_record(&self, vault: &Address, record: &StoredRecord) -> StoreResult<()> {
        let bytes =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let size = bytes.len();
        self.vaults.insert(vault.as_str().as_bytes(), bytes)?;
        self.db.flush()?;
        debug!(vault = %vault, schema = record.schema_version, size, "vault state persisted");
        Ok(())
    }

    /// Load a vault state, migrating older layouts.
    ///
    /// Returns `None` if the vault was never persisted.
    pub fn get_vault<T: DeserializeOwned>(&self, vault: &Address) -> StoreResult<Option<T>> {
        let bytes = match self.vaults.get(vault.as_str().as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let record: StoredRecord =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let payload = migrate(record.schema_version, record.payload)?;
        let state =
            bincode::deserialize(&payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(state))
    }

    /// Addresses of every persisted vault, in key order.
    pub fn list_vaults(&self) -> StoreResult<Vec<Address>> {
        let mut out = Vec::new();
        for entry in self.vaults.iter() {
            let (key, _) = entry?;
            let raw = std::str::from_utf8(&key)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            out.push(Address::new(raw));
        }
        Ok(out)
    }

    pub fn remove_vault(&self, vault: &Address) -> StoreResult<bool> {
        Ok(self.vaults.remove(vault.as_str().as_bytes())?.is_some())
    }

    // -- Metadata operations ------------------------------------------------

    /// Record the block height the latest snapshot reflects.
    pub fn set_last_block(&self, block: u64) -> StoreResult<()> {
        self.metadata.insert(META_LAST_BLOCK, &block.to_be_bytes())?;
        Ok(())
    }

    /// The block height of the latest snapshot, if any.
    pub fn last_block(&self) -> StoreResult<Option<u64>> {
        match self.metadata.get(META_LAST_BLOCK)? {
            Some(bytes) => {
                let height = u64::from_be_bytes(
                    bytes
                        .as_ref()
                        .try_into()
                        .map_err(|_| StoreError::Serialization("invalid height bytes".into()))?,
                );
                Ok(Some(height))
            }
            None => Ok(None),
        }
    }
}
