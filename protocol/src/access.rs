//! # Access Policy
//!
//! Privileged vault calls ask an injected [`AccessPolicy`] instead of
//! looking up a global platform contract. The policy answers four
//! questions: is this caller an operator, is it governance, is it the
//! platform's hard worker, and is this vault allowed to take deposits.
//!
//! [`StaticAccessPolicy`] is the in-process implementation used by the
//! devnet node and the tests. Its sets live behind a `RwLock` so that a
//! shared `Arc<StaticAccessPolicy>` can be reconfigured at runtime.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Lifecycle status of a vault as reported by the vault registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Accepting deposits and withdrawals.
    #[default]
    Active,
    /// Withdraw-only. No new capital.
    Deprecated,
    /// Emergency exit only. No new capital.
    EmergencyExit,
    /// Not registered or switched off.
    Disabled,
}

impl VaultStatus {
    /// Only active vaults accept deposits. Every status permits withdrawal.
    pub fn allows_deposits(&self) -> bool {
        matches!(self, VaultStatus::Active)
    }
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultStatus::Active => write!(f, "Active"),
            VaultStatus::Deprecated => write!(f, "Deprecated"),
            VaultStatus::EmergencyExit => write!(f, "EmergencyExit"),
            VaultStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Capability checks for privileged vault calls.
pub trait AccessPolicy: Send + Sync {
    fn is_operator(&self, account: &Address) -> bool;

    fn is_governance(&self, account: &Address) -> bool;

    /// `true` for the platform's batch harvester contract.
    fn is_hard_worker(&self, account: &Address) -> bool;

    fn vault_status(&self, vault: &Address) -> VaultStatus;
}

// ---------------------------------------------------------------------------
// StaticAccessPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PolicySets {
    operators: BTreeSet<Address>,
    governance: BTreeSet<Address>,
    hard_worker: Option<Address>,
    statuses: BTreeMap<Address, VaultStatus>,
}

/// In-process [`AccessPolicy`]. Unknown vaults report [`VaultStatus::Active`].
#[derive(Debug, Default)]
pub struct StaticAccessPolicy {
    sets: RwLock<PolicySets>,
}

impl StaticAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: a policy with one governance account and one hard worker.
    pub fn with_roles(governance: Address, hard_worker: Address) -> Self {
        let policy = Self::new();
        policy.add_governance(governance);
        policy.set_hard_worker(hard_worker);
        policy
    }

    pub fn add_operator(&self, account: Address) {
        self.sets.write().operators.insert(account);
    }

    pub fn remove_operator(&self, account: &Address) {
        self.sets.write().operators.remove(account);
    }

    pub fn add_governance(&self, account: Address) {
        self.sets.write().governance.insert(account);
    }

    pub fn set_hard_worker(&self, account: Address) {
        self.sets.write().hard_worker = Some(account);
    }

    pub fn set_vault_status(&self, vault: Address, status: VaultStatus) {
        self.sets.write().statuses.insert(vault, status);
    }
}

impl AccessPolicy for StaticAccessPolicy {
    fn is_operator(&self, account: &Address) -> bool {
        self.sets.read().operators.contains(account)
    }

    fn is_governance(&self, account: &Address) -> bool {
        self.sets.read().governance.contains(account)
    }

    fn is_hard_worker(&self, account: &Address) -> bool {
        self.sets.read().hard_worker.as_ref() == Some(account)
    }

    fn vault_status(&self, vault: &Address) -> VaultStatus {
        self.sets
            .read()
            .statuses
            .get(vault)
            .copied()
            .unwrap_or_default()
    }
}
