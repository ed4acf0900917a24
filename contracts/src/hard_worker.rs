//! # HardWorker: Batch Harvester
//!
//! Keepers do not call vaults one by one. They call the HardWorker with a
//! list of vaults and it harvests them in order, up to a per-call cap.
//!
//! ## Permissions
//!
//! Two kinds of caller may trigger a batch:
//!
//! 1. **Dedicated servers**: a fixed allow-set maintained by the owner.
//! 2. **The automation relay**: a single address derived from the owner
//!    with `blake3("multivault/relay" || owner)`. Anyone can recompute it,
//!    so an automation network can be pointed at it without a registry.
//!
//! ## Failure Policy
//!
//! The first vault whose harvest fails aborts the batch with
//! [`HardWorkerError::VaultFailed`]. Skipping failures would hide a broken
//! strategy behind a green keeper dashboard. Every vault is checkpointed
//! before its harvest, and a failure restores the vaults already harvested
//! in the batch, so an aborted batch leaves no trace.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use multivault_protocol::config::{DEFAULT_MAX_HW_PER_CALL, RELAY_DERIVATION_DOMAIN};
use multivault_protocol::{Address, Amount, ExecutionEnv};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::HardWorkerError;
use crate::vault::{Checkpoint, HardWorkTarget};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Initial configuration of a [`HardWorker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardWorkerConfig {
    /// The harvester's own address. Vaults see this as the caller.
    pub address: Address,
    pub owner: Address,
    pub max_hw_per_call: usize,
    pub dedicated_servers: Vec<Address>,
}

impl HardWorkerConfig {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            max_hw_per_call: DEFAULT_MAX_HW_PER_CALL,
            dedicated_servers: Vec::new(),
        }
    }
}

/// Summary of one batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Vaults harvested, in call order.
    pub harvested: Vec<Address>,
    /// Excluded vaults passed over.
    pub skipped: Vec<Address>,
    /// Native currency reimbursed to the harvester across the batch.
    pub compensated_total: Amount,
}

#[derive(Debug)]
struct Settings {
    max_hw_per_call: usize,
    dedicated_servers: BTreeSet<Address>,
    relay: Option<Address>,
    excluded_vaults: BTreeSet<Address>,
}

// ---------------------------------------------------------------------------
// HardWorker
// ---------------------------------------------------------------------------

/// The batch harvester. Settings sit behind a lock so one `Arc<HardWorker>`
/// can serve the keeper loop and admin calls at once.
#[derive(Debug)]
pub struct HardWorker {
    address: Address,
    owner: Address,
    settings: RwLock<Settings>,
}

impl HardWorker {
    /// # Errors
    ///
    /// [`HardWorkerError::InvalidConfig`] if `max_hw_per_call` is zero.
    pub fn new(config: HardWorkerConfig) -> Result<Self, HardWorkerError> {
        if config.max_hw_per_call == 0 {
            return Err(HardWorkerError::InvalidConfig(
                "max_hw_per_call must be non-zero".into(),
            ));
        }
        Ok(Self {
            address: config.address,
            owner: config.owner,
            settings: RwLock::new(Settings {
                max_hw_per_call: config.max_hw_per_call,
                dedicated_servers: config.dedicated_servers.into_iter().collect(),
                relay: None,
                excluded_vaults: BTreeSet::new(),
            }),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn max_hw_per_call(&self) -> usize {
        self.settings.read().max_hw_per_call
    }

    /// The relay address if automation is enabled.
    pub fn relay(&self) -> Option<Address> {
        self.settings.read().relay.clone()
    }

    /// The relay address this harvester's owner maps to.
    pub fn derive_relay(owner: &Address) -> Address {
        Address::derive(RELAY_DERIVATION_DOMAIN, owner)
    }

    pub fn is_dedicated_server(&self, account: &Address) -> bool {
        self.settings.read().dedicated_servers.contains(account)
    }

    pub fn is_excluded(&self, vault: &Address) -> bool {
        self.settings.read().excluded_vaults.contains(vault)
    }

    /// Harvests `vaults` in order, skipping excluded ones, stopping after
    /// `max_hw_per_call` harvests.
    ///
    /// # Errors
    ///
    /// [`HardWorkerError::Unauthorized`] unless `caller` is a dedicated
    /// server or the relay; [`HardWorkerError::VaultFailed`] for the first
    /// vault whose harvest fails, after the vaults harvested before it are
    /// restored.
    pub fn call(
        &self,
        caller: &Address,
        vaults: &[Arc<dyn HardWorkTarget>],
        env: &dyn ExecutionEnv,
    ) -> Result<BatchReport, HardWorkerError> {
        let (max, excluded) = {
            let settings = self.settings.read();
            let relay_ok = settings.relay.as_ref() == Some(caller);
            if !relay_ok && !settings.dedicated_servers.contains(caller) {
                return Err(HardWorkerError::Unauthorized(format!(
                    "{caller} is not a dedicated server or the relay"
                )));
            }
            (settings.max_hw_per_call, settings.excluded_vaults.clone())
        };

        let mut report = BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            harvested: Vec::new(),
            skipped: Vec::new(),
            compensated_total: 0,
        };

        let mut staged: Vec<(&Arc<dyn HardWorkTarget>, Checkpoint)> = Vec::new();
        for vault in vaults {
            if report.harvested.len() >= max {
                break;
            }
            let address = vault.address().clone();
            if excluded.contains(&address) {
                report.skipped.push(address);
                continue;
            }
            let harvest = vault.checkpoint().and_then(|checkpoint| {
                vault
                    .do_hard_work(&self.address, env)
                    .map(|outcome| (checkpoint, outcome))
            });
            match harvest {
                Ok((checkpoint, outcome)) => {
                    if outcome.compensated {
                        report.compensated_total =
                            report.compensated_total.saturating_add(outcome.gas_cost);
                    }
                    staged.push((vault, checkpoint));
                    report.harvested.push(address);
                }
                Err(source) => {
                    warn!(
                        run_id = %report.run_id,
                        vault = %address,
                        error = %source,
                        rolled_back = staged.len(),
                        "batch aborted on vault failure"
                    );
                    Self::roll_back(&report.run_id, staged);
                    return Err(HardWorkerError::VaultFailed {
                        vault: address,
                        source,
                    });
                }
            }
        }

        info!(
            run_id = %report.run_id,
            harvested = report.harvested.len(),
            skipped = report.skipped.len(),
            compensated_total = report.compensated_total,
            "batch hard work complete"
        );
        Ok(report)
    }

    /// Restores harvested vaults, most recent first.
    fn roll_back(run_id: &Uuid, staged: Vec<(&Arc<dyn HardWorkTarget>, Checkpoint)>) {
        for (vault, checkpoint) in staged.into_iter().rev() {
            if let Err(e) = vault.restore(checkpoint) {
                error!(
                    %run_id,
                    vault = %vault.address(),
                    error = %e,
                    "failed to restore vault after aborted batch"
                );
            }
        }
    }

    // -- Owner administration -----------------------------------------------

    fn only_owner(&self, caller: &Address) -> Result<(), HardWorkerError> {
        if caller != &self.owner {
            return Err(HardWorkerError::Unauthorized(format!(
                "{caller} is not the owner"
            )));
        }
        Ok(())
    }

    pub fn set_max_hw_per_call(&self, caller: &Address, max: usize) -> Result<(), HardWorkerError> {
        self.only_owner(caller)?;
        if max == 0 {
            return Err(HardWorkerError::InvalidConfig(
                "max_hw_per_call must be non-zero".into(),
            ));
        }
        self.settings.write().max_hw_per_call = max;
        Ok(())
    }

    pub fn set_dedicated_server(
        &self,
        caller: &Address,
        server: Address,
        allowed: bool,
    ) -> Result<(), HardWorkerError> {
        self.only_owner(caller)?;
        let mut settings = self.settings.write();
        if allowed {
            settings.dedicated_servers.insert(server);
        } else {
            settings.dedicated_servers.remove(&server);
        }
        Ok(())
    }

    pub fn set_excluded_vault(
        &self,
        caller: &Address,
        vault: Address,
        excluded: bool,
    ) -> Result<(), HardWorkerError> {
        self.only_owner(caller)?;
        let mut settings = self.settings.write();
        if excluded {
            settings.excluded_vaults.insert(vault);
        } else {
            settings.excluded_vaults.remove(&vault);
        }
        Ok(())
    }

    /// Turns the automation relay on or off. Returns the relay address.
    pub fn enable_relay(
        &self,
        caller: &Address,
        enabled: bool,
    ) -> Result<Option<Address>, HardWorkerError> {
        self.only_owner(caller)?;
        let relay = enabled.then(|| Self::derive_relay(&self.owner));
        self.settings.write().relay = relay.clone();
        Ok(relay)
    }
}
