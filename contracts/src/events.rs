//! Vault events.
//!
//! Each successful entry point appends one or more [`VaultEvent`]s to the
//! vault's bounded journal. Hosts drain it with `Vault::take_events`.

use std::collections::VecDeque;

use multivault_protocol::config::MAX_EVENT_JOURNAL;
use multivault_protocol::{Address, Amount, AssetId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultEvent {
    DepositAssets {
        account: Address,
        assets: Vec<AssetId>,
        amounts: Vec<Amount>,
        minted: Amount,
    },
    WithdrawAssets {
        sender: Address,
        receiver: Address,
        assets: Vec<AssetId>,
        shares: Amount,
        amounts: Vec<Amount>,
    },
    HardWorkGas {
        gas_used: u64,
        gas_cost: Amount,
        compensated: bool,
    },
    MaxSupplyChanged {
        max_supply: Amount,
    },
    DoHardWorkOnDepositChanged {
        enabled: bool,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
}

/// A bounded FIFO of emitted events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventJournal {
    entries: VecDeque<VaultEvent>,
}

impl EventJournal {
    /// Appends an event, dropping the oldest once the journal is full.
    pub fn push(&mut self, event: VaultEvent) {
        if self.entries.len() == MAX_EVENT_JOURNAL {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Removes and returns everything recorded so far, oldest first.
    pub fn drain(&mut self) -> Vec<VaultEvent> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&VaultEvent> {
        self.entries.back()
    }
}
