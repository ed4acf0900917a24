//! Simulated execution environment: a block clock and a gas meter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ExecutionEnv;

/// Seconds the simulated clock advances per block.
pub const SIM_BLOCK_TIME_SECS: u64 = 2;

/// Gas available to each call unless overridden. Mirrors a 30M block gas limit.
pub const SIM_CALL_GAS_LIMIT: u64 = 30_000_000;

/// Atomic block/time/gas counters. Shareable across threads by reference.
#[derive(Debug)]
pub struct SimEnv {
    block: AtomicU64,
    timestamp: AtomicU64,
    gas_price: AtomicU64,
    gas_left: AtomicU64,
}

impl SimEnv {
    pub fn new(block: u64, timestamp: u64) -> Self {
        Self {
            block: AtomicU64::new(block),
            timestamp: AtomicU64::new(timestamp),
            gas_price: AtomicU64::new(0),
            gas_left: AtomicU64::new(SIM_CALL_GAS_LIMIT),
        }
    }

    /// Moves the chain forward `blocks` blocks, advancing time accordingly.
    /// Returns the new block number.
    pub fn advance_blocks(&self, blocks: u64) -> u64 {
        self.timestamp
            .fetch_add(blocks * SIM_BLOCK_TIME_SECS, Ordering::SeqCst);
        self.block.fetch_add(blocks, Ordering::SeqCst) + blocks
    }

    /// Moves wall time forward without producing blocks.
    pub fn advance_time(&self, secs: u64) {
        self.timestamp.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set_gas_price(&self, price: u64) {
        self.gas_price.store(price, Ordering::SeqCst);
    }

    /// Refills the gas meter for the next call.
    pub fn reset_gas(&self) {
        self.gas_left.store(SIM_CALL_GAS_LIMIT, Ordering::SeqCst);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new(1, 1_700_000_000)
    }
}

impl ExecutionEnv for SimEnv {
    fn block_number(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }

    fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    fn gas_price(&self) -> u128 {
        self.gas_price.load(Ordering::SeqCst) as u128
    }

    fn gas_left(&self) -> u64 {
        self.gas_left.load(Ordering::SeqCst)
    }

    fn consume_gas(&self, units: u64) {
        let _ = self
            .gas_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                Some(left.saturating_sub(units))
            });
    }
}
