//! # Simulated Collaborators
//!
//! Reference implementations of every external interface the vault
//! consumes. Tests drive them directly; the devnet node wires them into a
//! live vault so the API has something real to talk to.
//!
//! ```text
//! env.rs     : block clock + gas meter (ExecutionEnv)
//! oracle.rs  : fixed price and APR tables (PriceOracle, AprOracle)
//! strategy.rs: constant-weight idle strategy (Strategy)
//! ```

pub mod env;
pub mod oracle;
pub mod strategy;

pub use env::SimEnv;
pub use oracle::{FixedAprOracle, FixedPriceOracle};
pub use strategy::SimStrategy;
