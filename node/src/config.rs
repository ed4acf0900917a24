//! # Node Configuration
//!
//! Runtime configuration for the devnet node, stored as `config.json` in
//! the data directory. Every field has a default, so a partial file (or no
//! file at all) yields a working node. CLI flags override the file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use multivault_protocol::config::PRICE_PRECISION;
use multivault_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// File name looked up inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

const ONE: Amount = PRICE_PRECISION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Network label reported by `/status`.
    pub network: String,
    pub rpc_port: u16,
    pub metrics_port: u16,
    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Wall-clock milliseconds per simulated block.
    pub block_time_ms: u64,
    /// Simulated gas price, native units per gas.
    pub gas_price: u64,
    pub keeper_interval_secs: u64,
    pub vault: VaultSection,
    pub roles: RolesSection,
}

/// The single simulated vault the node serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub assets: Vec<AssetSection>,
    /// LP token the strategy can take in place of the basket.
    pub underlying: Option<Address>,
    /// Account that backs underlying conversions.
    pub pool: Address,
    /// Accounts credited with `faucet_amount` of every asset at startup.
    pub faucet_accounts: Vec<Address>,
    pub faucet_amount: Amount,
    /// Rewards per asset queued before each keeper harvest.
    pub reward_per_harvest: Amount,
    /// Native currency the vault starts with for gas reimbursement.
    pub native_float: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSection {
    pub address: Address,
    /// USD price, 18 decimals.
    pub price: Amount,
    /// Strategy value of one token, 18 decimals.
    pub unit_value: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesSection {
    pub governance: Address,
    pub operators: Vec<Address>,
    /// Address of the batch harvester, as vaults see it.
    pub hard_worker: Address,
    /// Owner of the batch harvester.
    pub owner: Address,
    /// Account the keeper loop calls the harvester from.
    pub dedicated_server: Address,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: "devnet".into(),
            rpc_port: 9841,
            metrics_port: 9842,
            log_level: crate::logging::DEFAULT_RUN_FILTER.into(),
            log_format: "pretty".into(),
            block_time_ms: 2_000,
            gas_price: 1_000_000_000,
            keeper_interval_secs: 60,
            vault: VaultSection::default(),
            roles: RolesSection::default(),
        }
    }
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            address: Address::new("0x00000000000000000000000000000000000a0001"),
            name: "MultiVault WETH-USDC".into(),
            symbol: "mvWETHUSDC".into(),
            assets: vec![
                AssetSection {
                    address: Address::new("0x00000000000000000000000000000000000e0001"),
                    price: 2_000 * ONE,
                    unit_value: ONE,
                },
                AssetSection {
                    address: Address::new("0x00000000000000000000000000000000000e0002"),
                    price: ONE,
                    unit_value: ONE / 2_000,
                },
            ],
            underlying: Some(Address::new("0x00000000000000000000000000000000000e00f0")),
            pool: Address::new("0x00000000000000000000000000000000000e00f1"),
            faucet_accounts: vec![
                Address::new("0x00000000000000000000000000000000000000a1"),
                Address::new("0x00000000000000000000000000000000000000b0"),
            ],
            faucet_amount: 1_000_000 * ONE,
            reward_per_harvest: 0,
            native_float: ONE,
        }
    }
}

impl Default for RolesSection {
    fn default() -> Self {
        Self {
            governance: Address::new("0x0000000000000000000000000000000000000060"),
            operators: Vec::new(),
            hard_worker: Address::new("0x0000000000000000000000000000000000000077"),
            owner: Address::new("0x0000000000000000000000000000000000000070"),
            dedicated_server: Address::new("0x00000000000000000000000000000000000005e5"),
        }
    }
}

impl NodeConfig {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: NodeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config for `run`: the explicit path if given, else
    /// `config.json` in the data directory, else defaults.
    pub fn resolve(explicit: Option<&Path>, data_dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path(data_dir);
                if path.exists() {
                    Self::load(&path)
                } else {
                    tracing::warn!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE_NAME)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Applies the CLI flags that were set.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(port) = args.rpc_port {
            self.rpc_port = port;
        }
        if let Some(port) = args.metrics_port {
            self.metrics_port = port;
        }
        if let Some(secs) = args.keeper_interval_secs {
            self.keeper_interval_secs = secs;
        }
        if let Some(format) = &args.log_format {
            self.log_format = format.clone();
        }
    }

    /// Rejects configs the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.vault.assets.is_empty() {
            bail!("vault.assets must list at least one asset");
        }
        if let Some(asset) = self
            .vault
            .assets
            .iter()
            .find(|a| a.price == 0 || a.unit_value == 0)
        {
            bail!("asset {} needs a non-zero price and unit_value", asset.address);
        }
        if self.block_time_ms == 0 {
            bail!("block_time_ms must be non-zero");
        }
        if self.keeper_interval_secs == 0 {
            bail!("keeper_interval_secs must be non-zero");
        }
        if self.rpc_port == self.metrics_port {
            bail!("rpc_port and metrics_port must differ");
        }
        Ok(())
    }
}
