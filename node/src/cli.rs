//! # CLI Interface
//!
//! Command-line arguments for `multivault-node`, built with `clap` derive.
//! Four subcommands: `run`, `init`, `status`, and `version`.
//!
//! Every `run` flag is optional. A flag that is set overrides the matching
//! field of the JSON config file; see [`crate::config::NodeConfig::apply_overrides`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MultiVault devnet node.
///
/// Runs a simulated multi-asset vault behind an HTTP API, drives its
/// harvests from a keeper loop, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "multivault-node",
    about = "MultiVault devnet node",
    version,
    propagate_version = true
)]
pub struct MultiVaultCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and write a default `config.json`.
    Init(InitArgs),
    /// Query a running node's `/status` endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (JSON).
    ///
    /// When omitted, the node looks for `config.json` in the data directory
    /// and falls back to built-in defaults if there is none.
    #[arg(long, short = 'c', env = "MULTIVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the config file and the vault store.
    #[arg(long, short = 'd', env = "MULTIVAULT_DATA_DIR", default_value = "./.multivault")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "MULTIVAULT_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "MULTIVAULT_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Seconds between keeper harvest batches.
    #[arg(long, env = "MULTIVAULT_KEEPER_INTERVAL")]
    pub keeper_interval_secs: Option<u64>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "MULTIVAULT_LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "MULTIVAULT_DATA_DIR", default_value = "./.multivault")]
    pub data_dir: PathBuf,

    /// Network label written into the config.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Overwrite an existing `config.json`.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node's API.
    #[arg(long, env = "MULTIVAULT_RPC_URL", default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        MultiVaultCli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_optional_overrides() {
        let cli = MultiVaultCli::try_parse_from(["multivault-node", "run", "--rpc-port", "7000"])
            .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, Some(7000));
                assert_eq!(args.metrics_port, None);
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
