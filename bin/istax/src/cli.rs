use std::path::PathBuf;
use std::time::Duration;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use istax_deploy::ReceiptPolling;
use tracing::level_filters::LevelFilter;

/// The default JSON-RPC endpoint (a local development node).
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
/// The default directory holding compiled contract artifacts.
const DEFAULT_ARTIFACTS_DIR: &str = "build/contracts";
/// The default directory holding the checkpoint and the deployment report.
const DEFAULT_STATE_DIR: &str = "istax-state";

#[derive(Parser)]
#[command(name = "istax")]
#[command(
    author,
    version,
    about = "Deploy and wire the iStax contract suite: reward token, issuer, pool tokens and markets"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "ISTAX_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write the default deployment configuration as TOML.
    Init(InitArgs),
    /// Validate the configuration and print the ordered step list.
    Plan(PlanArgs),
    /// Execute the deployment, resuming from the checkpoint if one exists.
    Deploy(DeployArgs),
    /// Print the checkpoint (and report, once complete) of a state directory.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Where to write the configuration. A directory receives an `iStax.toml`.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Path to the deployment configuration (file, or directory containing `iStax.toml`).
    ///
    /// If not provided, `./iStax.toml` is used when present, built-in defaults otherwise.
    #[arg(long, alias = "conf", env = "ISTAX_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Path to the deployment configuration (file, or directory containing `iStax.toml`).
    #[arg(long, alias = "conf", env = "ISTAX_CONFIG")]
    pub config: Option<PathBuf>,

    /// The URL of the JSON-RPC endpoint of the target chain.
    #[arg(long, alias = "rpc", env = "ISTAX_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Directory containing the compiled contract artifacts (`<Contract>.json`).
    #[arg(long, env = "ISTAX_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Directory holding the checkpoint and the deployment report.
    #[arg(long, env = "ISTAX_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// The sending account. If not provided, the node's first account is used.
    #[arg(long, env = "ISTAX_FROM")]
    pub from: Option<Address>,

    /// Discard (archive) an existing checkpoint and start from the first step.
    #[arg(long, env = "ISTAX_FRESH")]
    pub fresh: bool,

    /// Rehearse the deployment against a simulated chain, in a throwaway state directory.
    #[arg(long, env = "ISTAX_DRY_RUN")]
    pub dry_run: bool,

    /// Explicit gas limit for every transaction. If not provided, the node estimates it.
    #[arg(long, env = "ISTAX_GAS_LIMIT")]
    pub gas_limit: Option<u64>,

    /// Seconds between two receipt lookups.
    #[arg(long, env = "ISTAX_POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Receipt lookups before a transaction is considered lost.
    #[arg(long, env = "ISTAX_POLL_ATTEMPTS", default_value_t = 150)]
    pub poll_attempts: usize,
}

impl DeployArgs {
    pub fn polling(&self) -> ReceiptPolling {
        ReceiptPolling {
            interval: Duration::from_secs(self.poll_interval),
            max_attempts: self.poll_attempts,
        }
    }
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory holding the checkpoint and the deployment report.
    #[arg(long, env = "ISTAX_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,
}
