//! # CLI Interface
//!
//! Defines the command-line argument structure for `kipu-node` using
//! `clap` derive. Two subcommands: `run` and `version`.
//!
//! Amounts accept anything [`kipu_protocol::units::parse_amount`] does, so
//! `--bank-cap "1 ether"` and `--bank-cap 1000000000000000000` are the same.

use clap::{Parser, Subcommand};

use kipu_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use kipu_protocol::units::{parse_amount, Wei};
use kipu_protocol::Address;

use crate::logging::LogFormat;

/// KipuBank vault host.
///
/// Runs a single personal vault in memory and serves it over HTTP and
/// JSON-RPC, with Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "kipu-node",
    about = "KipuBank personal vault host",
    version,
    propagate_version = true
)]
pub struct KipuNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a vault and serve it.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Maximum amount a single withdrawal may move.
    #[arg(long, env = "KIPU_LIMIT_PER_TX", default_value = "0.05 ether", value_parser = parse_wei)]
    pub limit_per_tx: Wei,

    /// Maximum total reserves the vault may hold.
    #[arg(long, env = "KIPU_BANK_CAP", default_value = "1 ether", value_parser = parse_wei)]
    pub bank_cap: Wei,

    /// Owner recorded at deployment (hex address).
    #[arg(long, env = "KIPU_OWNER", default_value = "0x0000000000000000000000000000000000000000")]
    pub owner: Address,

    /// Port for the HTTP and JSON-RPC API.
    #[arg(long, env = "KIPU_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "KIPU_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: pretty or json.
    #[arg(long, env = "KIPU_LOG_FORMAT", default_value = "pretty", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

fn parse_wei(s: &str) -> Result<Wei, String> {
    parse_amount(s).map_err(|e| e.to_string())
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    Ok(LogFormat::from_str_lossy(s))
}
