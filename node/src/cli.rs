//! # CLI Interface
//!
//! Command-line arguments for `veritas-node`, via `clap` derive. Three
//! subcommands: `run`, `keygen` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Veritas session server.
///
/// Serves session-scoped transactions over an in-memory verifiable log,
/// signs the log's current state and hands out dual proofs for any key.
#[derive(Parser, Debug)]
#[command(
    name = "veritas-node",
    about = "Veritas session and verification server",
    version,
    propagate_version = true
)]
pub struct VeritasNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server.
    Run(RunArgs),
    /// Generate a fresh state-signing key file.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Anything left unset falls back to
/// the config file, then to built-in defaults.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "VERITAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the session and verification API.
    #[arg(long, env = "VERITAS_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VERITAS_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Ed25519 signing key file (PKCS#8 PEM or hex seed).
    ///
    /// Without a key the server still serves proofs, but states are unsigned.
    #[arg(long, short = 'k', env = "VERITAS_SIGNING_KEY")]
    pub signing_key: Option<PathBuf>,

    /// Name of the database new sessions are bound to.
    #[arg(long, env = "VERITAS_DATABASE")]
    pub database: Option<String>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "VERITAS_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Where to write the key file.
    #[arg(long, short = 'o', default_value = "veritas-signing.key")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
