//! CLI argument definitions for sidewinder-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Sidewinder sidecar shutdown daemon.
///
/// Watches labelled container workloads and delivers TERM signals to
/// sidecars that outlive their main containers.
#[derive(Parser, Debug)]
#[command(name = "sidewinder-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to sidewinder.toml configuration file.
    #[arg(short, long, default_value = "/etc/sidewinder/sidewinder.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override Docker socket path (takes precedence over config file).
    #[arg(long)]
    pub docker_socket: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
