//! CLI argument definitions for befw-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// befw edge firewall agent.
///
/// Polls the control plane for this host's tenant policy, keeps the local
/// iptables chains in sync with it and reports per-rule counters back.
#[derive(Parser, Debug, Default)]
#[command(name = "befw-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to befw.toml configuration file.
    #[arg(short, long, default_value = "/etc/befw/befw.toml")]
    pub config: PathBuf,

    /// Override the tenant this agent enforces policy for.
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Override the control plane base URL (e.g. http://10.0.0.1:8080/api/v1).
    #[arg(long)]
    pub server_url: Option<String>,

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

    /// Validate configuration, print the effective settings and exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (empty string disables the PID file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
