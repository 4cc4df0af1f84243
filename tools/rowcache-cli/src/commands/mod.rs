//! CLI command implementations.

pub mod config;
pub mod demo;
pub mod key;

use clap::{Args, Subcommand};

/// Arguments for the demo command.
#[derive(Args)]
pub struct DemoArgs {
    /// Number of users to seed (overrides the config file).
    #[arg(short, long)]
    pub users: Option<u32>,

    /// Simulated query latency in milliseconds (overrides the config file).
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Number of concurrent identical reads in the coalescing step.
    #[arg(long, default_value = "8")]
    pub concurrency: usize,

    /// Disable request coalescing.
    #[arg(long)]
    pub no_easer: bool,
}

/// Arguments for the key command.
#[derive(Args)]
pub struct KeyArgs {
    /// Instance namespace (default: from config).
    #[arg(short, long)]
    pub instance: Option<String>,

    /// Table name.
    #[arg(short, long)]
    pub table: String,

    /// Rendered SQL text.
    #[arg(short, long)]
    pub sql: String,

    /// Bound argument (repeatable).
    #[arg(short, long = "arg")]
    pub args: Vec<String>,

    /// Primary key column.
    #[arg(long, default_value = "id")]
    pub pk: String,

    /// Filter the primary key by this value.
    #[arg(long)]
    pub pk_eq: Option<String>,

    /// Raw filter expression, bound to the statement arguments.
    #[arg(long = "where")]
    pub raw_where: Option<String>,

    /// Mark the statement as a single-row lookup (LIMIT 1).
    #[arg(long)]
    pub limit_one: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Get a config value.
    Get {
        /// Config key (dot-separated).
        key: String,
    },
    /// Initialize a new config file.
    Init {
        /// Output file (`.json` for JSON).
        #[arg(short, long, default_value = "rowcache.toml")]
        path: String,

        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
