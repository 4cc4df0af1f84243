//! rowcache CLI - demo and inspection tool for the rowcache query cache.
//!
//! Commands:
//! - `rowcache demo` - Run a scripted workload through a caching layer
//! - `rowcache key` - Show the cache key derived for a statement
//! - `rowcache config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;
mod telemetry;
mod users;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{ConfigArgs, DemoArgs, KeyArgs};

/// rowcache - read-through, write-invalidate query cache
#[derive(Parser)]
#[command(name = "rowcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted workload against an in-memory users table
    Demo(DemoArgs),

    /// Show the cache key for a statement
    Key(KeyArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.verbose, cli.json)?;

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    // Execute command
    let result = match cli.command {
        Commands::Demo(args) => commands::demo::run(args, &ctx).await,
        Commands::Key(args) => commands::key::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
