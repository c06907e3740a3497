//! Command-line utility for courier configuration
//!
//! - `check`: load and validate a configuration file, then summarise it
//! - `show`: print the effective configuration, defaults filled in

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier::{CourierConfig, find_config_file};
use courier_common::logging;
use tracing::debug;

/// Inspect and validate courier configuration
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Inspect and validate courier configuration", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to `COURIER_CONFIG`, then the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration
    Check,
    /// Print the effective configuration as RON
    Show,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let config = CourierConfig::load(&path)?;

    logging::init_with(config.log_format);
    debug!(path = %path.display(), "Loaded configuration");

    match cli.command {
        Commands::Check => check(&config, &path),
        Commands::Show => {
            println!("{}", config.to_pretty_ron()?);
            Ok(())
        }
    }
}

fn check(config: &CourierConfig, path: &std::path::Path) -> anyhow::Result<()> {
    config.validate()?;

    let dispatch = &config.dispatch;
    println!("Configuration OK: {}", path.display());
    println!("  Providers (in priority order):");
    for (priority, name) in config.providers.iter().enumerate() {
        let breaker = dispatch.circuit_breaker.for_provider(name);
        println!(
            "    {priority}. {name} (opens after {} failure(s), cooldown {}ms)",
            breaker.failure_threshold, breaker.cooldown_ms
        );
    }
    println!(
        "  Rate limit: {} request(s) per {}ms",
        dispatch.rate_limit.limit, dispatch.rate_limit.interval_ms
    );
    println!(
        "  Retry: {} attempt(s) per provider, base delay {}ms",
        dispatch.retry.max_retries, dispatch.retry.base_delay_ms
    );
    match dispatch.provider_timeout_ms {
        Some(timeout) => println!("  Provider timeout: {timeout}ms"),
        None => println!("  Provider timeout: none"),
    }

    Ok(())
}
