//! Operator CLI for Veil
//!
//! Inspects and maintains the on-disk authorization cache, derives storage
//! keys, formats raw values and validates configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use veil_core::effects::{SystemClock, TimeEffects};

mod commands;

use commands::{
    cache::{handle_cache_command, CacheCommand},
    common,
    config::{handle_config_command, ConfigCommand},
    format::{self, FormatArgs},
    key::{self, KeyArgs},
};

#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(about = "Veil - confidential balance decryption tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "veil.toml")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the storage key an authorization is cached under
    Key(KeyArgs),

    /// Format a raw 18-decimal integer for display
    Format(FormatArgs),

    /// Inspect or purge cached authorizations
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Configuration checks
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = common::load_config(&cli.config)?;
    let output = match cli.command {
        Commands::Key(args) => key::run(&args, &config)?,
        Commands::Format(args) => format::run(&args, &config)?,
        Commands::Cache(cmd) => {
            let now = SystemClock::new().current_timestamp().await;
            handle_cache_command(cmd, &config, now).await?
        }
        Commands::Config(cmd) => handle_config_command(cmd, &cli.config, &config)?,
    };
    print!("{output}");

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_key_accepts_repeated_contracts() {
        let cli = Cli::try_parse_from([
            "veil",
            "key",
            "--user",
            "0x1111111111111111111111111111111111111111",
            "--contract",
            "0x2222222222222222222222222222222222222222",
            "--contract",
            "0x3333333333333333333333333333333333333333",
        ])
        .unwrap();
        match cli.command {
            Commands::Key(args) => assert_eq!(args.contracts.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("veil.toml"));
    }

    #[test]
    fn test_cache_purge_flag() {
        let cli = Cli::try_parse_from(["veil", "-v", "cache", "purge", "--expired-only"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommand::Purge { expired_only: true })
        ));
    }

    #[test]
    fn test_format_rejects_non_numeric_raw() {
        assert!(Cli::try_parse_from(["veil", "format", "abc"]).is_err());
    }
}
