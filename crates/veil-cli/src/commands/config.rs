// Configuration commands

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use veil_core::VeilConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the effective configuration and print it
    Check,
}

pub fn handle_config_command(cmd: ConfigCommand, path: &Path, config: &VeilConfig) -> Result<String> {
    match cmd {
        ConfigCommand::Check => check(path, config),
    }
}

fn check(path: &Path, config: &VeilConfig) -> Result<String> {
    config
        .validate()
        .with_context(|| format!("invalid configuration ({})", path.display()))?;
    let storage_dir = config.storage.resolve_dir()?;
    let rendered = config.to_toml_string()?;
    Ok(format!(
        "# {} is valid; authorizations cached in {}\n{rendered}",
        path.display(),
        storage_dir.display()
    ))
}
