// Authorization cache maintenance
//
// Lists and purges the records the session caches on disk. Secrets in the
// records are never printed.

use crate::commands::common;
use anyhow::Result;
use clap::Subcommand;
use std::fmt::Write;
use tracing::info;
use veil_core::VeilConfig;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached authorizations
    List,

    /// Remove cached authorizations
    Purge {
        /// Only remove records whose validity window has ended
        #[arg(long)]
        expired_only: bool,
    },
}

pub async fn handle_cache_command(cmd: CacheCommand, config: &VeilConfig, now: u64) -> Result<String> {
    match cmd {
        CacheCommand::List => list(config, now).await,
        CacheCommand::Purge { expired_only } => purge(config, now, expired_only).await,
    }
}

async fn list(config: &VeilConfig, now: u64) -> Result<String> {
    let store = common::open_store(config)?;
    let records = store.list().await?;
    if records.is_empty() {
        return Ok("No cached authorizations\n".to_string());
    }

    let domain = config.domain_params();
    let mut out = String::new();
    for (key, authorization) in records {
        let status = if authorization.is_valid_at(now) {
            "valid"
        } else {
            "expired"
        };
        let signature = match authorization.verify_signature(&domain) {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("invalid ({e})"),
        };
        let contracts: Vec<String> = authorization
            .contract_addresses
            .iter()
            .map(ToString::to_string)
            .collect();

        writeln!(out, "{key}")?;
        writeln!(out, "  user:      {}", authorization.user_address)?;
        writeln!(out, "  contracts: {}", contracts.join(", "))?;
        writeln!(out, "  expires:   {} ({status})", authorization.expires_at())?;
        writeln!(out, "  signature: {signature}")?;
    }
    Ok(out)
}

async fn purge(config: &VeilConfig, now: u64, expired_only: bool) -> Result<String> {
    let store = common::open_store(config)?;
    let removed = if expired_only {
        store.purge_expired(now).await?
    } else {
        store.purge_all().await?
    };
    info!(removed, expired_only, "Purged cached authorizations");
    Ok(format!("Removed {removed} cached authorization(s)\n"))
}
