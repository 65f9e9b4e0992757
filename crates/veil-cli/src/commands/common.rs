// Shared helpers for CLI commands

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use veil_core::effects::FilesystemStorage;
use veil_core::{AuthorizationStore, VeilConfig};

/// Load the config file when it exists, then apply `VEIL_*` overrides.
///
/// A missing file yields the defaults so commands work without setup.
pub fn load_config(path: &Path) -> Result<VeilConfig> {
    let mut config = if path.exists() {
        info!("Loading configuration from {}", path.display());
        VeilConfig::load_from_file(path)?
    } else {
        debug!("No config at {}; using defaults", path.display());
        VeilConfig::default()
    };
    config
        .merge_with_env()
        .context("applying environment overrides")?;
    Ok(config)
}

/// Authorization store over the configured cache directory.
pub fn open_store(config: &VeilConfig) -> Result<AuthorizationStore> {
    let dir = config.storage.resolve_dir()?;
    debug!(dir = %dir.display(), "Opening authorization cache");
    Ok(AuthorizationStore::new(Arc::new(FilesystemStorage::new(dir))))
}
