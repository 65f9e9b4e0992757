//! Durable key/value storage effect and its filesystem handler.

use async_trait::async_trait;
#[cfg(unix)]
use std::fs::Permissions;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Mode for the storage directory: owner only
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Mode for stored records: owner read/write only
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Reading a value failed
    #[error("Read failed: {0}")]
    ReadFailed(String),
    /// Writing a value failed
    #[error("Write failed: {0}")]
    WriteFailed(String),
    /// Removing a value failed
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    /// Listing keys failed
    #[error("List failed: {0}")]
    ListFailed(String),
    /// Restricting file or directory permissions failed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl From<StorageError> for crate::VeilError {
    fn from(err: StorageError) -> Self {
        crate::VeilError::storage(err.to_string())
    }
}

/// Key/value persistence scoped to the user's device or browser profile.
///
/// Writes are whole-record replacements.
#[async_trait]
pub trait StorageEffects: Send + Sync {
    /// Store a value under a key, replacing any previous value
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Retrieve the value stored under a key
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a key, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// List keys, optionally restricted to a prefix
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;
}

#[async_trait]
impl<T: StorageEffects + ?Sized> StorageEffects for Arc<T> {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).store(key, value).await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).retrieve(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        (**self).list_keys(prefix).await
    }
}

/// Filesystem storage handler: one file per key under a base directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Create a handler rooted at `base_path`. The directory is created on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Default location under the platform data directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("veil"))
    }

    /// Base directory of this handler
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key.replace(|c: char| c == '/' || c == '\\', "_"))
    }
}

#[async_trait]
impl StorageEffects for FilesystemStorage {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("I/O error: {e}")))?;
        #[cfg(unix)]
        fs::set_permissions(&self.base_path, Permissions::from_mode(DIR_MODE))
            .await
            .map_err(|e| {
                StorageError::PermissionDenied(format!("Failed to restrict storage directory: {e}"))
            })?;

        // Write-then-rename keeps the record whole if the process dies mid-write
        let path = self.key_to_path(key);
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        fs::write(&staging, value)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("I/O error: {e}")))?;
        // Records hold the session private key; restrict before they become visible
        #[cfg(unix)]
        fs::set_permissions(&staging, Permissions::from_mode(FILE_MODE))
            .await
            .map_err(|e| StorageError::PermissionDenied(format!("Failed to restrict record: {e}")))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("I/O error: {e}")))?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.key_to_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed(format!("I/O error: {e}"))),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.key_to_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!("I/O error: {e}"))),
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut read_dir = match fs::read_dir(&self.base_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ListFailed(format!(
                    "Failed to read directory: {e}"
                )))
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StorageError::ListFailed(format!("Failed to read entry: {e}")))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(".tmp") {
                continue;
            }
            if prefix.map_or(true, |p| name.starts_with(p)) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_filesystem_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("cache"));

        assert_eq!(storage.retrieve("veil.a").await.unwrap(), None);
        storage.store("veil.a", b"first".to_vec()).await.unwrap();
        storage.store("veil.a", b"second".to_vec()).await.unwrap();
        assert_eq!(
            storage.retrieve("veil.a").await.unwrap(),
            Some(b"second".to_vec())
        );

        assert!(storage.remove("veil.a").await.unwrap());
        assert!(!storage.remove("veil.a").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_list_keys_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage.store("veil.authorization.aa", vec![1]).await.unwrap();
        storage.store("veil.authorization.bb", vec![2]).await.unwrap();
        storage.store("other", vec![3]).await.unwrap();

        let keys = storage.list_keys(Some("veil.authorization.")).await.unwrap();
        assert_eq!(keys, vec!["veil.authorization.aa", "veil.authorization.bb"]);
        assert_eq!(storage.list_keys(None).await.unwrap().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_filesystem_restricts_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cache");
        let storage = FilesystemStorage::new(&base);
        storage.store("veil.a", b"secret".to_vec()).await.unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&base), 0o700);
        assert_eq!(mode(&base.join("veil.a")), 0o600);

        // Overwrites keep the restricted mode
        storage.store("veil.a", b"rotated".to_vec()).await.unwrap();
        assert_eq!(mode(&base.join("veil.a")), 0o600);
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("never-created"));
        assert!(storage.list_keys(None).await.unwrap().is_empty());
    }
}
