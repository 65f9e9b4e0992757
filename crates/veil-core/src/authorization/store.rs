//! Authorization store
//!
//! Persists one JSON record per [`StorageKey`] through the injected
//! [`StorageEffects`]. Unreadable records are treated as absent: the caller
//! falls back to asking the user for a fresh signature.

use super::storage_key::{StorageKey, STORAGE_KEY_PREFIX};
use super::types::Authorization;
use crate::effects::StorageEffects;
use crate::errors::VeilResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable cache of authorizations keyed by [`StorageKey`].
#[derive(Clone)]
pub struct AuthorizationStore {
    storage: Arc<dyn StorageEffects>,
}

impl AuthorizationStore {
    /// Wrap a storage backend
    pub fn new(storage: Arc<dyn StorageEffects>) -> Self {
        Self { storage }
    }

    /// Load the record stored under `key`.
    pub async fn load(&self, key: &StorageKey) -> VeilResult<Option<Authorization>> {
        let Some(bytes) = self.storage.retrieve(key.as_str()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Authorization>(&bytes) {
            Ok(authorization) => Ok(Some(authorization)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cached authorization");
                Ok(None)
            }
        }
    }

    /// Store `authorization` under `key`, replacing any previous record.
    pub async fn save(&self, key: &StorageKey, authorization: &Authorization) -> VeilResult<()> {
        let bytes = serde_json::to_vec(authorization)?;
        self.storage.store(key.as_str(), bytes).await?;
        debug!(key = %key, "Cached authorization");
        Ok(())
    }

    /// Remove the record under `key`. Returns whether one existed.
    pub async fn purge(&self, key: &StorageKey) -> VeilResult<bool> {
        let removed = self.storage.remove(key.as_str()).await?;
        if removed {
            debug!(key = %key, "Purged cached authorization");
        }
        Ok(removed)
    }

    /// Every cached record with its key. Unreadable records are skipped.
    pub async fn list(&self) -> VeilResult<Vec<(StorageKey, Authorization)>> {
        let keys = self.storage.list_keys(Some(STORAGE_KEY_PREFIX)).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys.into_iter().filter_map(StorageKey::from_stored) {
            if let Some(authorization) = self.load(&key).await? {
                records.push((key, authorization));
            }
        }
        Ok(records)
    }

    /// Remove every record that is expired at `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: u64) -> VeilResult<usize> {
        let mut removed = 0;
        for (key, authorization) in self.list().await? {
            if !authorization.is_valid_at(now) && self.purge(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every record under the authorization prefix, readable or not.
    pub async fn purge_all(&self) -> VeilResult<usize> {
        let mut removed = 0;
        for key in self.storage.list_keys(Some(STORAGE_KEY_PREFIX)).await? {
            if self.storage.remove(&key).await? {
                removed += 1;
            }
        }
        debug!(removed, "Purged authorization cache");
        Ok(removed)
    }
}

impl std::fmt::Debug for AuthorizationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::authorization::{ContractSet, DomainParams, EphemeralKeyPair};
    use crate::effects::FilesystemStorage;
    use alloy_primitives::{Address, Bytes};

    fn record(start: u64, days: u64, contract: u8) -> (StorageKey, Authorization) {
        let user = Address::repeat_byte(0x11);
        let contracts = ContractSet::new([Address::repeat_byte(contract)]).unwrap();
        let key = StorageKey::derive(&user, &contracts, &DomainParams::default());
        let authorization = Authorization::new(
            &EphemeralKeyPair::generate(),
            Bytes::from(vec![1u8; 65]),
            start,
            days,
            user,
            contracts,
        );
        (key, authorization)
    }

    #[tokio::test]
    async fn test_save_load_purge() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthorizationStore::new(Arc::new(FilesystemStorage::new(dir.path())));
        let (key, authorization) = record(1_000, 365, 0xaa);

        assert!(store.load(&key).await.unwrap().is_none());
        store.save(&key, &authorization).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(authorization));
        assert!(store.purge(&key).await.unwrap());
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FilesystemStorage::new(dir.path()));
        let store = AuthorizationStore::new(storage.clone());
        let (key, _) = record(1_000, 365, 0xaa);

        storage.store(key.as_str(), b"{not json".to_vec()).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_valid_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthorizationStore::new(Arc::new(FilesystemStorage::new(dir.path())));
        let (expired_key, expired) = record(0, 1, 0xaa);
        let (valid_key, valid) = record(0, 365, 0xbb);
        store.save(&expired_key, &expired).await.unwrap();
        store.save(&valid_key, &valid).await.unwrap();

        assert_eq!(store.purge_expired(10 * 86_400).await.unwrap(), 1);
        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, valid_key);
    }

    #[tokio::test]
    async fn test_purge_all_removes_unreadable_records() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FilesystemStorage::new(dir.path()));
        let store = AuthorizationStore::new(storage.clone());
        let (key, authorization) = record(0, 365, 0xaa);
        store.save(&key, &authorization).await.unwrap();
        storage
            .store("veil.authorization.garbage", b"??".to_vec())
            .await
            .unwrap();
        storage.store("unrelated", vec![1]).await.unwrap();

        assert_eq!(store.purge_all().await.unwrap(), 2);
        assert_eq!(storage.list_keys(None).await.unwrap(), vec!["unrelated".to_string()]);
    }
}
