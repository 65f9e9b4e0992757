//! Authorization manager
//!
//! Owns the session's single active authorization. `unlock` either reuses a
//! cached record from the [`AuthorizationStore`] or asks the wallet to sign a
//! fresh permit; concurrent unlocks for the same identity and contract set
//! share one in-flight attempt, so the user is never prompted twice.

use super::keys::EphemeralKeyPair;
use super::permit::{DecryptionPermit, DomainParams};
use super::storage_key::StorageKey;
use super::store::AuthorizationStore;
use super::types::{Authorization, ContractSet, DEFAULT_DURATION_DAYS};
use crate::effects::{TimeEffects, WalletSigner};
use crate::errors::{VeilError, VeilResult};
use alloy_primitives::{Address, Bytes, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures_signals::signal::{Mutable, Signal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What `lock` does to the cached authorization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockPolicy {
    /// Hide values and drop the in-memory authorization; keep the stored
    /// record so a later unlock inside the validity window skips re-signing
    #[default]
    HideValues,
    /// Additionally remove the stored record; the next unlock always prompts
    Revoke,
}

impl LockPolicy {
    /// Config/CLI spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HideValues => "hide-values",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockPolicy {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hide-values" | "hide" => Ok(Self::HideValues),
            "revoke" => Ok(Self::Revoke),
            other => Err(VeilError::config(format!("unknown lock policy: {other}"))),
        }
    }
}

type SharedUnlock = Shared<BoxFuture<'static, VeilResult<Arc<Authorization>>>>;

struct InFlightUnlock {
    id: u64,
    key: StorageKey,
    future: SharedUnlock,
}

enum UnlockSlot {
    Lead(SharedUnlock),
    Join(SharedUnlock),
    WaitForOther(SharedUnlock),
}

struct ManagerInner {
    signer: Arc<dyn WalletSigner>,
    store: AuthorizationStore,
    clock: Arc<dyn TimeEffects>,
    domain: DomainParams,
    duration_days: u64,
    lock_policy: LockPolicy,
    active: Mutable<Option<Arc<Authorization>>>,
    in_flight: Mutex<Option<InFlightUnlock>>,
    last_requested: Mutex<Option<StorageKey>>,
    next_unlock: AtomicU64,
    lock_epoch: AtomicU64,
}

/// Creates, caches, publishes and revokes the session's authorization.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AuthorizationManager {
    inner: Arc<ManagerInner>,
}

impl AuthorizationManager {
    /// Create a manager with the default validity window and lock policy.
    pub fn new(
        signer: Arc<dyn WalletSigner>,
        store: AuthorizationStore,
        clock: Arc<dyn TimeEffects>,
        domain: DomainParams,
    ) -> Self {
        Self::with_options(
            signer,
            store,
            clock,
            domain,
            DEFAULT_DURATION_DAYS,
            LockPolicy::default(),
        )
    }

    /// Create a manager with an explicit validity window and lock policy.
    pub fn with_options(
        signer: Arc<dyn WalletSigner>,
        store: AuthorizationStore,
        clock: Arc<dyn TimeEffects>,
        domain: DomainParams,
        duration_days: u64,
        lock_policy: LockPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                signer,
                store,
                clock,
                domain,
                duration_days,
                lock_policy,
                active: Mutable::new(None),
                in_flight: Mutex::new(None),
                last_requested: Mutex::new(None),
                next_unlock: AtomicU64::new(0),
                lock_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Protocol domain permits are signed under
    pub fn domain(&self) -> &DomainParams {
        &self.inner.domain
    }

    /// Configured lock policy
    pub fn lock_policy(&self) -> LockPolicy {
        self.inner.lock_policy
    }

    /// Backing store
    pub fn store(&self) -> &AuthorizationStore {
        &self.inner.store
    }

    /// Obtain a valid authorization for `user` over `contracts`.
    ///
    /// Concurrent calls for the same identity and contract set await the
    /// same attempt. A call for a different set waits for the current
    /// attempt to settle before starting its own.
    ///
    /// Fails with [`VeilError::LockedDuringUnlock`] when `lock` lands before
    /// the attempt settles; the authorization is then not published.
    pub async fn unlock(&self, user: Address, contracts: ContractSet) -> VeilResult<Arc<Authorization>> {
        let key = StorageKey::derive(&user, &contracts, &self.inner.domain);
        *self.inner.last_requested.lock() = Some(key.clone());
        loop {
            if let Some(active) = self.active_matching(&user, &contracts).await {
                debug!(key = %key, "Reusing active authorization");
                return Ok(active);
            }

            let slot = {
                let mut in_flight = self.inner.in_flight.lock();
                match in_flight.as_ref() {
                    Some(current) if current.key == key => UnlockSlot::Join(current.future.clone()),
                    Some(current) => UnlockSlot::WaitForOther(current.future.clone()),
                    None => {
                        let id = self.inner.next_unlock.fetch_add(1, Ordering::Relaxed);
                        let future = self.start_unlock(id, key.clone(), user, contracts.clone());
                        *in_flight = Some(InFlightUnlock {
                            id,
                            key: key.clone(),
                            future: future.clone(),
                        });
                        UnlockSlot::Lead(future)
                    }
                }
            };

            match slot {
                UnlockSlot::Lead(future) => return future.await,
                UnlockSlot::Join(future) => {
                    debug!(key = %key, "Joining in-flight unlock");
                    return future.await;
                }
                UnlockSlot::WaitForOther(future) => {
                    debug!(key = %key, "Waiting for unlock of another contract set");
                    let _ = future.await;
                }
            }
        }
    }

    fn start_unlock(&self, id: u64, key: StorageKey, user: Address, contracts: ContractSet) -> SharedUnlock {
        let inner = self.inner.clone();
        let epoch = inner.lock_epoch.load(Ordering::Acquire);
        async move {
            let mut result = inner.acquire(&key, user, contracts).await.map(Arc::new);
            if let Ok(authorization) = &result {
                // Checked under the publish lock so a concurrent `lock` either
                // sees the authorization or bumps the epoch first.
                let published = {
                    let mut active = inner.active.lock_mut();
                    let current = inner.lock_epoch.load(Ordering::Acquire) == epoch;
                    if current {
                        *active = Some(authorization.clone());
                    }
                    current
                };
                if !published {
                    info!(key = %key, "Session locked during unlock; not publishing authorization");
                    if inner.lock_policy == LockPolicy::Revoke {
                        inner.purge_quietly(&key).await;
                    }
                    result = Err(VeilError::LockedDuringUnlock);
                }
            }
            let mut in_flight = inner.in_flight.lock();
            if in_flight.as_ref().is_some_and(|current| current.id == id) {
                *in_flight = None;
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drop the active authorization.
    ///
    /// Under [`LockPolicy::Revoke`] the stored records for the published
    /// authorization and for the last requested contract set are removed,
    /// whether or not anything is published.
    pub async fn lock(&self) -> VeilResult<()> {
        self.lock_with(None).await
    }

    /// Like [`lock`](Self::lock), additionally revoking the record for
    /// `user` over `contracts` under [`LockPolicy::Revoke`], even if this
    /// manager never unlocked it.
    pub async fn lock_for(&self, user: Address, contracts: &ContractSet) -> VeilResult<()> {
        let key = StorageKey::derive(&user, contracts, &self.inner.domain);
        self.lock_with(Some(key)).await
    }

    async fn lock_with(&self, scope: Option<StorageKey>) -> VeilResult<()> {
        self.inner.lock_epoch.fetch_add(1, Ordering::AcqRel);
        let previous = self.inner.active.replace(None);
        info!(policy = %self.inner.lock_policy, "Locking session");

        if self.inner.lock_policy == LockPolicy::Revoke {
            let mut keys: Vec<StorageKey> = previous
                .map(|authorization| {
                    StorageKey::derive(
                        &authorization.user_address,
                        &authorization.contract_addresses,
                        &self.inner.domain,
                    )
                })
                .into_iter()
                .collect();
            let requested = self.inner.last_requested.lock().clone();
            for key in [requested, scope].into_iter().flatten() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            for key in keys {
                self.inner.store.purge(&key).await?;
            }
        }
        Ok(())
    }

    /// Currently published authorization, valid or not
    pub fn active(&self) -> Option<Arc<Authorization>> {
        self.inner.active.get_cloned()
    }

    /// Currently published authorization if still valid.
    ///
    /// An expired authorization is unpublished; it is never renewed without
    /// a new signature.
    pub async fn active_valid(&self) -> Option<Arc<Authorization>> {
        let active = self.inner.active.get_cloned()?;
        let now = self.inner.clock.current_timestamp().await;
        if active.is_valid_at(now) {
            return Some(active);
        }
        info!(expired_at = active.expires_at(), "Active authorization expired");
        let mut published = self.inner.active.lock_mut();
        if published.as_ref().is_some_and(|current| Arc::ptr_eq(current, &active)) {
            *published = None;
        }
        None
    }

    /// Whether a valid authorization is published
    pub async fn is_unlocked(&self) -> bool {
        self.active_valid().await.is_some()
    }

    /// Emits `true` while an authorization is published.
    pub fn unlocked_signal(&self) -> impl Signal<Item = bool> {
        self.inner.active.signal_ref(Option::is_some)
    }

    async fn active_matching(&self, user: &Address, contracts: &ContractSet) -> Option<Arc<Authorization>> {
        self.active_valid()
            .await
            .filter(|active| active.matches(user, contracts))
    }
}

impl fmt::Debug for AuthorizationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationManager")
            .field("domain", &self.inner.domain)
            .field("duration_days", &self.inner.duration_days)
            .field("lock_policy", &self.inner.lock_policy)
            .field("unlocked", &self.inner.active.lock_ref().is_some())
            .finish_non_exhaustive()
    }
}

impl ManagerInner {
    async fn purge_quietly(&self, key: &StorageKey) {
        if let Err(e) = self.store.purge(key).await {
            warn!(key = %key, error = %e, "Could not purge revoked authorization");
        }
    }

    async fn acquire(
        &self,
        key: &StorageKey,
        user: Address,
        contracts: ContractSet,
    ) -> VeilResult<Authorization> {
        let now = self.clock.current_timestamp().await;
        debug!(key = %key, %user, contracts = %contracts, "Unlock started");

        if let Some(cached) = self.load_reusable(key, &user, &contracts, now).await {
            info!(key = %key, expires_at = cached.expires_at(), "Reusing cached authorization");
            return Ok(cached);
        }

        let account = self.signer.address();
        if account != user {
            return Err(VeilError::invalid(format!(
                "wallet account {account} cannot sign for {user}"
            )));
        }

        let key_pair = EphemeralKeyPair::generate();
        let permit = DecryptionPermit {
            publicKey: Bytes::copy_from_slice(key_pair.public_key()),
            contractAddresses: contracts.as_slice().to_vec(),
            startTimestamp: U256::from(now),
            durationDays: U256::from(self.duration_days),
        };

        info!(key = %key, duration_days = self.duration_days, "Requesting permit signature");
        let signature = self
            .signer
            .sign_typed_data(&self.domain.eip712_domain(), &permit)
            .await
            .map_err(|e| {
                let err = VeilError::from(e);
                if err.is_informational() {
                    info!(key = %key, "Permit signature declined");
                } else {
                    warn!(key = %key, error = %err, "Permit signing failed");
                }
                err
            })?;

        let authorization = Authorization::new(
            &key_pair,
            signature,
            now,
            self.duration_days,
            user,
            contracts,
        );

        // A failed write costs a future prompt, not this unlock.
        if let Err(e) = self.store.save(key, &authorization).await {
            warn!(key = %key, error = %e, "Could not cache authorization");
        }
        info!(key = %key, expires_at = authorization.expires_at(), "Authorization created");
        Ok(authorization)
    }

    async fn load_reusable(
        &self,
        key: &StorageKey,
        user: &Address,
        contracts: &ContractSet,
        now: u64,
    ) -> Option<Authorization> {
        let cached = match self.store.load(key).await {
            Ok(cached) => cached?,
            Err(e) => {
                warn!(key = %key, error = %e, "Authorization store unreadable");
                return None;
            }
        };

        if !cached.is_valid_at(now) {
            info!(key = %key, expired_at = cached.expires_at(), "Cached authorization expired");
            if let Err(e) = self.store.purge(key).await {
                warn!(key = %key, error = %e, "Could not purge expired authorization");
            }
            return None;
        }
        if !cached.matches(user, contracts) {
            warn!(key = %key, "Cached authorization belongs to another identity or contract set");
            return None;
        }
        if let Err(e) = cached.verify_signature(&self.domain) {
            warn!(key = %key, error = %e, "Cached authorization failed signature check");
            return None;
        }
        Some(cached)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_policy_parsing() {
        assert_eq!("hide-values".parse::<LockPolicy>().unwrap(), LockPolicy::HideValues);
        assert_eq!("Revoke".parse::<LockPolicy>().unwrap(), LockPolicy::Revoke);
        assert!("shred".parse::<LockPolicy>().is_err());
        assert_eq!(LockPolicy::default(), LockPolicy::HideValues);
    }

    #[test]
    fn test_lock_policy_serde_spelling() {
        let json = serde_json::to_string(&LockPolicy::HideValues).unwrap();
        assert_eq!(json, "\"hide-values\"");
        assert_eq!(LockPolicy::Revoke.to_string(), "revoke");
    }
}
