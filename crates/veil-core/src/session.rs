//! Decryption session
//!
//! The explicitly owned session object UI surfaces share. It wires the
//! authorization manager, ciphertext registry and decryption orchestrator to
//! one field table, and drives the per-field refresh-then-decrypt cycle from
//! caller-triggered events:
//!
//! - `refresh` / `refresh_all` after state-changing transactions
//! - `unlock` / `lock` from the user
//! - `decrypt_pending` to catch up fields that have a handle but no value

use crate::authorization::{
    Authorization, AuthorizationManager, AuthorizationStore, ContractSet, DomainParams,
    LockPolicy, DEFAULT_DURATION_DAYS,
};
use crate::ciphertext::{CiphertextRegistry, FieldId, HandleRefresh};
use crate::config::VeilConfig;
use crate::decryption::{DecryptRequest, DecryptionOrchestrator, DecryptionReport, FieldOutcome};
use crate::effects::{
    CiphertextSource, DecryptionService, StorageEffects, SystemClock, TimeEffects, WalletSigner,
};
use crate::errors::{VeilError, VeilResult};
use crate::fields::{FieldTable, FieldView};
use crate::format::ValueFormatter;
use alloy_primitives::Address;
use futures::future::join_all;
use futures_signals::signal::Signal;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on auto-decrypt passes; each extra pass retries fields whose
/// result was discarded because their handle moved.
pub const MAX_DECRYPT_PASSES: usize = 3;

struct SessionInner {
    user: Address,
    contracts: ContractSet,
    manager: AuthorizationManager,
    registry: CiphertextRegistry,
    orchestrator: DecryptionOrchestrator,
    fields: FieldTable,
    formatter: Arc<ValueFormatter>,
}

/// Shared decryption state for one user and one target contract set.
#[derive(Clone)]
pub struct DecryptionSession {
    inner: Arc<SessionInner>,
}

impl DecryptionSession {
    /// Start building a session for `user`
    pub fn builder(user: Address) -> DecryptionSessionBuilder {
        DecryptionSessionBuilder::new(user)
    }

    /// Account whose values this session decrypts
    pub fn user(&self) -> Address {
        self.inner.user
    }

    /// Contracts authorizations are requested for
    pub fn contracts(&self) -> &ContractSet {
        &self.inner.contracts
    }

    /// Authorization manager
    pub fn manager(&self) -> &AuthorizationManager {
        &self.inner.manager
    }

    /// Formatter used by every field view
    pub fn formatter(&self) -> &ValueFormatter {
        &self.inner.formatter
    }

    /// Register a field; tracking the same field twice returns the same state.
    pub fn track(&self, id: FieldId) -> FieldView {
        FieldView::new(self.inner.fields.track(id), self.inner.formatter.clone())
    }

    /// View of an already tracked field
    pub fn field(&self, id: &FieldId) -> Option<FieldView> {
        self.inner
            .fields
            .get(id)
            .map(|cell| FieldView::new(cell, self.inner.formatter.clone()))
    }

    /// Every tracked field
    pub fn fields(&self) -> Vec<FieldView> {
        self.inner
            .fields
            .ids()
            .iter()
            .filter_map(|id| self.field(id))
            .collect()
    }

    /// Obtain an authorization and decrypt every pending field.
    ///
    /// A `lock` that lands before the authorization is obtained wins: the
    /// call fails with [`VeilError::LockedDuringUnlock`] and fields keep
    /// showing the placeholder.
    pub async fn unlock(&self) -> VeilResult<Arc<Authorization>> {
        let authorization = self
            .inner
            .manager
            .unlock(self.inner.user, self.inner.contracts.clone())
            .await?;
        let report = self.decrypt_pending().await?;
        info!(applied = report.applied(), failed = report.failed(), "Session unlocked");
        Ok(authorization)
    }

    /// Drop the authorization and reset every field to the placeholder.
    pub async fn lock(&self) -> VeilResult<()> {
        let result = self
            .inner
            .manager
            .lock_for(self.inner.user, &self.inner.contracts)
            .await;
        self.inner.fields.reset_all();
        result
    }

    /// Whether a valid authorization is active
    pub async fn is_unlocked(&self) -> bool {
        self.inner.manager.is_unlocked().await
    }

    /// Emits `true` while an authorization is published.
    pub fn authorization_signal(&self) -> impl Signal<Item = bool> {
        self.inner.manager.unlocked_signal()
    }

    /// Fetch one field's handle; when unlocked and the handle changed,
    /// decrypt the new value.
    pub async fn refresh(&self, id: &FieldId) -> VeilResult<HandleRefresh> {
        let refresh = self.inner.registry.fetch_handle(id).await?;
        if refresh.changed {
            self.auto_decrypt(Some(std::slice::from_ref(id))).await?;
        }
        Ok(refresh)
    }

    /// Fetch every tracked field's handle concurrently, then decrypt the
    /// fields that changed.
    pub async fn refresh_all(&self) -> VeilResult<Vec<(FieldId, VeilResult<HandleRefresh>)>> {
        let ids = self.inner.fields.ids();
        let results = join_all(ids.iter().map(|id| self.inner.registry.fetch_handle(id))).await;
        let results: Vec<_> = ids.into_iter().zip(results).collect();

        let changed: Vec<FieldId> = results
            .iter()
            .filter(|(_, result)| result.as_ref().is_ok_and(|refresh| refresh.changed))
            .map(|(id, _)| *id)
            .collect();
        debug!(fields = results.len(), changed = changed.len(), "Refreshed handles");
        if !changed.is_empty() {
            self.auto_decrypt(Some(&changed)).await?;
        }
        Ok(results)
    }

    /// Decrypt every field that has a handle but no value.
    ///
    /// Does nothing while locked. Fields whose result was discarded as stale
    /// are retried, up to [`MAX_DECRYPT_PASSES`] passes in total.
    pub async fn decrypt_pending(&self) -> VeilResult<DecryptionReport> {
        self.auto_decrypt(None).await
    }

    /// One orchestrator pass over `ids` with the active authorization.
    ///
    /// Fails when no valid authorization is active.
    pub async fn decrypt_fields(&self, ids: &[FieldId]) -> VeilResult<DecryptionReport> {
        let authorization = self
            .inner
            .manager
            .active_valid()
            .await
            .ok_or_else(|| VeilError::decryption_failed("no active authorization"))?;
        Ok(self.decrypt_pass(&authorization, ids).await)
    }

    async fn auto_decrypt(&self, scope: Option<&[FieldId]>) -> VeilResult<DecryptionReport> {
        let mut report = DecryptionReport::default();
        for pass in 1..=MAX_DECRYPT_PASSES {
            let Some(authorization) = self.inner.manager.active_valid().await else {
                debug!("Locked; skipping auto-decrypt");
                break;
            };
            let pending: Vec<FieldId> = self
                .inner
                .fields
                .pending()
                .into_iter()
                .filter(|id| scope.map_or(true, |scope| scope.contains(id)))
                .collect();
            if pending.is_empty() {
                break;
            }

            let pass_report = self.decrypt_pass(&authorization, &pending).await;
            let stale = pass_report.stale();
            report.merge(pass_report);
            if stale == 0 {
                break;
            }
            debug!(pass, stale, "Retrying fields with stale results");
        }
        Ok(report)
    }

    /// Decrypt covered fields in one batch; each uncovered field gets its own
    /// call so its failure stays local.
    async fn decrypt_pass(&self, authorization: &Authorization, ids: &[FieldId]) -> DecryptionReport {
        let requests: Vec<DecryptRequest> = ids
            .iter()
            .filter_map(|id| {
                let handle = self.inner.fields.get(id)?.snapshot().handle?;
                Some(DecryptRequest { field: *id, handle })
            })
            .collect();
        let (covered, uncovered): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|request| authorization.covers(&request.contract()));

        let mut report = DecryptionReport::default();
        if !covered.is_empty() {
            report.merge(self.run_orchestrator(authorization, &covered).await);
        }
        for request in uncovered {
            report.merge(
                self.run_orchestrator(authorization, std::slice::from_ref(&request))
                    .await,
            );
        }
        report
    }

    async fn run_orchestrator(
        &self,
        authorization: &Authorization,
        requests: &[DecryptRequest],
    ) -> DecryptionReport {
        match self.inner.orchestrator.decrypt(authorization, requests).await {
            Ok(report) => report,
            Err(err) => DecryptionReport {
                outcomes: requests
                    .iter()
                    .map(|request| (request.field, FieldOutcome::Failed(err.clone())))
                    .collect(),
                service_calls: 0,
            },
        }
    }
}

impl std::fmt::Debug for DecryptionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionSession")
            .field("user", &self.inner.user)
            .field("contracts", &self.inner.contracts)
            .field("fields", &self.inner.fields)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DecryptionSession`].
///
/// Collaborators are required; everything else has defaults.
pub struct DecryptionSessionBuilder {
    user: Address,
    contracts: Vec<Address>,
    signer: Option<Arc<dyn WalletSigner>>,
    source: Option<Arc<dyn CiphertextSource>>,
    service: Option<Arc<dyn DecryptionService>>,
    storage: Option<Arc<dyn StorageEffects>>,
    clock: Option<Arc<dyn TimeEffects>>,
    domain: DomainParams,
    duration_days: u64,
    lock_policy: LockPolicy,
    formatter: ValueFormatter,
}

impl DecryptionSessionBuilder {
    /// Builder with default domain, duration, lock policy and formatter
    pub fn new(user: Address) -> Self {
        Self {
            user,
            contracts: Vec::new(),
            signer: None,
            source: None,
            service: None,
            storage: None,
            clock: None,
            domain: DomainParams::default(),
            duration_days: DEFAULT_DURATION_DAYS,
            lock_policy: LockPolicy::default(),
            formatter: ValueFormatter::default(),
        }
    }

    /// Take domain, duration, lock policy, display settings and target
    /// contracts from configuration.
    pub fn with_config(mut self, config: &VeilConfig) -> Self {
        self.domain = config.domain_params();
        self.duration_days = config.authorization.duration_days;
        self.lock_policy = config.authorization.lock_policy;
        self.formatter = ValueFormatter::from_config(&config.display);
        self.contracts = config.contracts.iter().map(|c| c.address).collect();
        self
    }

    /// Target contracts, in any order
    pub fn with_contracts(mut self, contracts: impl IntoIterator<Item = Address>) -> Self {
        self.contracts = contracts.into_iter().collect();
        self
    }

    /// Wallet used to sign permits
    pub fn with_signer(mut self, signer: Arc<dyn WalletSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Source of ciphertext handles
    pub fn with_source(mut self, source: Arc<dyn CiphertextSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Decryption service
    pub fn with_service(mut self, service: Arc<dyn DecryptionService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Authorization cache backend
    pub fn with_storage(mut self, storage: Arc<dyn StorageEffects>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Clock; the system clock when unset
    pub fn with_clock(mut self, clock: Arc<dyn TimeEffects>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// EIP-712 domain
    pub fn with_domain(mut self, domain: DomainParams) -> Self {
        self.domain = domain;
        self
    }

    /// Validity window of new authorizations
    pub fn with_duration_days(mut self, days: u64) -> Self {
        self.duration_days = days;
        self
    }

    /// Lock behavior
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Display formatter
    pub fn with_formatter(mut self, formatter: ValueFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Assemble the session.
    pub fn build(self) -> VeilResult<DecryptionSession> {
        let signer = self.signer.ok_or_else(|| missing("wallet signer"))?;
        let source = self.source.ok_or_else(|| missing("ciphertext source"))?;
        let service = self.service.ok_or_else(|| missing("decryption service"))?;
        let storage = self.storage.ok_or_else(|| missing("authorization storage"))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn TimeEffects>);
        if self.duration_days == 0 {
            return Err(VeilError::invalid("duration_days must be positive"));
        }
        let contracts = ContractSet::new(self.contracts)?;

        let fields = FieldTable::new();
        let manager = AuthorizationManager::with_options(
            signer,
            AuthorizationStore::new(storage),
            clock.clone(),
            self.domain,
            self.duration_days,
            self.lock_policy,
        );
        let registry = CiphertextRegistry::new(source, fields.clone());
        let orchestrator = DecryptionOrchestrator::new(service, clock, fields.clone());

        Ok(DecryptionSession {
            inner: Arc::new(SessionInner {
                user: self.user,
                contracts,
                manager,
                registry,
                orchestrator,
                fields,
                formatter: Arc::new(self.formatter),
            }),
        })
    }
}

fn missing(what: &str) -> VeilError {
    VeilError::invalid(format!("session requires a {what}"))
}
