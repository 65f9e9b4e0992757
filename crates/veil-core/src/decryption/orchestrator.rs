//! Decryption orchestrator
//!
//! Turns a batch of pending fields into one decryption service call and
//! writes the results back field by field. Guarantees:
//! - every requested contract is covered by the authorization, or the call
//!   fails with [`VeilError::UnauthorizedContract`] before anything is sent
//! - at most one decryption is in flight per field; overlapping requests
//!   for a busy field are coalesced
//! - a result is only applied if the field still holds the handle it was
//!   computed for and the session has not been locked since

use super::values::DecryptedValue;
use crate::authorization::Authorization;
use crate::ciphertext::{CiphertextHandle, FieldId};
use crate::effects::{DecryptionService, HandleContractPair, TimeEffects, UserDecryptRequest};
use crate::errors::{VeilError, VeilResult};
use crate::fields::{FieldTable, InFlightGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One field to decrypt at a specific handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecryptRequest {
    /// Field to write the result to
    pub field: FieldId,
    /// Handle the result must be computed for
    pub handle: CiphertextHandle,
}

impl DecryptRequest {
    /// Contract owning the ciphertext
    pub fn contract(&self) -> alloy_primitives::Address {
        self.field.contract
    }
}

/// What happened to one requested field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The decrypted value was stored
    Applied(DecryptedValue),
    /// The handle is the empty sentinel; zero was stored without a service call
    Empty,
    /// Another decryption for the field was already in flight
    Coalesced,
    /// The field moved on (new handle or lock) before the result arrived
    Stale,
    /// Decryption failed for this field only
    Failed(VeilError),
}

/// Per-field results of one orchestrator call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecryptionReport {
    /// Outcome per requested field
    pub outcomes: BTreeMap<FieldId, FieldOutcome>,
    /// Decryption service calls issued
    pub service_calls: usize,
}

impl DecryptionReport {
    /// Outcome recorded for a field
    pub fn outcome(&self, field: &FieldId) -> Option<&FieldOutcome> {
        self.outcomes.get(field)
    }

    /// Fields whose value was stored
    pub fn applied(&self) -> usize {
        self.count(|outcome| matches!(outcome, FieldOutcome::Applied(_) | FieldOutcome::Empty))
    }

    /// Fields whose result was discarded as stale
    pub fn stale(&self) -> usize {
        self.count(|outcome| matches!(outcome, FieldOutcome::Stale))
    }

    /// Fields that failed
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FieldOutcome::Failed(_)))
    }

    /// Fields skipped because they were already decrypting
    pub fn coalesced(&self) -> usize {
        self.count(|outcome| matches!(outcome, FieldOutcome::Coalesced))
    }

    /// Fold another report into this one; later outcomes win.
    pub fn merge(&mut self, other: DecryptionReport) {
        self.outcomes.extend(other.outcomes);
        self.service_calls += other.service_calls;
    }

    fn count(&self, predicate: impl Fn(&FieldOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|outcome| predicate(outcome)).count()
    }
}

/// Batches field decryptions against the decryption service.
#[derive(Clone)]
pub struct DecryptionOrchestrator {
    service: Arc<dyn DecryptionService>,
    clock: Arc<dyn TimeEffects>,
    fields: FieldTable,
}

impl DecryptionOrchestrator {
    /// Create an orchestrator writing into `fields`
    pub fn new(
        service: Arc<dyn DecryptionService>,
        clock: Arc<dyn TimeEffects>,
        fields: FieldTable,
    ) -> Self {
        Self {
            service,
            clock,
            fields,
        }
    }

    /// Decrypt `requests` under `authorization` in a single service call.
    ///
    /// Fails as a whole only when a requested contract is not covered or the
    /// authorization is no longer valid; both record the error on the
    /// affected fields. Service failures are reported per field.
    pub async fn decrypt(
        &self,
        authorization: &Authorization,
        requests: &[DecryptRequest],
    ) -> VeilResult<DecryptionReport> {
        if let Some(uncovered) = requests
            .iter()
            .find(|request| !authorization.covers(&request.contract()))
        {
            let err = VeilError::UnauthorizedContract {
                contract: uncovered.contract(),
            };
            warn!(contract = %uncovered.contract(), field = %uncovered.field, "Decrypt requested for uncovered contract");
            for request in requests.iter().filter(|r| !authorization.covers(&r.contract())) {
                if let Some(cell) = self.fields.get(&request.field) {
                    cell.update(|state| state.fail(err.clone()));
                }
            }
            return Err(err);
        }

        let generation = self.fields.generation();
        let mut report = DecryptionReport::default();
        let mut claimed: Vec<(DecryptRequest, InFlightGuard)> = Vec::with_capacity(requests.len());
        for request in requests {
            let Some(cell) = self.fields.get(&request.field) else {
                report.outcomes.insert(
                    request.field,
                    FieldOutcome::Failed(VeilError::invalid(format!("field {} is not tracked", request.field))),
                );
                continue;
            };
            match cell.try_claim() {
                Some(guard) => claimed.push((*request, guard)),
                None => {
                    debug!(field = %request.field, "Decrypt already in flight; coalescing");
                    report.outcomes.insert(request.field, FieldOutcome::Coalesced);
                }
            }
        }
        if claimed.is_empty() {
            return Ok(report);
        }

        let now = self.clock.current_timestamp().await;
        if !authorization.is_valid_at(now) {
            let err = VeilError::authorization_expired(authorization.expires_at());
            warn!(expired_at = authorization.expires_at(), "Decrypt attempted with expired authorization");
            for (request, guard) in &claimed {
                guard.cell().update(|state| {
                    if state.handle == Some(request.handle) {
                        state.fail(err.clone());
                    }
                });
            }
            return Err(err);
        }

        let (empty, written): (Vec<_>, Vec<_>) = claimed
            .into_iter()
            .partition(|(request, _)| request.handle.is_empty());

        for (request, guard) in empty {
            let outcome = self.apply(&guard, &request, generation, Ok(DecryptedValue::Integer(0)));
            report.outcomes.insert(
                request.field,
                if outcome == FieldOutcome::Applied(DecryptedValue::Integer(0)) {
                    FieldOutcome::Empty
                } else {
                    outcome
                },
            );
        }
        if written.is_empty() {
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let handles: Vec<HandleContractPair> = written
            .iter()
            .filter(|(request, _)| seen.insert(request.handle))
            .map(|(request, _)| HandleContractPair {
                handle: request.handle,
                contract: request.contract(),
            })
            .collect();

        let service_request = UserDecryptRequest {
            handles,
            private_key: authorization.private_key.as_slice(),
            public_key: &authorization.public_key,
            signature: &authorization.signature,
            contract_addresses: authorization.contract_addresses.as_slice(),
            user_address: authorization.user_address,
            start_timestamp: authorization.start_timestamp,
            duration_days: authorization.duration_days,
        };

        info!(fields = written.len(), handles = service_request.handles.len(), "Decrypting batch");
        report.service_calls += 1;
        let results = self.service.decrypt_many(&service_request).await;

        match results {
            Ok(plaintexts) => {
                for (request, guard) in written {
                    let value = match plaintexts.get(&request.handle) {
                        Some(plaintext) => Ok(DecryptedValue::from(plaintext.clone())),
                        None => Err(VeilError::decryption_failed(format!(
                            "no plaintext returned for handle {}",
                            request.handle
                        ))),
                    };
                    let outcome = self.apply(&guard, &request, generation, value);
                    report.outcomes.insert(request.field, outcome);
                }
            }
            Err(e) => {
                let err = VeilError::from(e);
                warn!(error = %err, "Decryption service call failed");
                for (request, guard) in written {
                    let outcome = self.apply(&guard, &request, generation, Err(err.clone()));
                    report.outcomes.insert(request.field, outcome);
                }
            }
        }

        Ok(report)
    }

    /// Write one result to its field unless the field moved on.
    fn apply(
        &self,
        guard: &InFlightGuard,
        request: &DecryptRequest,
        generation: u64,
        value: VeilResult<DecryptedValue>,
    ) -> FieldOutcome {
        let locked_since = self.fields.generation() != generation;
        guard.cell().update(|state| {
            if locked_since || state.handle != Some(request.handle) {
                debug!(field = %request.field, handle = %request.handle, "Discarding stale decryption result");
                return FieldOutcome::Stale;
            }
            match value {
                Ok(value) => {
                    state.apply_value(value);
                    FieldOutcome::Applied(value)
                }
                Err(err) => {
                    state.fail(err.clone());
                    FieldOutcome::Failed(err)
                }
            }
        })
    }
}

impl std::fmt::Debug for DecryptionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionOrchestrator")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(byte: u8) -> FieldId {
        FieldId::total_shares(alloy_primitives::Address::repeat_byte(byte))
    }

    #[test]
    fn test_report_counts_and_merge() {
        let mut report = DecryptionReport::default();
        report.outcomes.insert(field(1), FieldOutcome::Applied(DecryptedValue::Integer(1)));
        report.outcomes.insert(field(2), FieldOutcome::Stale);
        report.service_calls = 1;

        let mut retry = DecryptionReport::default();
        retry.outcomes.insert(field(2), FieldOutcome::Applied(DecryptedValue::Integer(2)));
        retry.outcomes.insert(field(3), FieldOutcome::Empty);
        retry.service_calls = 1;

        report.merge(retry);
        assert_eq!(report.applied(), 3);
        assert_eq!(report.stale(), 0);
        assert_eq!(report.service_calls, 2);
    }
}
