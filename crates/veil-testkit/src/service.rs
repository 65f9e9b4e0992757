//! Mock decryption service.

use crate::gate::Gate;
use alloy_primitives::{Address, Signature, U256};
use alloy_sol_types::SolStruct;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use veil_core::authorization::{DecryptionPermit, DomainParams};
use veil_core::ciphertext::CiphertextHandle;
use veil_core::effects::{DecryptionService, ServiceError, ServiceValue, UserDecryptRequest};

/// What the service saw in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Handles requested, in request order
    pub handles: Vec<CiphertextHandle>,
    /// Contracts the permit covers
    pub contract_addresses: Vec<Address>,
    /// Signer of the permit
    pub user_address: Address,
    /// Start of the validity window
    pub start_timestamp: u64,
}

/// Decryption service backed by a handle-to-plaintext table.
///
/// When constructed with a domain it behaves like a relayer: it rejects
/// requests whose signature does not recover to the user or whose handles
/// belong to contracts outside the signed set.
#[derive(Debug, Clone, Default)]
pub struct MockDecryptionService {
    plaintexts: Arc<RwLock<HashMap<CiphertextHandle, ServiceValue>>>,
    failing: Arc<RwLock<HashSet<CiphertextHandle>>>,
    outage: Arc<Mutex<Option<ServiceError>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    domain: Option<DomainParams>,
    gate: Arc<Gate>,
}

impl MockDecryptionService {
    /// Service that accepts any signature
    pub fn new() -> Self {
        Self::default()
    }

    /// Service that verifies permits signed under `domain`
    pub fn verifying(domain: DomainParams) -> Self {
        Self {
            domain: Some(domain),
            ..Self::default()
        }
    }

    /// Register the plaintext behind a handle
    pub fn set_plaintext(&self, handle: CiphertextHandle, value: ServiceValue) {
        self.plaintexts.write().insert(handle, value);
    }

    /// Register an 18-decimal integer plaintext
    pub fn set_amount(&self, handle: CiphertextHandle, raw: u128) {
        self.set_plaintext(handle, ServiceValue::Uint(U256::from(raw)));
    }

    /// Omit `handle` from results as if the service failed to decrypt it
    pub fn fail_handle(&self, handle: CiphertextHandle) {
        self.failing.write().insert(handle);
    }

    /// Fail every call with `error` until cleared
    pub fn set_outage(&self, error: Option<ServiceError>) {
        *self.outage.lock() = error;
    }

    /// Calls received so far
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every call received, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Gate held while a call is "on the network"
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    fn check_permit(&self, request: &UserDecryptRequest<'_>) -> Result<(), ServiceError> {
        let Some(domain) = &self.domain else {
            return Ok(());
        };
        let permit = DecryptionPermit {
            publicKey: request.public_key.to_vec().into(),
            contractAddresses: request.contract_addresses.to_vec(),
            startTimestamp: U256::from(request.start_timestamp),
            durationDays: U256::from(request.duration_days),
        };
        let hash = permit.eip712_signing_hash(&domain.eip712_domain());
        let signer = Signature::try_from(request.signature.as_ref())
            .ok()
            .and_then(|signature| signature.recover_address_from_prehash(&hash).ok());
        if signer != Some(request.user_address) {
            return Err(ServiceError::Rejected("invalid EIP-712 signature".into()));
        }
        if let Some(pair) = request
            .handles
            .iter()
            .find(|pair| !request.contract_addresses.contains(&pair.contract))
        {
            return Err(ServiceError::Rejected(format!(
                "contract {} not covered by permit",
                pair.contract
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DecryptionService for MockDecryptionService {
    async fn decrypt_many(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<HashMap<CiphertextHandle, ServiceValue>, ServiceError> {
        self.requests.lock().push(RecordedRequest {
            handles: request.handles.iter().map(|pair| pair.handle).collect(),
            contract_addresses: request.contract_addresses.to_vec(),
            user_address: request.user_address,
            start_timestamp: request.start_timestamp,
        });
        self.gate.pass().await;

        if let Some(error) = self.outage.lock().clone() {
            return Err(error);
        }
        self.check_permit(request)?;

        let plaintexts = self.plaintexts.read();
        let failing = self.failing.read();
        Ok(request
            .handles
            .iter()
            .filter(|pair| !failing.contains(&pair.handle))
            .filter_map(|pair| {
                plaintexts
                    .get(&pair.handle)
                    .map(|value| (pair.handle, value.clone()))
            })
            .collect())
    }
}
