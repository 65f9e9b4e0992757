//! Decryption service effect.

use crate::ciphertext::CiphertextHandle;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Error type for the decryption service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service refused the request (bad signature, expired window, ACL)
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// The service could not be reached or failed internally
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<ServiceError> for crate::VeilError {
    fn from(err: ServiceError) -> Self {
        crate::VeilError::decryption_failed(err.to_string())
    }
}

/// Plaintext shapes returned by decryption services.
///
/// Different service SDKs return integers as numbers or decimal strings and
/// booleans natively; the orchestrator normalizes these immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceValue {
    /// Unsigned integer plaintext
    Uint(U256),
    /// Boolean plaintext
    Bool(bool),
    /// Plaintext rendered as a string by the service
    Text(String),
}

/// A handle together with the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleContractPair {
    /// Ciphertext handle
    pub handle: CiphertextHandle,
    /// Contract the handle was read from
    pub contract: Address,
}

/// A batched user-decryption request.
pub struct UserDecryptRequest<'a> {
    /// Handles to decrypt, de-duplicated
    pub handles: Vec<HandleContractPair>,
    /// Ephemeral private key the service re-encrypts results to
    pub private_key: &'a [u8],
    /// Ephemeral public key bound into the signature
    pub public_key: &'a [u8],
    /// User's EIP-712 signature over the permit
    pub signature: &'a Bytes,
    /// Sorted contract set the permit covers
    pub contract_addresses: &'a [Address],
    /// Signer of the permit
    pub user_address: Address,
    /// Start of the validity window (Unix seconds)
    pub start_timestamp: u64,
    /// Length of the validity window in days
    pub duration_days: u64,
}

impl fmt::Debug for UserDecryptRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDecryptRequest")
            .field("handles", &self.handles)
            .field("private_key", &"<redacted>")
            .field("public_key", &hex::encode(self.public_key))
            .field("contract_addresses", &self.contract_addresses)
            .field("user_address", &self.user_address)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish_non_exhaustive()
    }
}

/// External service that turns ciphertext handles into plaintexts for an authorized user.
#[async_trait]
pub trait DecryptionService: Send + Sync {
    /// Decrypt a batch of handles in one round trip.
    ///
    /// The returned map may omit handles the service could not decrypt.
    async fn decrypt_many(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<HashMap<CiphertextHandle, ServiceValue>, ServiceError>;
}

#[async_trait]
impl<T: DecryptionService + ?Sized> DecryptionService for Arc<T> {
    async fn decrypt_many(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<HashMap<CiphertextHandle, ServiceValue>, ServiceError> {
        (**self).decrypt_many(request).await
    }
}
