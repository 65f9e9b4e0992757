//! Ciphertext source effect.

use crate::ciphertext::{CiphertextHandle, FieldKind};
use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;

/// Error type for ciphertext reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached; retrying later may succeed
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    /// The source answered with something that is not a handle
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Read-only access to the encrypted fields of source contracts.
#[async_trait]
pub trait CiphertextSource: Send + Sync {
    /// Read the current ciphertext handle of a field.
    ///
    /// `owner` is `Some` for per-account fields and `None` for global ones.
    async fn read_encrypted_field(
        &self,
        contract: Address,
        kind: FieldKind,
        owner: Option<Address>,
    ) -> Result<CiphertextHandle, SourceError>;
}

#[async_trait]
impl<T: CiphertextSource + ?Sized> CiphertextSource for Arc<T> {
    async fn read_encrypted_field(
        &self,
        contract: Address,
        kind: FieldKind,
        owner: Option<Address>,
    ) -> Result<CiphertextHandle, SourceError> {
        (**self).read_encrypted_field(contract, kind, owner).await
    }
}
