//! Mock ciphertext source.

use alloy_primitives::Address;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use veil_core::ciphertext::{CiphertextHandle, FieldId, FieldKind};
use veil_core::effects::{CiphertextSource, SourceError};

/// Source contracts simulated as a map from field to current handle.
///
/// Unknown fields read as the empty sentinel, as an unwritten slot would.
#[derive(Debug, Clone, Default)]
pub struct MockCiphertextSource {
    handles: Arc<RwLock<HashMap<FieldId, CiphertextHandle>>>,
    unavailable: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl MockCiphertextSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handle a field currently holds (as a transaction would)
    pub fn set_handle(&self, field: FieldId, handle: CiphertextHandle) {
        self.handles.write().insert(field, handle);
    }

    /// Make reads fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reads served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CiphertextSource for MockCiphertextSource {
    async fn read_encrypted_field(
        &self,
        contract: Address,
        kind: FieldKind,
        owner: Option<Address>,
    ) -> Result<CiphertextHandle, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable(format!("rpc unreachable for {contract}")));
        }
        let field = FieldId {
            contract,
            kind,
            owner,
        };
        Ok(self.handles.read().get(&field).copied().unwrap_or_default())
    }
}
