//! Ciphertext registry
//!
//! Fetches the latest handle of each tracked field from its source contract
//! and decides whether the field's decrypted value is still current. A failed
//! fetch leaves the previous handle and value in place.

use super::handle::{CiphertextHandle, FieldId};
use crate::effects::CiphertextSource;
use crate::errors::{VeilError, VeilResult};
use crate::fields::{FieldCell, FieldTable};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a successful handle fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleRefresh {
    /// Handle now stored for the field
    pub handle: CiphertextHandle,
    /// Whether the handle refers to a written ciphertext
    pub has_value: bool,
    /// Whether the handle differs from the previously stored one
    pub changed: bool,
}

/// Keeps tracked fields' handles in step with their source contracts.
#[derive(Clone)]
pub struct CiphertextRegistry {
    source: Arc<dyn CiphertextSource>,
    fields: FieldTable,
}

impl CiphertextRegistry {
    /// Create a registry over a source and the session's field table
    pub fn new(source: Arc<dyn CiphertextSource>, fields: FieldTable) -> Self {
        Self { source, fields }
    }

    /// Field table the registry writes into
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Read the current handle of `field` and store it.
    ///
    /// Tracks the field if it is not tracked yet. When the handle changed the
    /// decrypted value is cleared. Results of fetches that were overtaken by
    /// a newer fetch of the same field are not applied.
    pub async fn fetch_handle(&self, field: &FieldId) -> VeilResult<HandleRefresh> {
        let cell = self.fields.track(*field);
        let seq = cell.update(|state| {
            state.fetch_seq += 1;
            state.fetches_outstanding += 1;
            state.fetch_seq
        });

        let result = self
            .source
            .read_encrypted_field(field.contract, field.kind, field.owner)
            .await;

        match result {
            Ok(handle) => Ok(Self::apply_handle(&cell, seq, handle)),
            Err(e) => {
                let err = VeilError::fetch_failed(field.contract, e.to_string());
                warn!(field = %field, error = %e, "Handle fetch failed; keeping previous state");
                Self::apply_failure(&cell, seq, err.clone());
                Err(err)
            }
        }
    }

    fn apply_handle(cell: &Arc<FieldCell>, seq: u64, handle: CiphertextHandle) -> HandleRefresh {
        let field = cell.id();
        cell.update(|state| {
            state.fetches_outstanding = state.fetches_outstanding.saturating_sub(1);
            if seq <= state.applied_fetch {
                debug!(field = %field, seq, "Discarding out-of-order handle fetch");
                let current = state.handle.unwrap_or_default();
                return HandleRefresh {
                    handle: current,
                    has_value: current.has_value(),
                    changed: false,
                };
            }
            state.applied_fetch = seq;

            let changed = state.handle != Some(handle);
            if changed {
                if let Some(previous) = state.handle {
                    info!(field = %field, %previous, current = %handle, "Ciphertext handle changed");
                }
                state.handle = Some(handle);
                state.value = None;
                state.last_error = None;
            } else if matches!(state.last_error, Some(VeilError::FetchFailed { .. })) {
                state.last_error = None;
            }

            HandleRefresh {
                handle,
                has_value: handle.has_value(),
                changed,
            }
        })
    }

    /// Only successful reads advance `applied_fetch`; a failure must not
    /// cause an earlier-started read that carries a newer handle to be dropped.
    fn apply_failure(cell: &Arc<FieldCell>, seq: u64, err: VeilError) {
        cell.update(|state| {
            state.fetches_outstanding = state.fetches_outstanding.saturating_sub(1);
            if seq > state.applied_fetch {
                state.last_error = Some(err);
            }
        });
    }
}

impl std::fmt::Debug for CiphertextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiphertextRegistry")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
