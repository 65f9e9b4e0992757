//! Tracked encrypted fields
//!
//! Each tracked field lives in a [`FieldCell`]: its last fetched handle, its
//! decrypted value and the flags the registry and orchestrator coordinate
//! through. Every mutation republishes a [`FieldSnapshot`] on the cell's
//! signal so UI bindings observe state changes without polling.
//!
//! Per-field state machine (derived, never stored):
//!
//! ```text
//! Idle -> Fetching -> (unchanged) Idle
//!                  -> (changed)   PendingDecrypt -> Decrypting -> Idle
//! ```

use crate::ciphertext::{CiphertextHandle, FieldId};
use crate::decryption::DecryptedValue;
use crate::errors::VeilError;
use crate::format::ValueFormatter;
use futures_signals::signal::{Mutable, MutableSignalCloned};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where a field is in its refresh/decrypt cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldPhase {
    /// Nothing outstanding
    #[default]
    Idle,
    /// A handle fetch is outstanding
    Fetching,
    /// A handle is known but has no decrypted value yet
    PendingDecrypt,
    /// A decryption call for this field is outstanding
    Decrypting,
}

impl fmt::Display for FieldPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::PendingDecrypt => "pending-decrypt",
            Self::Decrypting => "decrypting",
        };
        f.write_str(label)
    }
}

/// Mutable state of one field.
#[derive(Debug, Default)]
pub(crate) struct FieldState {
    pub(crate) handle: Option<CiphertextHandle>,
    pub(crate) value: Option<DecryptedValue>,
    pub(crate) decrypting: bool,
    pub(crate) fetches_outstanding: u32,
    pub(crate) fetch_seq: u64,
    pub(crate) applied_fetch: u64,
    pub(crate) last_error: Option<VeilError>,
}

impl FieldState {
    fn phase(&self) -> FieldPhase {
        if self.decrypting {
            FieldPhase::Decrypting
        } else if self.fetches_outstanding > 0 {
            FieldPhase::Fetching
        } else if self.handle.is_some() && self.value.is_none() {
            FieldPhase::PendingDecrypt
        } else {
            FieldPhase::Idle
        }
    }

    /// Whether an auto-decrypt pass should pick this field up
    pub(crate) fn is_pending(&self) -> bool {
        !self.decrypting && self.handle.is_some() && self.value.is_none()
    }

    /// Record a field-scoped failure; the value reverts to absent.
    pub(crate) fn fail(&mut self, error: VeilError) {
        self.value = None;
        self.last_error = Some(error);
    }

    pub(crate) fn apply_value(&mut self, value: DecryptedValue) {
        self.value = Some(value);
        self.last_error = None;
    }
}

/// Point-in-time view of a field, published on every change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSnapshot {
    /// Field identity
    pub id: FieldId,
    /// Last successfully fetched handle
    pub handle: Option<CiphertextHandle>,
    /// Decrypted value, present only while unlocked and current
    pub value: Option<DecryptedValue>,
    /// Derived lifecycle phase
    pub phase: FieldPhase,
    /// Most recent field-scoped error
    pub last_error: Option<VeilError>,
}

impl FieldSnapshot {
    fn capture(id: FieldId, state: &FieldState) -> Self {
        Self {
            id,
            handle: state.handle,
            value: state.value,
            phase: state.phase(),
            last_error: state.last_error.clone(),
        }
    }

    /// Whether the handle refers to a written ciphertext
    pub fn has_value(&self) -> bool {
        self.handle.is_some_and(|handle| handle.has_value())
    }

    /// Whether a decryption call is outstanding
    pub fn is_decrypting(&self) -> bool {
        self.phase == FieldPhase::Decrypting
    }

    /// Whether the last error offers a retry affordance
    pub fn needs_retry(&self) -> bool {
        self.last_error.as_ref().is_some_and(VeilError::is_retryable)
    }
}

/// Shared cell holding one field's state.
pub struct FieldCell {
    id: FieldId,
    state: Mutex<FieldState>,
    published: Mutable<FieldSnapshot>,
}

impl FieldCell {
    fn new(id: FieldId) -> Self {
        let state = FieldState::default();
        let published = Mutable::new(FieldSnapshot::capture(id, &state));
        Self {
            id,
            state: Mutex::new(state),
            published,
        }
    }

    /// Field identity
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Mutate the state and publish the resulting snapshot.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut FieldState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        let snapshot = FieldSnapshot::capture(self.id, &state);
        drop(state);
        if self.published.get_cloned() != snapshot {
            self.published.set(snapshot);
        }
        result
    }

    /// Read the state without publishing.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&FieldState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Current snapshot
    pub fn snapshot(&self) -> FieldSnapshot {
        self.published.get_cloned()
    }

    /// Snapshot signal for UI binding
    pub fn signal(&self) -> MutableSignalCloned<FieldSnapshot> {
        self.published.signal_cloned()
    }

    /// Claim the per-field decrypt slot.
    ///
    /// Returns `None` when a decryption for this field is already in flight.
    pub(crate) fn try_claim(self: &Arc<Self>) -> Option<InFlightGuard> {
        let claimed = self.update(|state| {
            if state.decrypting {
                false
            } else {
                state.decrypting = true;
                true
            }
        });
        claimed.then(|| InFlightGuard { cell: self.clone() })
    }
}

impl fmt::Debug for FieldCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCell")
            .field("id", &self.id)
            .field("phase", &self.read(FieldState::phase))
            .finish()
    }
}

/// Holds a field's in-flight flag; releasing it is tied to drop so every
/// exit path clears the flag.
pub(crate) struct InFlightGuard {
    cell: Arc<FieldCell>,
}

impl InFlightGuard {
    pub(crate) fn cell(&self) -> &Arc<FieldCell> {
        &self.cell
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.cell.update(|state| state.decrypting = false);
    }
}

/// All fields tracked by a session.
#[derive(Clone, Default)]
pub struct FieldTable {
    cells: Arc<RwLock<BTreeMap<FieldId, Arc<FieldCell>>>>,
    generation: Arc<AtomicU64>,
}

impl FieldTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field, returning the existing cell when already tracked.
    pub fn track(&self, id: FieldId) -> Arc<FieldCell> {
        if let Some(cell) = self.cells.read().get(&id) {
            return cell.clone();
        }
        self.cells
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(FieldCell::new(id)))
            .clone()
    }

    /// Look up a tracked field
    pub fn get(&self, id: &FieldId) -> Option<Arc<FieldCell>> {
        self.cells.read().get(id).cloned()
    }

    /// Ids of every tracked field, in order
    pub fn ids(&self) -> Vec<FieldId> {
        self.cells.read().keys().copied().collect()
    }

    /// Number of tracked fields
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Ids of fields that have a handle but no decrypted value
    pub(crate) fn pending(&self) -> Vec<FieldId> {
        self.cells
            .read()
            .values()
            .filter(|cell| cell.read(FieldState::is_pending))
            .map(|cell| cell.id())
            .collect()
    }

    /// Reset counter; results computed under an older generation are discarded.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Forget every decrypted value and decryption error.
    ///
    /// Handles are kept so the fields decrypt again after the next unlock.
    pub(crate) fn reset_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for cell in self.cells.read().values() {
            cell.update(|state| {
                state.value = None;
                if !matches!(state.last_error, Some(VeilError::FetchFailed { .. })) {
                    state.last_error = None;
                }
            });
        }
    }
}

impl fmt::Debug for FieldTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTable")
            .field("fields", &self.ids())
            .field("generation", &self.generation())
            .finish()
    }
}

/// UI-facing handle to one tracked field.
#[derive(Clone)]
pub struct FieldView {
    cell: Arc<FieldCell>,
    formatter: Arc<ValueFormatter>,
}

impl FieldView {
    pub(crate) fn new(cell: Arc<FieldCell>, formatter: Arc<ValueFormatter>) -> Self {
        Self { cell, formatter }
    }

    /// Field identity
    pub fn id(&self) -> FieldId {
        self.cell.id()
    }

    /// Formatted value, or the placeholder when there is none
    pub fn value(&self) -> String {
        let snapshot = self.cell.snapshot();
        self.formatter.display(snapshot.value.as_ref(), snapshot.id.kind)
    }

    /// Decrypted value, if any
    pub fn decrypted(&self) -> Option<DecryptedValue> {
        self.cell.snapshot().value
    }

    /// Whether the field's handle refers to a written ciphertext
    pub fn has_value(&self) -> bool {
        self.cell.snapshot().has_value()
    }

    /// Whether a decryption for this field is in flight
    pub fn is_decrypting(&self) -> bool {
        self.cell.snapshot().is_decrypting()
    }

    /// Derived lifecycle phase
    pub fn phase(&self) -> FieldPhase {
        self.cell.snapshot().phase
    }

    /// Last fetched handle
    pub fn handle(&self) -> Option<CiphertextHandle> {
        self.cell.snapshot().handle
    }

    /// Most recent field-scoped error
    pub fn last_error(&self) -> Option<VeilError> {
        self.cell.snapshot().last_error
    }

    /// Whether a retry affordance should be shown
    pub fn needs_retry(&self) -> bool {
        self.cell.snapshot().needs_retry()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> FieldSnapshot {
        self.cell.snapshot()
    }

    /// Snapshot signal for UI binding
    pub fn signal(&self) -> MutableSignalCloned<FieldSnapshot> {
        self.cell.signal()
    }
}

impl fmt::Debug for FieldView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldView")
            .field("id", &self.id())
            .field("value", &self.value())
            .field("phase", &self.phase())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
