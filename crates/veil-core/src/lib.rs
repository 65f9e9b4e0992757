//! Veil Core - Confidential Balance Decryption Coordinator
//!
//! Client-side machinery for reading homomorphically encrypted on-chain
//! values: obtain a time-boxed, contract-scoped authorization from the user's
//! wallet, cache it, and keep decrypted values consistent as ciphertext
//! handles change after transactions.
//!
//! # Components
//!
//! - [`authorization`]: authorization data model, store and manager
//! - [`ciphertext`]: handles, field identities and the registry that refreshes them
//! - [`decryption`]: the batching orchestrator and normalized plaintext values
//! - [`format`]: fixed-point display and the redacted placeholder
//! - [`session`]: the session object tying the above to a field table
//!
//! Wallets, chain reads, the decryption service, persistence and time are
//! injected through the traits in [`effects`].
//!
//! # Invariants
//!
//! - An authorization decrypts only ciphertexts of contracts in its signed set
//! - Concurrent unlocks for the same identity and contract set prompt once
//! - At most one decryption is in flight per field
//! - A result is never applied to a field whose handle has moved on
//! - After `lock`, every field shows the placeholder

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorization;
pub mod ciphertext;
pub mod config;
pub mod decryption;
pub mod effects;
pub mod errors;
pub mod fields;
pub mod format;
pub mod session;

pub use authorization::{
    Authorization, AuthorizationManager, AuthorizationStore, ContractSet, DecryptionPermit,
    DomainParams, EphemeralKeyPair, LockPolicy, StorageKey,
};
pub use ciphertext::{CiphertextHandle, CiphertextRegistry, FieldId, FieldKind, HandleRefresh};
pub use config::VeilConfig;
pub use decryption::{DecryptRequest, DecryptedValue, DecryptionOrchestrator, DecryptionReport, FieldOutcome};
pub use errors::{ErrorScope, VeilError, VeilResult};
pub use fields::{FieldPhase, FieldSnapshot, FieldView};
pub use format::{format_fixed, parse_display, ValueFormatter};
pub use session::{DecryptionSession, DecryptionSessionBuilder};
