//! Decryption authorizations
//!
//! An [`Authorization`] binds an ephemeral X25519 key pair to an exact
//! [`ContractSet`], a user and a validity window through the user's EIP-712
//! signature over a [`DecryptionPermit`]. The [`AuthorizationManager`] creates
//! or reuses one per session; the [`AuthorizationStore`] caches them under a
//! deterministic [`StorageKey`].

mod keys;
mod manager;
mod permit;
mod storage_key;
mod store;
mod types;

pub use keys::EphemeralKeyPair;
pub use manager::{AuthorizationManager, LockPolicy};
pub use permit::{DecryptionPermit, DomainParams, UserDecryptRequestVerification};
pub use storage_key::{StorageKey, STORAGE_KEY_PREFIX};
pub use store::AuthorizationStore;
pub use types::{Authorization, ContractSet, DEFAULT_DURATION_DAYS, SECONDS_PER_DAY};
