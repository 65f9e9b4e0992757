//! Collaborator effects
//!
//! The coordinator never talks to a wallet, an RPC node, a relayer or a disk
//! directly. Each of those is an effect trait injected as `Arc<dyn Trait>`
//! when the session is built:
//!
//! - [`WalletSigner`]: typed-data signatures from the user's wallet
//! - [`CiphertextSource`]: read-only access to encrypted on-chain fields
//! - [`DecryptionService`]: batched user decryption of ciphertext handles
//! - [`StorageEffects`]: durable key/value persistence
//! - [`TimeEffects`]: wall-clock time
//!
//! Production handlers for time, storage and local-key signing live beside
//! their traits. Deterministic handlers for tests live in `veil-testkit`.

pub mod decryption;
pub mod source;
pub mod storage;
pub mod time;
pub mod wallet;

pub use decryption::{DecryptionService, HandleContractPair, ServiceError, ServiceValue, UserDecryptRequest};
pub use source::{CiphertextSource, SourceError};
pub use storage::{FilesystemStorage, StorageEffects, StorageError};
pub use time::{SystemClock, TimeEffects};
pub use wallet::{LocalWalletSigner, SignerError, WalletSigner};
