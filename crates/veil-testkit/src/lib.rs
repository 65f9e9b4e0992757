//! Veil Testing Infrastructure
//!
//! Deterministic, in-memory stand-ins for every collaborator a
//! [`DecryptionSession`](veil_core::DecryptionSession) needs, plus fixtures
//! that wire them together.
//!
//! ```rust,no_run
//! use veil_testkit::fixtures::TestEnv;
//!
//! # async fn example() {
//! let env = TestEnv::new();
//! let shares = env.track_shares();
//! env.source.set_handle(shares.id(), veil_testkit::fixtures::handle(0xab));
//! env.session.refresh(&shares.id()).await.unwrap();
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod gate;
pub mod service;
pub mod source;
pub mod storage;
pub mod time;
pub mod wallet;

pub use fixtures::TestEnv;
pub use gate::Gate;
pub use service::{MockDecryptionService, RecordedRequest};
pub use source::MockCiphertextSource;
pub use storage::MemoryStorage;
pub use time::ControllableClock;
pub use wallet::{ScriptedWallet, WalletMode};
