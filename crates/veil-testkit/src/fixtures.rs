//! Common session fixtures.

use crate::service::MockDecryptionService;
use crate::source::MockCiphertextSource;
use crate::storage::MemoryStorage;
use crate::time::ControllableClock;
use crate::wallet::ScriptedWallet;
use alloy_primitives::{Address, B256};
use std::sync::Arc;
use veil_core::authorization::{DomainParams, LockPolicy};
use veil_core::ciphertext::{CiphertextHandle, FieldId};
use veil_core::effects::WalletSigner;
use veil_core::fields::FieldView;
use veil_core::{DecryptionSession, DecryptionSessionBuilder};

/// Start of the fixture clock.
pub const START_TIMESTAMP: u64 = 1_000;

/// Seed of the fixture wallet key.
pub const WALLET_SEED: u8 = 0x42;

/// One token unit at the 18-decimal scale.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Confidential token contract.
pub fn token() -> Address {
    Address::repeat_byte(0x7a)
}

/// Vault contract.
pub fn vault() -> Address {
    Address::repeat_byte(0x5a)
}

/// A contract outside the fixture's signed set.
pub fn outsider() -> Address {
    Address::repeat_byte(0xc0)
}

/// Domain the fixture signs under.
pub fn domain() -> DomainParams {
    DomainParams {
        verifying_contract: Address::repeat_byte(0xdd),
        ..DomainParams::default()
    }
}

/// Handle made of one repeated byte.
pub fn handle(byte: u8) -> CiphertextHandle {
    CiphertextHandle::new(B256::repeat_byte(byte))
}

/// A fully wired session with handles on every collaborator.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// Session under test
    pub session: DecryptionSession,
    /// Wallet; its address is the session user
    pub wallet: ScriptedWallet,
    /// Ciphertext source
    pub source: MockCiphertextSource,
    /// Decryption service (verifies signatures)
    pub service: MockDecryptionService,
    /// Authorization storage
    pub storage: MemoryStorage,
    /// Clock starting at [`START_TIMESTAMP`]
    pub clock: ControllableClock,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Session over `[vault, token]` with the default lock policy
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Session with a specific lock policy
    pub fn with_lock_policy(policy: LockPolicy) -> Self {
        Self::with(|builder| builder.with_lock_policy(policy))
    }

    /// Session customized through the builder
    pub fn with(customize: impl FnOnce(DecryptionSessionBuilder) -> DecryptionSessionBuilder) -> Self {
        Self::with_storage(MemoryStorage::new(), ControllableClock::new(START_TIMESTAMP), customize)
    }

    /// Session sharing existing storage and clock, as a page reload would
    pub fn with_storage(
        storage: MemoryStorage,
        clock: ControllableClock,
        customize: impl FnOnce(DecryptionSessionBuilder) -> DecryptionSessionBuilder,
    ) -> Self {
        let wallet = ScriptedWallet::from_seed(WALLET_SEED);
        let source = MockCiphertextSource::new();
        let service = MockDecryptionService::verifying(domain());

        let builder = DecryptionSession::builder(wallet.address())
            .with_contracts([vault(), token()])
            .with_domain(domain())
            .with_signer(Arc::new(wallet.clone()))
            .with_source(Arc::new(source.clone()))
            .with_service(Arc::new(service.clone()))
            .with_storage(Arc::new(storage.clone()))
            .with_clock(Arc::new(clock.clone()));
        let session = customize(builder).build().unwrap();

        Self {
            session,
            wallet,
            source,
            service,
            storage,
            clock,
        }
    }

    /// Session user
    pub fn user(&self) -> Address {
        self.session.user()
    }

    /// Track the user's shares at the vault
    pub fn track_shares(&self) -> FieldView {
        self.session.track(FieldId::shares(vault(), self.user()))
    }

    /// Track the user's token balance
    pub fn track_balance(&self) -> FieldView {
        self.session.track(FieldId::balance(token(), self.user()))
    }

    /// Track the vault's total assets
    pub fn track_total_assets(&self) -> FieldView {
        self.session.track(FieldId::total_assets(vault()))
    }

    /// Put `raw` behind `handle` for `field`, as a confirmed transaction would
    pub fn write_field(&self, field: FieldId, handle: CiphertextHandle, raw: u128) {
        self.source.set_handle(field, handle);
        self.service.set_amount(handle, raw);
    }
}
