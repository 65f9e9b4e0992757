//! Scripted wallet signer.

use crate::gate::Gate;
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::Eip712Domain;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use veil_core::authorization::DecryptionPermit;
use veil_core::effects::{LocalWalletSigner, SignerError, WalletSigner};

/// How the wallet answers the next prompts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WalletMode {
    /// Sign with the wallet's key
    #[default]
    Sign,
    /// The user declines
    Reject,
    /// The wallet transport breaks
    Fail(String),
}

/// Wallet that signs with a deterministic local key and records every prompt.
#[derive(Debug, Clone)]
pub struct ScriptedWallet {
    signer: LocalWalletSigner,
    mode: Arc<Mutex<WalletMode>>,
    prompts: Arc<AtomicUsize>,
    permits: Arc<Mutex<Vec<DecryptionPermit>>>,
    gate: Arc<Gate>,
}

impl ScriptedWallet {
    /// Wallet whose private key is `seed` repeated 32 times
    pub fn from_seed(seed: u8) -> Self {
        let signer = LocalWalletSigner::from_bytes(&B256::repeat_byte(seed))
            .expect("repeated non-zero byte is a valid secp256k1 scalar");
        Self {
            signer,
            mode: Arc::new(Mutex::new(WalletMode::Sign)),
            prompts: Arc::new(AtomicUsize::new(0)),
            permits: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Gate::new()),
        }
    }

    /// Change how subsequent prompts are answered
    pub fn set_mode(&self, mode: WalletMode) {
        *self.mode.lock() = mode;
    }

    /// Number of signing prompts shown
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Permits presented for signing, in order
    pub fn permits(&self) -> Vec<DecryptionPermit> {
        self.permits.lock().clone()
    }

    /// Gate held while the user "considers" the prompt
    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

#[async_trait]
impl WalletSigner for ScriptedWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        permit: &DecryptionPermit,
    ) -> Result<Bytes, SignerError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.permits.lock().push(permit.clone());
        self.gate.pass().await;

        let mode = self.mode.lock().clone();
        match mode {
            WalletMode::Sign => self.signer.sign_typed_data(domain, permit).await,
            WalletMode::Reject => Err(SignerError::Rejected),
            WalletMode::Fail(reason) => Err(SignerError::Transport(reason)),
        }
    }
}
