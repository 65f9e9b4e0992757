//! Wallet signing effect.

use crate::authorization::DecryptionPermit;
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use std::sync::Arc;

/// Error type for wallet signing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The user declined the prompt
    #[error("User rejected the signature request")]
    Rejected,
    /// Wallet or transport failure
    #[error("Wallet transport error: {0}")]
    Transport(String),
}

impl From<SignerError> for crate::VeilError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Rejected => crate::VeilError::SigningRejected,
            SignerError::Transport(reason) => crate::VeilError::signing_failed(reason),
        }
    }
}

/// The user's wallet, able to produce EIP-712 typed-data signatures.
///
/// Signing may suspend for as long as the user takes to answer the prompt.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address of the connected account
    fn address(&self) -> Address;

    /// Sign a decryption permit under the given EIP-712 domain.
    ///
    /// Returns the 65-byte `r || s || v` signature.
    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        permit: &DecryptionPermit,
    ) -> Result<Bytes, SignerError>;
}

#[async_trait]
impl<T: WalletSigner + ?Sized> WalletSigner for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        permit: &DecryptionPermit,
    ) -> Result<Bytes, SignerError> {
        (**self).sign_typed_data(domain, permit).await
    }
}

/// Signer backed by a local secp256k1 key, for scripts and tooling.
#[derive(Debug, Clone)]
pub struct LocalWalletSigner {
    signer: PrivateKeySigner,
}

impl LocalWalletSigner {
    /// Wrap an existing local signer
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Build from a raw 32-byte private key
    pub fn from_bytes(key: &B256) -> Result<Self, SignerError> {
        PrivateKeySigner::from_bytes(key)
            .map(Self::new)
            .map_err(|e| SignerError::Transport(format!("invalid private key: {e}")))
    }
}

#[async_trait]
impl WalletSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        permit: &DecryptionPermit,
    ) -> Result<Bytes, SignerError> {
        let hash = permit.eip712_signing_hash(domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| SignerError::Transport(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}
