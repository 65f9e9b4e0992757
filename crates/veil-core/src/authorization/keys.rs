//! Ephemeral session key pairs.

use rand::rngs::OsRng;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// X25519 key pair generated per authorization.
///
/// Independent of the user's wallet key. The decryption service re-encrypts
/// plaintexts to the public half; the private half never leaves the session
/// and its backing memory is wiped on drop.
pub struct EphemeralKeyPair {
    secret: Zeroizing<[u8; 32]>,
    public: [u8; 32],
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair from the OS RNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret.to_bytes()),
            public: public.to_bytes(),
        }
    }

    /// Rebuild a key pair from stored private key bytes
    pub fn from_private_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret.to_bytes()),
            public: public.to_bytes(),
        }
    }

    /// Public key bytes
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Private key bytes
    pub fn private_key(&self) -> &[u8; 32] {
        &self.secret
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}
