//! EIP-712 decryption permit and its signing domain.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, Eip712Domain};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

sol! {
    /// Typed-data message binding an ephemeral public key to a contract set and a validity window.
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

/// The message the user's wallet signs to authorize decryption.
pub type DecryptionPermit = UserDecryptRequestVerification;

/// Protocol domain parameters for the permit signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainParams {
    /// EIP-712 domain name
    pub name: String,
    /// EIP-712 domain version
    pub version: String,
    /// Chain the verifying contract lives on
    pub chain_id: u64,
    /// Contract that verifies permits on behalf of the decryption service
    pub verifying_contract: Address,
}

impl Default for DomainParams {
    fn default() -> Self {
        Self {
            name: "Decryption".to_string(),
            version: "1".to_string(),
            chain_id: 11_155_111,
            verifying_contract: Address::ZERO,
        }
    }
}

impl DomainParams {
    /// The EIP-712 domain separator inputs
    pub fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Owned(self.name.clone())),
            Some(Cow::Owned(self.version.clone())),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }
}
