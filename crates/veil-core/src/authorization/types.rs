//! Authorization data model.

use super::keys::EphemeralKeyPair;
use super::permit::{DecryptionPermit, DomainParams};
use crate::errors::{VeilError, VeilResult};
use alloy_primitives::{Address, Bytes, Signature, U256};
use alloy_sol_types::SolStruct;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Seconds in one validity day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default validity window for new authorizations.
pub const DEFAULT_DURATION_DAYS: u64 = 365;

/// Sorted, de-duplicated set of target contracts.
///
/// Any permutation of the same addresses produces an equal set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Address>", into = "Vec<Address>")]
pub struct ContractSet(Vec<Address>);

impl ContractSet {
    /// Build a set from addresses in any order. Empty input is rejected.
    pub fn new(contracts: impl IntoIterator<Item = Address>) -> VeilResult<Self> {
        let mut contracts: Vec<Address> = contracts.into_iter().collect();
        contracts.sort();
        contracts.dedup();
        if contracts.is_empty() {
            return Err(VeilError::invalid("contract set must not be empty"));
        }
        Ok(Self(contracts))
    }

    /// Membership test
    pub fn contains(&self, contract: &Address) -> bool {
        self.0.binary_search(contract).is_ok()
    }

    /// Addresses in canonical (ascending) order
    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    /// Number of contracts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Address>> for ContractSet {
    type Error = VeilError;

    fn try_from(contracts: Vec<Address>) -> Result<Self, Self::Error> {
        Self::new(contracts)
    }
}

impl From<ContractSet> for Vec<Address> {
    fn from(set: ContractSet) -> Self {
        set.0
    }
}

impl fmt::Display for ContractSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, contract) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{contract}")?;
        }
        write!(f, "]")
    }
}

/// A time-boxed, contract-set-scoped, user-signed permission to decrypt.
///
/// Serialized as one JSON record per storage key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Ephemeral public key, hex encoded
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Ephemeral private key, hex encoded
    #[serde(with = "hex_secret")]
    pub private_key: Zeroizing<Vec<u8>>,
    /// 65-byte EIP-712 signature over the permit
    pub signature: Bytes,
    /// Start of the validity window (Unix seconds)
    pub start_timestamp: u64,
    /// Length of the validity window in days
    pub duration_days: u64,
    /// Signer of the permit
    pub user_address: Address,
    /// Contracts whose ciphertexts this authorization may decrypt
    pub contract_addresses: ContractSet,
}

impl Authorization {
    /// Assemble an authorization from a freshly signed permit.
    pub fn new(
        key_pair: &EphemeralKeyPair,
        signature: Bytes,
        start_timestamp: u64,
        duration_days: u64,
        user_address: Address,
        contract_addresses: ContractSet,
    ) -> Self {
        Self {
            public_key: key_pair.public_key().to_vec(),
            private_key: Zeroizing::new(key_pair.private_key().to_vec()),
            signature,
            start_timestamp,
            duration_days,
            user_address,
            contract_addresses,
        }
    }

    /// First second at which the authorization is no longer valid
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Validity check against a wall-clock reading. No I/O.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    /// Whether ciphertexts of `contract` may be decrypted with this authorization
    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.contains(contract)
    }

    /// Whether this authorization was issued for exactly this identity and contract set
    pub fn matches(&self, user: &Address, contracts: &ContractSet) -> bool {
        self.user_address == *user && self.contract_addresses == *contracts
    }

    /// The permit this authorization's signature covers
    pub fn permit(&self) -> DecryptionPermit {
        DecryptionPermit {
            publicKey: Bytes::copy_from_slice(&self.public_key),
            contractAddresses: self.contract_addresses.as_slice().to_vec(),
            startTimestamp: U256::from(self.start_timestamp),
            durationDays: U256::from(self.duration_days),
        }
    }

    /// Recover the permit signer and require it to be `user_address`.
    pub fn verify_signature(&self, domain: &DomainParams) -> VeilResult<()> {
        let signature = Signature::try_from(self.signature.as_ref())
            .map_err(|e| VeilError::invalid(format!("malformed signature: {e}")))?;
        let hash = self.permit().eip712_signing_hash(&domain.eip712_domain());
        let signer = signature
            .recover_address_from_prehash(&hash)
            .map_err(|e| VeilError::invalid(format!("unrecoverable signature: {e}")))?;
        if signer != self.user_address {
            return Err(VeilError::invalid(format!(
                "signature recovers to {signer}, expected {}",
                self.user_address
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .field("user_address", &self.user_address)
            .field("contract_addresses", &self.contract_addresses)
            .finish_non_exhaustive()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

mod hex_secret {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(
        bytes: &Zeroizing<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(hex::encode(bytes.as_slice()));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        hex::decode(text.trim_start_matches("0x"))
            .map(Zeroizing::new)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn authorization(start: u64, days: u64) -> Authorization {
        Authorization::new(
            &EphemeralKeyPair::generate(),
            Bytes::from(vec![0u8; 65]),
            start,
            days,
            addr(0x11),
            ContractSet::new([addr(0xbb), addr(0xaa)]).unwrap(),
        )
    }

    #[test]
    fn test_contract_set_is_order_independent() {
        let a = ContractSet::new([addr(3), addr(1), addr(2)]).unwrap();
        let b = ContractSet::new([addr(2), addr(3), addr(1), addr(1)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_slice(), &[addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn test_empty_contract_set_rejected() {
        let err = ContractSet::new(Vec::new()).unwrap_err();
        assert_eq!(err.label(), "Invalid");
    }

    #[test]
    fn test_expiry_boundary() {
        let auth = authorization(1_000, 365);
        let end = 1_000 + 365 * SECONDS_PER_DAY;
        assert_eq!(auth.expires_at(), end);
        assert!(auth.is_valid_at(1_000));
        assert!(auth.is_valid_at(end - 1));
        assert!(!auth.is_valid_at(end));
        assert!(!auth.is_valid_at(end + 1));
    }

    #[test]
    fn test_expiry_saturates() {
        let auth = authorization(u64::MAX - 10, u64::MAX);
        assert_eq!(auth.expires_at(), u64::MAX);
    }

    #[test]
    fn test_covers_only_signed_contracts() {
        let auth = authorization(0, 1);
        assert!(auth.covers(&addr(0xaa)));
        assert!(auth.covers(&addr(0xbb)));
        assert!(!auth.covers(&addr(0xcc)));
    }

    #[test]
    fn test_json_round_trip_keeps_secret() {
        let auth = authorization(1_000, 30);
        let json = serde_json::to_string(&auth).unwrap();
        assert!(json.contains("\"contractAddresses\""));
        let restored: Authorization = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, auth);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let auth = authorization(1_000, 30);
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(auth.private_key.as_slice())));
    }

    #[test]
    fn test_zeroed_signature_does_not_verify() {
        let auth = authorization(1_000, 30);
        assert!(auth.verify_signature(&DomainParams::default()).is_err());
    }
}
