//! Deterministic storage keys for cached authorizations.

use super::permit::DomainParams;
use super::types::ContractSet;
use alloy_primitives::{Address, Keccak256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every cached authorization key.
pub const STORAGE_KEY_PREFIX: &str = "veil.authorization.";

/// Key under which one logical authorization is cached.
///
/// Derived from the user, the canonical contract set and the protocol domain.
/// A different contract set (for example after a redeploy) yields a different
/// key, so the old record becomes unreachable instead of being reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the key for a user, contract set and domain
    pub fn derive(user: &Address, contracts: &ContractSet, domain: &DomainParams) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(user.as_slice());
        hasher.update((contracts.len() as u64).to_be_bytes());
        for contract in contracts.iter() {
            hasher.update(contract.as_slice());
        }
        hasher.update(domain.chain_id.to_be_bytes());
        hasher.update(domain.verifying_contract.as_slice());
        for part in [&domain.name, &domain.version] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        Self(format!("{STORAGE_KEY_PREFIX}{}", hex::encode(digest)))
    }

    /// Wrap a key read back from storage, if it carries the authorization prefix
    pub fn from_stored(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        key.starts_with(STORAGE_KEY_PREFIX).then_some(Self(key))
    }

    /// Key as stored
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_key_is_order_independent() {
        let domain = DomainParams::default();
        let forward = ContractSet::new([addr(1), addr(2)]).unwrap();
        let reverse = ContractSet::new([addr(2), addr(1)]).unwrap();
        assert_eq!(
            StorageKey::derive(&addr(9), &forward, &domain),
            StorageKey::derive(&addr(9), &reverse, &domain)
        );
    }

    #[test]
    fn test_key_changes_with_membership() {
        let domain = DomainParams::default();
        let original = ContractSet::new([addr(1), addr(2)]).unwrap();
        let redeployed = ContractSet::new([addr(1), addr(3)]).unwrap();
        let superset = ContractSet::new([addr(1), addr(2), addr(3)]).unwrap();
        let base = StorageKey::derive(&addr(9), &original, &domain);
        assert_ne!(base, StorageKey::derive(&addr(9), &redeployed, &domain));
        assert_ne!(base, StorageKey::derive(&addr(9), &superset, &domain));
    }

    #[test]
    fn test_key_changes_with_user_and_domain() {
        let domain = DomainParams::default();
        let set = ContractSet::new([addr(1)]).unwrap();
        let base = StorageKey::derive(&addr(9), &set, &domain);
        assert_ne!(base, StorageKey::derive(&addr(8), &set, &domain));

        let other_chain = DomainParams {
            chain_id: 8_009,
            ..DomainParams::default()
        };
        assert_ne!(base, StorageKey::derive(&addr(9), &set, &other_chain));
    }

    #[test]
    fn test_key_has_prefix() {
        let set = ContractSet::new([addr(1)]).unwrap();
        let key = StorageKey::derive(&addr(9), &set, &DomainParams::default());
        assert!(key.as_str().starts_with(STORAGE_KEY_PREFIX));
        assert_eq!(StorageKey::from_stored(key.as_str()), Some(key));
        assert_eq!(StorageKey::from_stored("unrelated"), None);
    }
}
