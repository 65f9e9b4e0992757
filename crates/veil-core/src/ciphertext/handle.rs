//! Ciphertext handles and field identities.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to an encrypted value held by a source contract.
///
/// The all-zero word is reserved: it means the field was never written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub B256);

impl CiphertextHandle {
    /// The "no value" sentinel
    pub const EMPTY: Self = Self(B256::ZERO);

    /// Wrap a raw 32-byte handle
    pub const fn new(raw: B256) -> Self {
        Self(raw)
    }

    /// Whether this is the "no value" sentinel
    pub fn is_empty(&self) -> bool {
        self.0 == B256::ZERO
    }

    /// Whether the handle refers to a written ciphertext
    pub fn has_value(&self) -> bool {
        !self.is_empty()
    }

    /// Raw handle bytes
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl From<B256> for CiphertextHandle {
    fn from(raw: B256) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tracked quantities of the lending protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Confidential token balance of an account
    Balance,
    /// Vault shares held by an account
    Shares,
    /// Total vault shares outstanding
    TotalShares,
    /// Total assets under vault management
    TotalAssets,
}

impl FieldKind {
    /// Every field kind, in display order
    pub const ALL: [FieldKind; 4] = [
        FieldKind::Balance,
        FieldKind::Shares,
        FieldKind::TotalShares,
        FieldKind::TotalAssets,
    ];

    /// Whether the field is read per account rather than globally
    pub fn is_per_owner(&self) -> bool {
        matches!(self, Self::Balance | Self::Shares)
    }

    /// Stable label, also used as configuration key
    pub fn label(&self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Shares => "shares",
            Self::TotalShares => "total-shares",
            Self::TotalAssets => "total-assets",
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = crate::VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label() == s.trim())
            .ok_or_else(|| crate::VeilError::invalid(format!("unknown field kind: {s}")))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Identity of one tracked encrypted quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    /// Contract holding the ciphertext
    pub contract: Address,
    /// Which quantity
    pub kind: FieldKind,
    /// Account for per-owner fields, `None` for global fields
    pub owner: Option<Address>,
}

impl FieldId {
    /// Per-account field such as a balance or a share count
    pub fn owned(contract: Address, kind: FieldKind, owner: Address) -> Self {
        Self {
            contract,
            kind,
            owner: Some(owner),
        }
    }

    /// Global field such as total shares or total assets
    pub fn global(contract: Address, kind: FieldKind) -> Self {
        Self {
            contract,
            kind,
            owner: None,
        }
    }

    /// Balance of `owner` at token `contract`
    pub fn balance(contract: Address, owner: Address) -> Self {
        Self::owned(contract, FieldKind::Balance, owner)
    }

    /// Shares of `owner` at vault `contract`
    pub fn shares(contract: Address, owner: Address) -> Self {
        Self::owned(contract, FieldKind::Shares, owner)
    }

    /// Total shares at vault `contract`
    pub fn total_shares(contract: Address) -> Self {
        Self::global(contract, FieldKind::TotalShares)
    }

    /// Total assets at vault `contract`
    pub fn total_assets(contract: Address) -> Self {
        Self::global(contract, FieldKind::TotalAssets)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Some(owner) => write!(f, "{}@{}/{}", self.kind, self.contract, owner),
            None => write!(f, "{}@{}", self.kind, self.contract),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel() {
        assert!(CiphertextHandle::EMPTY.is_empty());
        assert!(!CiphertextHandle::EMPTY.has_value());
        assert!(CiphertextHandle::default().is_empty());

        let written = CiphertextHandle::new(B256::repeat_byte(0xab));
        assert!(written.has_value());
    }

    #[test]
    fn test_handle_with_single_nonzero_byte_has_value() {
        let mut raw = [0u8; 32];
        raw[31] = 1;
        assert!(CiphertextHandle::new(B256::from(raw)).has_value());
    }

    #[test]
    fn test_per_owner_kinds() {
        assert!(FieldKind::Balance.is_per_owner());
        assert!(FieldKind::Shares.is_per_owner());
        assert!(!FieldKind::TotalShares.is_per_owner());
        assert!(!FieldKind::TotalAssets.is_per_owner());
    }

    #[test]
    fn test_field_kind_parses_label() {
        for kind in FieldKind::ALL {
            assert_eq!(kind.label().parse::<FieldKind>().ok(), Some(kind));
        }
        assert!("supply".parse::<FieldKind>().is_err());
    }

    #[test]
    fn test_field_kind_serde_matches_label() {
        for kind in FieldKind::ALL {
            let json = serde_json::to_string(&kind).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", kind.label()));
        }
    }
}
