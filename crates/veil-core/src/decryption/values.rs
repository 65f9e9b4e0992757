//! Normalized plaintext values.

use crate::effects::ServiceValue;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A decrypted plaintext, normalized at the orchestrator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecryptedValue {
    /// Fixed-point integer with an implicit 18-decimal scale
    Integer(u128),
    /// Boolean plaintext
    Boolean(bool),
    /// The service answered with something that cannot be displayed
    Unavailable,
}

impl DecryptedValue {
    /// Raw integer, if this is one
    pub fn as_integer(&self) -> Option<u128> {
        match self {
            Self::Integer(raw) => Some(*raw),
            _ => None,
        }
    }
}

impl From<ServiceValue> for DecryptedValue {
    fn from(value: ServiceValue) -> Self {
        match value {
            ServiceValue::Bool(flag) => Self::Boolean(flag),
            ServiceValue::Uint(raw) => narrow(raw),
            ServiceValue::Text(text) => match text.trim().parse::<U256>() {
                Ok(raw) => narrow(raw),
                Err(_) => match text.trim() {
                    "true" => Self::Boolean(true),
                    "false" => Self::Boolean(false),
                    _ => {
                        warn!(%text, "Unparsable plaintext from decryption service");
                        Self::Unavailable
                    }
                },
            },
        }
    }
}

fn narrow(raw: U256) -> DecryptedValue {
    match u128::try_from(raw) {
        Ok(raw) => DecryptedValue::Integer(raw),
        Err(_) => {
            warn!(%raw, "Plaintext exceeds 128 bits");
            DecryptedValue::Unavailable
        }
    }
}
