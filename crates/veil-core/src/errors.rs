//! Categorized coordinator errors
//!
//! A single error type covers the whole coordinator. Variants carry enough
//! classification for frontends to decide between an informational state, a
//! retry affordance and a hard failure:
//! - Session-scoped errors (authorization acquisition) block every field
//! - Field-scoped errors only affect the field they were raised for

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for coordinator operations.
pub type VeilResult<T> = Result<T, VeilError>;

/// Unified error type for the decryption coordinator.
///
/// `Clone` so a single unlock outcome can be handed to every concurrent caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VeilError {
    /// The user declined the wallet signing prompt
    #[error("Signing rejected by user")]
    SigningRejected,

    /// The session was locked while an unlock was in progress; nothing was published
    #[error("Session locked during unlock")]
    LockedDuringUnlock,

    /// The wallet or its transport failed while signing
    #[error("Signing failed: {reason}")]
    SigningFailed {
        /// Failure reported by the wallet
        reason: String,
    },

    /// A ciphertext was requested against an authorization that does not cover its contract
    #[error("Contract {contract} is not covered by the active authorization")]
    UnauthorizedContract {
        /// The offending contract address
        contract: Address,
    },

    /// The decryption service failed or the authorization is no longer valid
    #[error("Decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure description
        reason: String,
    },

    /// Reading a ciphertext handle from its source failed
    #[error("Fetching ciphertext handle from {contract} failed: {reason}")]
    FetchFailed {
        /// Source contract of the field
        contract: Address,
        /// Failure description
        reason: String,
    },

    /// Persistent store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Failure description
        message: String,
    },

    /// Serialization or deserialization failure
    #[error("Serialization error: {message}")]
    Serialization {
        /// Failure description
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Failure description
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Failure description
        message: String,
    },
}

impl VeilError {
    /// Create a signing failure
    pub fn signing_failed(reason: impl Into<String>) -> Self {
        Self::SigningFailed {
            reason: reason.into(),
        }
    }

    /// Create a decryption failure
    pub fn decryption_failed(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            reason: reason.into(),
        }
    }

    /// Decryption failure raised when the authorization expired
    pub fn authorization_expired(expired_at: u64) -> Self {
        Self::DecryptionFailed {
            reason: format!("authorization expired at {expired_at}"),
        }
    }

    /// Create a fetch failure for a source contract
    pub fn fetch_failed(contract: Address, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            contract,
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Which part of the session this error affects.
    #[must_use]
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::SigningRejected
            | Self::LockedDuringUnlock
            | Self::SigningFailed { .. }
            | Self::Storage { .. }
            | Self::Config { .. } => ErrorScope::Session,
            Self::UnauthorizedContract { .. }
            | Self::DecryptionFailed { .. }
            | Self::FetchFailed { .. }
            | Self::Serialization { .. }
            | Self::Invalid { .. } => ErrorScope::Field,
        }
    }

    /// Whether re-invoking the failed operation may succeed.
    ///
    /// A rejected signature is deliberately not retryable: retrying would
    /// prompt the user again without them asking for it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SigningFailed { .. }
                | Self::DecryptionFailed { .. }
                | Self::FetchFailed { .. }
                | Self::Storage { .. }
        )
    }

    /// Whether this should be shown as an informational state rather than an error banner.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::SigningRejected | Self::LockedDuringUnlock)
    }

    /// Short label for logging/display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::SigningRejected => "SigningRejected",
            Self::LockedDuringUnlock => "LockedDuringUnlock",
            Self::SigningFailed { .. } => "SigningFailed",
            Self::UnauthorizedContract { .. } => "UnauthorizedContract",
            Self::DecryptionFailed { .. } => "DecryptionFailed",
            Self::FetchFailed { .. } => "FetchFailed",
            Self::Storage { .. } => "Storage",
            Self::Serialization { .. } => "Serialization",
            Self::Config { .. } => "Config",
            Self::Invalid { .. } => "Invalid",
        }
    }
}

impl From<serde_json::Error> for VeilError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Blast radius of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorScope {
    /// Nothing can be unlocked until this is resolved
    Session,
    /// Only the field the error was raised for is affected
    Field,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Field => write!(f, "field"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
