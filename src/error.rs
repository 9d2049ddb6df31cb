//! Error types for pathwarden.
//!
//! Every failure the core can hit is returned as a [`GuardError`] value. None
//! of them abort request processing: callers log them and fall back to
//! letting the request through.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The block store could not be read, serialized or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A packet-filter command failed or was not permitted.
    #[error("Enforcement error for {address}: {reason}")]
    Enforcement { address: String, reason: String },

    /// Empty or unparsable client address.
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// The configured system type has no enforcement backend.
    #[error("Unsupported system type: {0}")]
    UnsupportedSystem(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GuardError {
    pub(crate) fn enforcement(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Enforcement {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// True for faults that came from the disk side of the system.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// True for faults that came from the packet filter side of the system.
    pub fn is_enforcement(&self) -> bool {
        matches!(self, Self::Enforcement { .. } | Self::UnsupportedSystem(_))
    }
}

pub type GuardResult<T> = std::result::Result<T, GuardError>;
