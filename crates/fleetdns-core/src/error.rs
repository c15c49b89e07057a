//! Error types for the fleetdns control plane
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::model::PoolId;

/// Result type alias for fleetdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    /// Provider rejected the configured credentials
    #[error("Credential error: {0}")]
    Credential(String),

    /// Remote provider call failed or returned a non-success status
    #[error("Provider error ({provider}): {message}")]
    ProviderApi {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Pool, record, domain or account missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected before any state was touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resolved membership was empty even after the health fallback
    #[error("Pool {0} has no eligible members")]
    NoEligibleMembers(PoolId),

    /// Another writer changed the pool between read and commit
    #[error("Pool {0} was modified concurrently")]
    RaceCondition(PoolId),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Nameserver lookup errors
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// A bounded call ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a credential error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Create a provider API error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Whether this error came from the remote side of a provider call
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Credential(_) | Self::ProviderApi { .. } | Self::Timeout(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
