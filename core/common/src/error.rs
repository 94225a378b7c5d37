//! Common error types for OmniDrive.

use thiserror::Error;

/// Top-level error type for OmniDrive operations.
///
/// Per-provider failures inside aggregate operations (quota, listing,
/// backup) are caught at the adapter boundary and surfaced as result-set
/// entries, never as this type. Values of this type reach callers only
/// for single-target operations, invalid input, or an empty registry.
#[derive(Debug, Error)]
pub enum Error {
    /// No adapter is registered under the given identifier.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// The adapter has no valid credential for its backend.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// The backend is unreachable or returned a server-side failure.
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// An adapter call exceeded the configured per-call deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Requested file or folder is absent at the backend.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation that requires at least one provider found none registered.
    #[error("No providers registered")]
    NoProviders,

    /// A rebalance pass is already running in this process.
    #[error("Rebalance already in progress")]
    RebalanceInProgress,

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error means the provider cannot currently be used at all
    /// (no credential or backend down), as opposed to a per-file condition.
    pub fn is_provider_unusable(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated(_) | Error::Backend(_) | Error::Timeout(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
