//! Cache Error Types
//!
//! Only two kinds of failure are ever visible to a caller of
//! [`TieredCache`](crate::cache::TieredCache): a value that cannot be encoded for
//! the remote tier, and an invalid configuration at construction time. The
//! remaining variants are produced and consumed inside the crate; the orchestrator
//! logs them and falls back to the local tier.

use thiserror::Error;

/// Errors produced by the cache tiers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote tier could not be reached at startup, or gave up reconnecting.
    #[error("remote connection failed: {0}")]
    FatalConnection(String),

    /// A single remote call failed (network blip, timeout, error reply).
    #[error("remote operation failed: {0}")]
    TransientRemote(String),

    /// A value could not be encoded for the remote tier.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl CacheError {
    /// Returns true if the error is one the orchestrator recovers from by
    /// falling back to the local tier.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            CacheError::FatalConnection(_) | CacheError::TransientRemote(_)
        )
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failures_are_recoverable() {
        assert!(CacheError::TransientRemote("timeout".into()).is_remote_failure());
        assert!(CacheError::FatalConnection("refused".into()).is_remote_failure());
        assert!(!CacheError::Validation("ttl".into()).is_remote_failure());
    }

    #[test]
    fn test_display() {
        let err = CacheError::Validation("DEFAULT_TTL must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: DEFAULT_TTL must be greater than 0"
        );
    }
}
