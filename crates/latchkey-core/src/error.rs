//! Error types for lock and store operations

/// Failures reported by a store backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command timed out")]
    Timeout,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Lock operation errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock is held by another owner and is not stale
    #[error("lock '{resource}' is held by another owner")]
    Contended { resource: String },

    /// The record no longer matches the caller's token
    #[error("lock '{resource}' is no longer held by this token")]
    Lost { resource: String },

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock record encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl LockError {
    /// Whether the acquire loop may try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::Contended { .. } | LockError::StoreUnavailable(_)
        )
    }

    pub(crate) fn contended(resource: &str) -> Self {
        LockError::Contended {
            resource: resource.to_string(),
        }
    }

    pub(crate) fn lost(resource: &str) -> Self {
        LockError::Lost {
            resource: resource.to_string(),
        }
    }
}

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;
