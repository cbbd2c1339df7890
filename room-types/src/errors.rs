use thiserror::Error;

/// Failure taxonomy shared by every mutating path. Each variant maps to a
/// distinct HTTP status at the edge; Internal always means the whole
/// transaction rolled back.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not permitted: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        SyncError::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SyncError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        SyncError::Conflict(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        SyncError::Expired(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
