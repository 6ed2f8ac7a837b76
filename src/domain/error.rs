use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage timeout: {message}")]
    StorageTimeout { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn storage_timeout(message: impl Into<String>) -> Self {
        Self::StorageTimeout {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }
}

/// Why a presented API key was rejected.
///
/// Identity failures (`InvalidFormat`, `NotFound`, `Expired`,
/// `Deactivated`) must render identically at the transport boundary so
/// callers cannot probe which case applies; the distinction exists for
/// logging and for callers inside the process. Persistence failures are
/// kept separate so the serving layer can choose fail-open or
/// fail-closed - they are never collapsed into `NotFound` or a denial.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("API key has invalid format")]
    InvalidFormat,

    #[error("API key not found")]
    NotFound,

    #[error("API key has expired")]
    Expired,

    #[error("API key has been deactivated")]
    Deactivated,

    #[error("Monthly call limit of {limit} exceeded")]
    LimitExceeded { limit: u64 },

    #[error("Rate limit of {per_minute} requests/minute exceeded")]
    RateLimited { per_minute: u32 },

    #[error("Unknown scope: '{0}'")]
    InvalidScope(String),

    #[error("Persistence layer timed out")]
    PersistenceTimeout,

    #[error("Persistence layer unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl AuthError {
    /// True for the identity failures that must be indistinguishable to
    /// external callers.
    pub fn is_identity_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat | Self::NotFound | Self::Expired | Self::Deactivated
        )
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => Self::NotFound,
            DomainError::StorageTimeout { .. } => Self::PersistenceTimeout,
            other => Self::PersistenceUnavailable(other.to_string()),
        }
    }
}
