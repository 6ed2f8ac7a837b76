//! JSON error envelope for the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AuthError, DomainError};

/// Error categories exposed to API consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    AuthenticationError,
    PermissionError,
    NotFoundError,
    RateLimitError,
    UsageLimitError,
    ServerError,
    ServiceUnavailableError,
}

impl std::fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequestError => write!(f, "invalid_request_error"),
            Self::AuthenticationError => write!(f, "authentication_error"),
            Self::PermissionError => write!(f, "permission_error"),
            Self::NotFoundError => write!(f, "not_found_error"),
            Self::RateLimitError => write!(f, "rate_limit_error"),
            Self::UsageLimitError => write!(f, "usage_limit_error"),
            Self::ServerError => write!(f, "server_error"),
            Self::ServiceUnavailableError => write!(f, "service_unavailable_error"),
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        error_type: ApiErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: message.into(),
                    error_type,
                },
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiErrorType::InvalidRequestError,
            message,
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiErrorType::AuthenticationError,
            message,
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ApiErrorType::PermissionError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiErrorType::NotFoundError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ApiErrorType::RateLimitError,
            message,
        )
    }

    pub fn usage_limited(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ApiErrorType::UsageLimitError,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorType::ServerError,
            message,
        )
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorType::ServiceUnavailableError,
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Conflict { message } => Self::bad_request(message),
            DomainError::Internal { message } => Self::internal(message),
            DomainError::Storage { message } => Self::internal(message),
            DomainError::StorageTimeout { message } => Self::unavailable(message),
            DomainError::Cache { message } => Self::internal(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        // Identity failures collapse into one response so callers cannot
        // probe whether a key exists, expired, or was revoked. The exact
        // reason still reaches the logs.
        if err.is_identity_failure() {
            debug!(reason = %err, "Rejecting request with uniform unauthorized response");
            return Self::unauthorized("Invalid or expired API key");
        }

        match &err {
            AuthError::LimitExceeded { limit } => Self::usage_limited(format!(
                "Monthly call limit of {} exceeded; upgrade your plan or wait for the next billing period",
                limit
            )),
            AuthError::RateLimited { per_minute } => Self::rate_limited(format!(
                "Rate limit of {} requests/minute exceeded",
                per_minute
            )),
            AuthError::InvalidScope(scope) => {
                Self::bad_request(format!("Unknown scope: '{}'", scope))
            }
            AuthError::PersistenceTimeout => {
                Self::unavailable("Authorization backend timed out")
            }
            AuthError::PersistenceUnavailable(message) => Self::unavailable(message.clone()),
            // Already handled above.
            _ => Self::unauthorized("Invalid or expired API key"),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.error_type, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_creation() {
        let err = ApiError::bad_request("Invalid scope list");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err.response.error.error_type,
            ApiErrorType::InvalidRequestError
        );
        assert_eq!(err.response.error.message, "Invalid scope list");
    }

    #[test]
    fn test_identity_failures_render_identically() {
        let bodies: Vec<String> = [
            AuthError::InvalidFormat,
            AuthError::NotFound,
            AuthError::Expired,
            AuthError::Deactivated,
        ]
        .into_iter()
        .map(|e| {
            let api_err = ApiError::from(e);
            assert_eq!(api_err.status, StatusCode::UNAUTHORIZED);
            api_err.response.error.message
        })
        .collect();

        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_limit_exceeded_is_429() {
        let err = ApiError::from(AuthError::LimitExceeded { limit: 100 });
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.response.error.error_type, ApiErrorType::UsageLimitError);
    }

    #[test]
    fn test_persistence_failures_are_503_not_401() {
        let err = ApiError::from(AuthError::PersistenceTimeout);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(AuthError::PersistenceUnavailable("down".into()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_domain_error_conversion() {
        let err = ApiError::from(DomainError::not_found("key 'k' not found"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = ApiError::from(DomainError::conflict("duplicate"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
