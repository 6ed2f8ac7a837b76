//! API key authentication extractors

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::{ApiKey, Scope};
use crate::domain::AuthError;
use crate::infrastructure::api_key::KeyGenerator;
use crate::infrastructure::usage::{MeteredRequest, UsageOutcome};

/// Extractor that authenticates the presented key without consuming
/// quota. Management and usage-introspection routes use this.
///
/// The secret is read from either:
/// - Authorization header: `Bearer <key>`
/// - X-API-Key header: `<key>`
#[derive(Debug, Clone)]
pub struct RequireApiKey(pub ApiKey);

impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = extract_api_key_from_headers(&parts.headers)?;

        debug!(
            key_prefix = %KeyGenerator::extract_prefix(&secret),
            "Validating API key"
        );

        let api_key = state.api_keys.authenticate(&secret).await?;

        Ok(RequireApiKey(api_key))
    }
}

/// Extractor for metered endpoints: authenticates, applies the
/// per-minute rate limit, and counts the call against the monthly
/// limit in one pass. Rejections follow the error taxonomy - uniform
/// 401 for identity, 429 for limits, 503 for persistence trouble.
#[derive(Debug, Clone)]
pub struct MeteredApiKey {
    pub api_key: ApiKey,
    pub calls_this_month: u64,
    /// Calls left this month; `None` for unlimited tiers.
    pub remaining: Option<u64>,
}

impl FromRequestParts<AppState> for MeteredApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = extract_api_key_from_headers(&parts.headers)?;
        let api_key = state.api_keys.authenticate(&secret).await?;

        let rate = state.api_keys.check_rate_limit(&api_key).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited {
                per_minute: rate.limit,
            }
            .into());
        }

        let request = MeteredRequest::new(parts.uri.path(), parts.method.as_str());

        match state.usage.record_usage(&api_key, &request).await? {
            UsageOutcome::Allowed {
                calls_this_month,
                remaining,
            } => Ok(MeteredApiKey {
                api_key,
                calls_this_month,
                remaining,
            }),
            UsageOutcome::Denied { limit } => {
                Err(AuthError::LimitExceeded { limit }.into())
            }
        }
    }
}

/// Extractor that additionally requires the `admin` scope.
#[derive(Debug, Clone)]
pub struct RequireAdminKey(pub ApiKey);

impl FromRequestParts<AppState> for RequireAdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireApiKey(api_key) = RequireApiKey::from_request_parts(parts, state).await?;

        if !api_key.has_scope(Scope::Admin) {
            return Err(ApiError::forbidden("This operation requires the admin scope"));
        }

        Ok(RequireAdminKey(api_key))
    }
}

fn extract_api_key_from_headers(headers: &axum::http::HeaderMap) -> Result<String, ApiError> {
    // Authorization: Bearer takes precedence over X-API-Key.
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| ApiError::bad_request("Invalid Authorization header encoding"))?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Some(api_key_header) = headers.get("x-api-key") {
        let key = api_key_header
            .to_str()
            .map_err(|_| ApiError::bad_request("Invalid X-API-Key header encoding"))?;

        return Ok(key.trim().to_string());
    }

    Err(ApiError::unauthorized(
        "API key required. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Bearer fsk_test_value_1234".parse().unwrap(),
        );

        let result = extract_api_key_from_headers(&headers);
        assert_eq!(result.unwrap(), "fsk_test_value_1234");
    }

    #[test]
    fn test_extract_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "fsk_test_value_5678".parse().unwrap());

        let result = extract_api_key_from_headers(&headers);
        assert_eq!(result.unwrap(), "fsk_test_value_5678");
    }

    #[test]
    fn test_bearer_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Bearer fsk_bearer_key".parse().unwrap(),
        );
        headers.insert("x-api-key", "fsk_x_api_key".parse().unwrap());

        let result = extract_api_key_from_headers(&headers);
        assert_eq!(result.unwrap(), "fsk_bearer_key");
    }

    #[test]
    fn test_missing_api_key() {
        let headers = HeaderMap::new();

        let err = extract_api_key_from_headers(&headers).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_non_bearer_authorization_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Basic dXNlcjpwYXNz".parse().unwrap(),
        );

        let result = extract_api_key_from_headers(&headers);
        assert!(result.is_err());
    }

    #[test]
    fn test_trimmed_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Bearer   fsk_with_spaces   ".parse().unwrap(),
        );

        let result = extract_api_key_from_headers(&headers);
        assert_eq!(result.unwrap(), "fsk_with_spaces");
    }
}
