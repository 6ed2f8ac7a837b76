//! Key management routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{RequireAdminKey, RequireApiKey};
use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::{ApiKey, ApiKeyId, KeyMetadata, Scope};
use crate::domain::tier::PricingTier;
use crate::infrastructure::api_key::CreateKeyOptions;

/// Key fields safe to return. The hash never leaves the service and the
/// secret only appears in the creation/rotation response.
#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key_id: String,
    pub name: String,
    pub key_prefix: String,
    pub owner_id: String,
    pub scopes: Vec<Scope>,
    pub tier: PricingTier,
    pub is_active: bool,
    pub is_test_mode: bool,
    pub total_calls: u64,
    pub calls_this_month: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ApiKey> for KeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            key_id: key.id().as_str().to_string(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            owner_id: key.owner_id().to_string(),
            scopes: key.scopes().to_vec(),
            tier: key.tier(),
            is_active: key.is_active(),
            is_test_mode: key.is_test_mode(),
            total_calls: key.total_calls(),
            calls_this_month: key.calls_this_month(),
            created_at: key.created_at(),
            expires_at: key.expires_at(),
            last_used_at: key.last_used_at(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub scopes: Vec<String>,
    pub owner_id: String,
    #[serde(default)]
    pub tier: PricingTier,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub allowed_ips: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
}

/// Creation response. `key` is the plaintext secret, shown exactly once.
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub key: String,
    #[serde(flatten)]
    pub api_key: KeyResponse,
}

/// POST /v1/keys - create a key for any owner (admin scope).
pub async fn create_key(
    State(state): State<AppState>,
    RequireAdminKey(_admin): RequireAdminKey,
    Json(request): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreateKeyResponse>), ApiError> {
    let metadata = KeyMetadata::new(&request.name, &request.scopes, &request.owner_id)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let options = CreateKeyOptions {
        expires_at: request
            .expires_in_days
            .map(|days| Utc::now() + Duration::days(days)),
        test_mode: request.test_mode,
        allowed_ips: request.allowed_ips,
        allowed_domains: request.allowed_domains,
    };

    let created = state
        .api_keys
        .create(metadata, request.tier, options)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            key: created.secret,
            api_key: KeyResponse::from(&created.api_key),
        }),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListKeysQuery {
    /// Admin-only: list another owner's keys.
    pub owner_id: Option<String>,
}

/// GET /v1/keys - list the caller's keys; admins may list any owner's.
pub async fn list_keys(
    State(state): State<AppState>,
    RequireApiKey(caller): RequireApiKey,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<KeyResponse>>, ApiError> {
    let owner_id = match query.owner_id {
        Some(owner_id) if owner_id != caller.owner_id() => {
            if !caller.has_scope(Scope::Admin) {
                return Err(ApiError::forbidden(
                    "Listing another owner's keys requires the admin scope",
                ));
            }
            owner_id
        }
        _ => caller.owner_id().to_string(),
    };

    let keys = state.api_keys.list_for_owner(&owner_id).await?;

    Ok(Json(keys.iter().map(KeyResponse::from).collect()))
}

/// POST /v1/keys/{id}/rotate - supersede a key's secret.
pub async fn rotate_key(
    State(state): State<AppState>,
    RequireApiKey(caller): RequireApiKey,
    Path(key_id): Path<String>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    let id = ApiKeyId::new(key_id);
    authorize_key_access(&state, &caller, &id).await?;

    let rotated = state.api_keys.rotate(&id).await?;

    Ok(Json(CreateKeyResponse {
        key: rotated.secret,
        api_key: KeyResponse::from(&rotated.api_key),
    }))
}

#[derive(Debug, Serialize)]
pub struct RevokeKeyResponse {
    pub revoked: bool,
}

/// DELETE /v1/keys/{id} - revoke a key.
pub async fn revoke_key(
    State(state): State<AppState>,
    RequireApiKey(caller): RequireApiKey,
    Path(key_id): Path<String>,
) -> Result<Json<RevokeKeyResponse>, ApiError> {
    let id = ApiKeyId::new(key_id);
    authorize_key_access(&state, &caller, &id).await?;

    let revoked = state.api_keys.revoke(&id).await?;

    Ok(Json(RevokeKeyResponse { revoked }))
}

/// A caller may manage its own owner's keys; anything else needs the
/// admin scope. Unknown targets 404 for admins but 403 for everyone
/// else, so non-admins cannot probe key IDs.
async fn authorize_key_access(
    state: &AppState,
    caller: &ApiKey,
    target: &ApiKeyId,
) -> Result<(), ApiError> {
    if caller.has_scope(Scope::Admin) {
        return Ok(());
    }

    let target_key = state
        .api_keys
        .get(target)
        .await?
        .ok_or_else(|| ApiError::forbidden("You may only manage your own keys"))?;

    if target_key.owner_id() != caller.owner_id() {
        return Err(ApiError::forbidden("You may only manage your own keys"));
    }

    Ok(())
}
