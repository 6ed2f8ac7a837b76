//! Usage introspection routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{MeteredApiKey, RequireApiKey};
use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::usage::UsageRecord;

use super::keys::KeyResponse;

#[derive(Debug, Serialize)]
pub struct CurrentUsageResponse {
    pub calls_this_month: u64,
    /// Monthly limit; absent for unlimited tiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

/// GET /v1/usage - the caller's committed monthly usage.
///
/// Unmetered, and always served from the key store, never a cache.
pub async fn current_usage(
    State(state): State<AppState>,
    RequireApiKey(caller): RequireApiKey,
) -> Result<Json<CurrentUsageResponse>, ApiError> {
    let usage = state.usage.current_usage(caller.id()).await?;

    Ok(Json(CurrentUsageResponse {
        calls_this_month: usage.calls_this_month,
        limit: usage.limit,
        remaining: usage
            .limit
            .map(|limit| limit.saturating_sub(usage.calls_this_month)),
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /v1/usage/history - recent accounted requests for the caller's
/// key. Display data; may be served from the cache within its TTL.
pub async fn usage_history(
    State(state): State<AppState>,
    RequireApiKey(caller): RequireApiKey,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<UsageRecord>>, ApiError> {
    let records = state.usage.history(caller.id(), query.limit).await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub api_key: KeyResponse,
    pub calls_this_month: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

/// GET /v1/me - authenticated echo endpoint.
///
/// Metered: costs one credit, so users can verify a key end to end and
/// watch the counter move. Returns the key's metadata and quota state
/// after this call.
pub async fn me(
    State(_state): State<AppState>,
    metered: MeteredApiKey,
) -> Result<Json<MeResponse>, ApiError> {
    Ok(Json(MeResponse {
        api_key: KeyResponse::from(&metered.api_key),
        calls_this_month: metered.calls_this_month,
        remaining: metered.remaining,
    }))
}
