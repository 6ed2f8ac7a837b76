//! Administrative maintenance routes
//!
//! The periodic jobs (monthly counter reset, expired-key sweep) are
//! exposed as admin-scoped endpoints so a scheduler can drive them.
//! Both are idempotent and safe to invoke while traffic is flowing.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use super::middleware::RequireAdminKey;
use super::state::AppState;
use super::types::ApiError;

#[derive(Debug, Serialize)]
pub struct MaintenanceResponse {
    pub affected: usize,
}

/// POST /admin/usage/reset - zero monthly counters for keys whose
/// accounting period rolled over.
pub async fn reset_monthly(
    State(state): State<AppState>,
    RequireAdminKey(_admin): RequireAdminKey,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    let affected = state.usage.reset_monthly().await?;
    Ok(Json(MaintenanceResponse { affected }))
}

/// POST /admin/keys/cleanup-expired - deactivate keys past their
/// expiration.
pub async fn cleanup_expired(
    State(state): State<AppState>,
    RequireAdminKey(_admin): RequireAdminKey,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    let affected = state.api_keys.deactivate_expired().await?;
    Ok(Json(MaintenanceResponse { affected }))
}

pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/usage/reset", post(reset_monthly))
        .route("/keys/cleanup-expired", post(cleanup_expired))
}
