//! Versioned public API

pub mod keys;
pub mod pricing;
pub mod usage;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/pricing", get(pricing::pricing))
        .route("/me", get(usage::me))
        .route("/usage", get(usage::current_usage))
        .route("/usage/history", get(usage::usage_history))
        .route("/keys", post(keys::create_key).get(keys::list_keys))
        .route("/keys/{id}/rotate", post(keys::rotate_key))
        .route("/keys/{id}", axum::routing::delete(keys::revoke_key))
}
