//! Shared application state

use std::sync::Arc;

use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::usage::UsageService;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyService>,
    pub usage: Arc<UsageService>,
}

impl AppState {
    pub fn new(api_keys: Arc<ApiKeyService>, usage: Arc<UsageService>) -> Self {
        Self { api_keys, usage }
    }
}
