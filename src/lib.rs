//! FinSight API Gateway
//!
//! API key lifecycle and usage metering for the FinSight financial
//! data API:
//! - key generation, hashing, validation, expiration, rotation
//! - atomic per-key monthly usage counters checked against tier limits
//! - append-only usage ledger with cached display reads

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use api::state::AppState;
use domain::api_key::{KeyMetadata, KeyRepository};
use domain::cache::Cache;
use domain::error::DomainError;
use domain::tier::PricingTier;
use domain::usage::UsageRepository;
use infrastructure::api_key::{
    ApiKeyService, CreateKeyOptions, InMemoryKeyRepository, PostgresKeyRepository,
};
use infrastructure::cache::{InMemoryCache, RedisCache};
use infrastructure::usage::{InMemoryUsageRepository, PostgresUsageRepository, UsageService};

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let persistence_timeout = Duration::from_millis(config.auth.persistence_timeout_ms);

    let (key_repo, usage_repo): (Arc<dyn KeyRepository>, Arc<dyn UsageRepository>) =
        match config.storage.backend.as_str() {
            "postgres" => {
                let database_url = std::env::var("DATABASE_URL").map_err(|_| {
                    anyhow::anyhow!(
                        "DATABASE_URL environment variable is required for the postgres backend"
                    )
                })?;

                info!("Connecting to PostgreSQL...");
                let pool = sqlx::PgPool::connect(&database_url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;
                info!("PostgreSQL connection established");

                let keys = PostgresKeyRepository::new(pool.clone());
                keys.ensure_schema().await?;

                let usage = PostgresUsageRepository::new(pool);
                usage.ensure_schema().await?;

                (Arc::new(keys), Arc::new(usage))
            }
            _ => {
                info!("Using in-memory storage");
                (
                    Arc::new(InMemoryKeyRepository::new()),
                    Arc::new(InMemoryUsageRepository::new()),
                )
            }
        };

    let cache: Option<Arc<dyn Cache>> = match config.cache.backend.as_str() {
        "redis" => {
            let url = config
                .cache
                .redis_url
                .clone()
                .or_else(|| std::env::var("REDIS_URL").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("cache.redis_url or REDIS_URL is required for the redis cache")
                })?;

            info!("Connecting to Redis...");
            Some(Arc::new(RedisCache::with_url(url).await?))
        }
        "memory" => Some(Arc::new(InMemoryCache::new())),
        _ => None,
    };

    let api_key_service = Arc::new(
        ApiKeyService::new(key_repo.clone()).with_persistence_timeout(persistence_timeout),
    );

    let mut usage_service =
        UsageService::new(key_repo, usage_repo).with_persistence_timeout(persistence_timeout);

    if let Some(cache) = cache {
        usage_service = usage_service.with_cache(cache);
    }

    if let Ok(admin_secret) = std::env::var("FINSIGHT_ADMIN_KEY") {
        create_admin_api_key(&api_key_service, &admin_secret).await?;
    }

    Ok(AppState::new(api_key_service, Arc::new(usage_service)))
}

/// Create the operator's admin key from a known secret, when one is
/// configured. Reuses the existing record on restart.
async fn create_admin_api_key(
    api_key_service: &ApiKeyService,
    secret: &str,
) -> anyhow::Result<()> {
    let metadata = KeyMetadata::new("Admin Key", ["read", "write", "admin"], "admin")?;

    match api_key_service
        .create_with_secret(
            metadata,
            PricingTier::Enterprise,
            CreateKeyOptions::default(),
            secret,
        )
        .await
    {
        Ok(created) => {
            info!(key_id = %created.api_key.id(), "Admin API key created");
            Ok(())
        }
        Err(DomainError::Conflict { .. }) => {
            info!("Admin API key already present");
            Ok(())
        }
        Err(DomainError::Validation { message }) => {
            warn!("FINSIGHT_ADMIN_KEY rejected: {}", message);
            Err(anyhow::anyhow!("Invalid FINSIGHT_ADMIN_KEY: {}", message))
        }
        Err(err) => Err(err.into()),
    }
}
