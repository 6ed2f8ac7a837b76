//! Usage accounting service
//!
//! Meters authenticated requests against tier limits via the atomic
//! conditional counter on the key store, and keeps the append-only
//! ledger. The limit check never reads through the cache: the counters
//! on the key store are the single source of truth.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::api_key::{ApiKey, ApiKeyId, CurrentUsage, KeyRepository};
use crate::domain::cache::{Cache, CacheExt};
use crate::domain::error::{AuthError, DomainError};
use crate::domain::usage::{UsageQuery, UsageRecord, UsageRecordId, UsageRepository};

use crate::infrastructure::api_key::DEFAULT_PERSISTENCE_TIMEOUT;

const HISTORY_CACHE_TTL: Duration = Duration::from_secs(60);
const HISTORY_DEFAULT_LIMIT: usize = 100;

/// Outcome of metering one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    /// The call was counted and is within the monthly limit.
    Allowed {
        calls_this_month: u64,
        /// Calls left this month; `None` for unlimited tiers.
        remaining: Option<u64>,
    },
    /// The call would cross the limit and was not counted.
    Denied { limit: u64 },
}

impl UsageOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Descriptor of the request being metered.
#[derive(Debug, Clone)]
pub struct MeteredRequest {
    pub endpoint: String,
    pub method: String,
    pub credits: u64,
    pub response_time_ms: Option<u64>,
}

impl MeteredRequest {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            credits: 1,
            response_time_ms: None,
        }
    }

    /// Some endpoints consume more than one credit per call.
    pub fn with_credits(mut self, credits: u64) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }
}

/// Usage accounting over a key store, a ledger, and an optional cache.
#[derive(Debug)]
pub struct UsageService {
    keys: Arc<dyn KeyRepository>,
    ledger: Arc<dyn UsageRepository>,
    cache: Option<Arc<dyn Cache>>,
    persistence_timeout: Duration,
}

impl UsageService {
    pub fn new(keys: Arc<dyn KeyRepository>, ledger: Arc<dyn UsageRepository>) -> Self {
        Self {
            keys,
            ledger,
            cache: None,
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
        }
    }

    /// Attach a cache for the display read paths.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_persistence_timeout(mut self, timeout: Duration) -> Self {
        self.persistence_timeout = timeout;
        self
    }

    /// Count one request against the key's monthly limit.
    ///
    /// The check and the increment are a single conditional operation
    /// on the key store; a denied call leaves the counters untouched
    /// and writes no ledger record. Ledger append failures propagate -
    /// a metered API must not drop billing records silently.
    pub async fn record_usage(
        &self,
        key: &ApiKey,
        request: &MeteredRequest,
    ) -> Result<UsageOutcome, AuthError> {
        let limit = key.tier().monthly_call_limit();

        let decision = self
            .with_timeout(self.keys.increment_usage(key.id(), request.credits, limit))
            .await?;

        if !decision.allowed {
            debug!(
                key_id = %key.id(),
                calls_this_month = decision.calls_this_month,
                "Monthly call limit reached"
            );

            // A denied call always has a finite limit behind it.
            return Ok(UsageOutcome::Denied {
                limit: limit.unwrap_or(decision.calls_this_month),
            });
        }

        let mut record = UsageRecord::new(
            UsageRecordId::generate(),
            key.id().as_str(),
            key.owner_id(),
            &request.endpoint,
            &request.method,
        )
        .with_credits(request.credits);

        if let Some(ms) = request.response_time_ms {
            record = record.with_response_time_ms(ms);
        }

        self.with_timeout(self.ledger.append(record)).await?;

        Ok(UsageOutcome::Allowed {
            calls_this_month: decision.calls_this_month,
            remaining: decision.remaining(),
        })
    }

    /// The latest committed monthly count and limit for a key.
    ///
    /// Reads the key store directly; any cache layer is bypassed for
    /// this authorization-critical view.
    pub async fn current_usage(&self, id: &ApiKeyId) -> Result<CurrentUsage, AuthError> {
        self.with_timeout(self.keys.current_usage(id))
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Recent ledger entries for a key, served read-through from the
    /// cache when one is attached. Display only.
    pub async fn history(
        &self,
        key_id: &ApiKeyId,
        limit: Option<usize>,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        let limit = limit.unwrap_or(HISTORY_DEFAULT_LIMIT);
        let cache_key = format!("usage:history:{}:{}", key_id, limit);

        if let Some(cache) = &self.cache {
            match cache.get::<Vec<UsageRecord>>(&cache_key).await {
                Ok(Some(records)) => return Ok(records),
                Ok(None) => {}
                Err(err) => debug!(error = %err, "Usage history cache read failed"),
            }
        }

        let query = UsageQuery::new()
            .with_key(key_id.as_str())
            .with_limit(limit);
        let records = self.ledger.query(&query).await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.set(&cache_key, &records, HISTORY_CACHE_TTL).await {
                debug!(error = %err, "Usage history cache write failed");
            }
        }

        Ok(records)
    }

    /// Zero the monthly counters of every key whose accounting period
    /// has rolled over. Safe to run repeatedly; the second run in a
    /// period is a no-op.
    pub async fn reset_monthly(&self) -> Result<usize, DomainError> {
        let count = self.keys.reset_monthly(Utc::now()).await?;

        if count > 0 {
            info!(count, "Monthly usage counters reset");

            if let Some(cache) = &self.cache {
                if let Err(err) = cache.invalidate_pattern("usage:history:*").await {
                    debug!(error = %err, "Usage history cache invalidation failed");
                }
            }
        }

        Ok(count)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, DomainError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.persistence_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::PersistenceTimeout),
        }
    }
}
