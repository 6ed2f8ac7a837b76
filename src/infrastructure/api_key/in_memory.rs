//! In-memory key repository implementation
//!
//! Backs tests and the default (database-less) server mode. The hash
//! index mirrors the unique constraint the relational store enforces on
//! `key_hash`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, CurrentUsage, KeyRepository, UsageDecision};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, ApiKey>,
    hash_index: HashMap<String, String>,
}

/// In-memory implementation of [`KeyRepository`].
///
/// Both maps live under a single lock so the conditional counter update
/// is one critical section: no interleaving between the limit check and
/// the increment is possible.
#[derive(Debug, Default)]
pub struct InMemoryKeyRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn accounting_period(t: DateTime<Utc>) -> (i32, u32) {
    (t.year(), t.month())
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let inner = self.inner.read().await;
        Ok(inner.keys.get(id.as_str()).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let inner = self.inner.read().await;

        match inner.hash_index.get(key_hash) {
            Some(key_id) => Ok(inner.keys.get(key_id).cloned()),
            None => Ok(None),
        }
    }

    async fn insert(&self, key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut inner = self.inner.write().await;

        let id = key.id().as_str().to_string();
        let hash = key.key_hash().to_string();

        if inner.keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                id
            )));
        }

        if inner.hash_index.contains_key(&hash) {
            return Err(DomainError::conflict(
                "API key with the same hash already exists",
            ));
        }

        inner.keys.insert(id.clone(), key.clone());
        inner.hash_index.insert(hash, id);

        Ok(key)
    }

    async fn update(&self, key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut inner = self.inner.write().await;
        let id = key.id().as_str().to_string();

        let old_hash = match inner.keys.get(&id) {
            Some(existing) => existing.key_hash().to_string(),
            None => {
                return Err(DomainError::not_found(format!(
                    "API key '{}' not found",
                    id
                )))
            }
        };

        if old_hash != key.key_hash() {
            inner.hash_index.remove(&old_hash);
            inner
                .hash_index
                .insert(key.key_hash().to_string(), id.clone());
        }

        inner.keys.insert(id, key.clone());
        Ok(key.clone())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        let inner = self.inner.read().await;

        let mut keys: Vec<ApiKey> = inner
            .keys
            .values()
            .filter(|k| k.owner_id() == owner_id)
            .cloned()
            .collect();

        keys.sort_by_key(|k| k.created_at());
        Ok(keys)
    }

    async fn count_active_by_owner(&self, owner_id: &str) -> Result<usize, DomainError> {
        let inner = self.inner.read().await;

        Ok(inner
            .keys
            .values()
            .filter(|k| k.owner_id() == owner_id && k.is_active())
            .count())
    }

    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<bool, DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.get_mut(id.as_str()) {
            Some(key) => {
                if active {
                    key.activate();
                } else {
                    key.deactivate();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_usage(
        &self,
        id: &ApiKeyId,
        cost: u64,
        limit: Option<u64>,
    ) -> Result<UsageDecision, DomainError> {
        let mut inner = self.inner.write().await;

        let key = inner
            .keys
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        let within_limit = match limit {
            Some(limit) => key.calls_this_month() + cost <= limit,
            None => true,
        };

        if !within_limit {
            return Ok(UsageDecision {
                allowed: false,
                calls_this_month: key.calls_this_month(),
                total_calls: key.total_calls(),
                limit,
            });
        }

        key.apply_usage(cost, Utc::now());

        Ok(UsageDecision {
            allowed: true,
            calls_this_month: key.calls_this_month(),
            total_calls: key.total_calls(),
            limit,
        })
    }

    async fn current_usage(&self, id: &ApiKeyId) -> Result<Option<CurrentUsage>, DomainError> {
        let inner = self.inner.read().await;

        Ok(inner.keys.get(id.as_str()).map(|key| CurrentUsage {
            calls_this_month: key.calls_this_month(),
            limit: key.tier().monthly_call_limit(),
        }))
    }

    async fn reset_monthly(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut inner = self.inner.write().await;
        let current = accounting_period(now);
        let mut reset = 0;

        for key in inner.keys.values_mut() {
            if key.calls_this_month() == 0 {
                continue;
            }

            let period = accounting_period(key.last_used_at().unwrap_or_else(|| key.created_at()));

            if period < current {
                key.reset_monthly_counter();
                reset += 1;
            }
        }

        Ok(reset)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut inner = self.inner.write().await;
        let mut deactivated = 0;

        for key in inner.keys.values_mut() {
            if key.is_active() && key.is_expired_at(now) {
                key.deactivate();
                deactivated += 1;
            }
        }

        Ok(deactivated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::Scope;
    use crate::domain::tier::PricingTier;
    use chrono::Duration;

    fn test_key(id: &str, hash: &str) -> ApiKey {
        ApiKey::new(
            ApiKeyId::new(id),
            hash,
            "fsk_12345678",
            "user_1",
            format!("Key {}", id),
            vec![Scope::Read],
            PricingTier::Free,
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryKeyRepository::new();
        let key = test_key("key_1", "hash_1");

        repo.insert(key.clone()).await.unwrap();

        let retrieved = repo.get(key.id()).await.unwrap();
        assert_eq!(retrieved.unwrap().name(), key.name());
    }

    #[tokio::test]
    async fn test_find_by_hash() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();

        let found = repo.find_by_hash("hash_1").await.unwrap();
        assert_eq!(found.unwrap().id().as_str(), "key_1");

        let missing = repo.find_by_hash("hash_2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();

        let result = repo.insert(test_key("key_2", "hash_1")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();

        let result = repo.insert(test_key("key_1", "hash_2")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_reindexes_hash() {
        let repo = InMemoryKeyRepository::new();
        let key = test_key("key_1", "hash_1");
        repo.insert(key.clone()).await.unwrap();

        let replacement = test_key("key_1", "hash_2");
        repo.update(&replacement).await.unwrap();

        assert!(repo.find_by_hash("hash_1").await.unwrap().is_none());
        assert!(repo.find_by_hash("hash_2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_count_active_by_owner() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        repo.insert(test_key("key_2", "hash_2")).await.unwrap();

        assert_eq!(repo.count_active_by_owner("user_1").await.unwrap(), 2);

        repo.set_active(&ApiKeyId::new("key_1"), false).await.unwrap();
        assert_eq!(repo.count_active_by_owner("user_1").await.unwrap(), 1);
        assert_eq!(repo.count_active_by_owner("user_2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_within_limit() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        let id = ApiKeyId::new("key_1");

        let decision = repo.increment_usage(&id, 1, Some(100)).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.calls_this_month, 1);
        assert_eq!(decision.total_calls, 1);
        assert_eq!(decision.remaining(), Some(99));

        let key = repo.get(&id).await.unwrap().unwrap();
        assert!(key.last_used_at().is_some());
    }

    #[tokio::test]
    async fn test_increment_at_boundary() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        let id = ApiKeyId::new("key_1");

        for _ in 0..99 {
            repo.increment_usage(&id, 1, Some(100)).await.unwrap();
        }

        // Call 100 is allowed and lands exactly on the limit.
        let decision = repo.increment_usage(&id, 1, Some(100)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.calls_this_month, 100);

        // Call 101 is denied and writes nothing.
        let decision = repo.increment_usage(&id, 1, Some(100)).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.calls_this_month, 100);

        let usage = repo.current_usage(&id).await.unwrap().unwrap();
        assert_eq!(usage.calls_this_month, 100);
    }

    #[tokio::test]
    async fn test_denied_increment_does_not_touch_last_used() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        let id = ApiKeyId::new("key_1");

        let decision = repo.increment_usage(&id, 1, Some(0)).await.unwrap();
        assert!(!decision.allowed);

        let key = repo.get(&id).await.unwrap().unwrap();
        assert!(key.last_used_at().is_none());
        assert_eq!(key.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_increment_unlimited() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        let id = ApiKeyId::new("key_1");

        for _ in 0..500 {
            let decision = repo.increment_usage(&id, 1, None).await.unwrap();
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn test_increment_missing_key_is_not_found() {
        let repo = InMemoryKeyRepository::new();

        let result = repo
            .increment_usage(&ApiKeyId::new("missing"), 1, Some(100))
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_increments_never_overshoot() {
        let repo = Arc::new(InMemoryKeyRepository::new());
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();

        let mut handles = Vec::new();

        for _ in 0..150 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.increment_usage(&ApiKeyId::new("key_1"), 1, Some(100))
                    .await
                    .unwrap()
            }));
        }

        let mut allowed = 0;
        let mut denied = 0;

        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            } else {
                denied += 1;
            }
        }

        assert_eq!(allowed, 100);
        assert_eq!(denied, 50);

        let usage = repo
            .current_usage(&ApiKeyId::new("key_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.calls_this_month, 100);
    }

    #[tokio::test]
    async fn test_reset_monthly_only_touches_previous_periods() {
        let repo = InMemoryKeyRepository::new();
        let now = Utc::now();

        // Last used in a previous accounting month.
        let stale = test_key("key_stale", "hash_stale")
            .with_created_at(now - Duration::days(70))
            .with_counters(30, 3, Some(now - Duration::days(40)));
        repo.insert(stale).await.unwrap();

        // Used inside the current month: left alone.
        let fresh = test_key("key_fresh", "hash_fresh")
            .with_counters(2, 2, Some(now));
        repo.insert(fresh).await.unwrap();

        let reset = repo.reset_monthly(now).await.unwrap();
        assert_eq!(reset, 1);

        let stale = repo.get(&ApiKeyId::new("key_stale")).await.unwrap().unwrap();
        assert_eq!(stale.calls_this_month(), 0);
        assert_eq!(stale.total_calls(), 30);

        let fresh = repo.get(&ApiKeyId::new("key_fresh")).await.unwrap().unwrap();
        assert_eq!(fresh.calls_this_month(), 2);

        // Second run in the same period performs no additional writes.
        let reset_again = repo.reset_monthly(now).await.unwrap();
        assert_eq!(reset_again, 0);
    }

    #[tokio::test]
    async fn test_reset_monthly_falls_back_to_created_at() {
        let repo = InMemoryKeyRepository::new();
        let now = Utc::now();

        // Never used directly, but carries a stale counter from a
        // previous month.
        let key = test_key("key_1", "hash_1")
            .with_created_at(now - Duration::days(40))
            .with_counters(5, 5, None);
        repo.insert(key).await.unwrap();

        let reset = repo.reset_monthly(now).await.unwrap();
        assert_eq!(reset, 1);
    }

    #[tokio::test]
    async fn test_reset_monthly_skips_current_period() {
        let repo = InMemoryKeyRepository::new();
        repo.insert(test_key("key_1", "hash_1")).await.unwrap();
        repo.increment_usage(&ApiKeyId::new("key_1"), 5, None)
            .await
            .unwrap();

        let reset = repo.reset_monthly(Utc::now()).await.unwrap();
        assert_eq!(reset, 0);

        let usage = repo
            .current_usage(&ApiKeyId::new("key_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.calls_this_month, 5);
    }

    #[tokio::test]
    async fn test_deactivate_expired() {
        let repo = InMemoryKeyRepository::new();
        let now = Utc::now();

        let expired = test_key("key_expired", "hash_expired")
            .with_expiration(now - Duration::days(1));
        let live = test_key("key_live", "hash_live")
            .with_expiration(now + Duration::days(30));

        repo.insert(expired).await.unwrap();
        repo.insert(live).await.unwrap();

        let count = repo.deactivate_expired(now).await.unwrap();
        assert_eq!(count, 1);

        let expired = repo.get(&ApiKeyId::new("key_expired")).await.unwrap().unwrap();
        assert!(!expired.is_active());

        let live = repo.get(&ApiKeyId::new("key_live")).await.unwrap().unwrap();
        assert!(live.is_active());

        // Already-deactivated keys are not counted twice.
        let count = repo.deactivate_expired(now).await.unwrap();
        assert_eq!(count, 0);
    }
}
