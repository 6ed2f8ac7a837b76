//! API key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyId};
use crate::domain::DomainError;

/// Outcome of the atomic conditional counter update.
///
/// When `allowed` is false the stored counters were left untouched; the
/// values here are the counters as they stood when the check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    pub allowed: bool,
    pub calls_this_month: u64,
    pub total_calls: u64,
    pub limit: Option<u64>,
}

impl UsageDecision {
    /// Calls left in the current month. `None` when the tier is unlimited.
    pub fn remaining(&self) -> Option<u64> {
        self.limit
            .map(|limit| limit.saturating_sub(self.calls_this_month))
    }
}

/// Snapshot of a key's committed monthly usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUsage {
    pub calls_this_month: u64,
    pub limit: Option<u64>,
}

/// Persistence interface for API keys.
///
/// `increment_usage` is the one operation that must be atomic with
/// respect to concurrent callers on the same key: the limit check and
/// the increment happen as a single conditional update inside the
/// store, never as separate read and write calls from service code.
#[async_trait]
pub trait KeyRepository: Send + Sync + Debug {
    /// Get a key by its ID.
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// Look a key up by the digest of its secret.
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Insert a new key. Fails with `Conflict` when the ID or the hash
    /// is already present (hashes are unique across all keys).
    async fn insert(&self, key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Replace an existing key record.
    async fn update(&self, key: &ApiKey) -> Result<ApiKey, DomainError>;

    /// All keys belonging to an owner.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApiKey>, DomainError>;

    /// Number of active keys an owner currently holds.
    async fn count_active_by_owner(&self, owner_id: &str) -> Result<usize, DomainError>;

    /// Activate or deactivate a key. Returns false when the key does
    /// not exist.
    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<bool, DomainError>;

    /// Atomically add `cost` to both counters iff the resulting monthly
    /// count stays within `limit`. A denied call writes nothing.
    /// `last_used_at` moves only on allowed calls.
    async fn increment_usage(
        &self,
        id: &ApiKeyId,
        cost: u64,
        limit: Option<u64>,
    ) -> Result<UsageDecision, DomainError>;

    /// The latest committed monthly count and its limit. This read goes
    /// to the store directly; callers must not substitute a cached view.
    async fn current_usage(&self, id: &ApiKeyId) -> Result<Option<CurrentUsage>, DomainError>;

    /// Zero `calls_this_month` for every key whose accounting period
    /// (month of `last_used_at`, else `created_at`) precedes the month
    /// of `now`. Returns the number of keys touched; running it again
    /// in the same period touches none.
    async fn reset_monthly(&self, now: DateTime<Utc>) -> Result<usize, DomainError>;

    /// Deactivate every active key whose `expires_at` is at or before
    /// `now`. Returns the number of keys deactivated.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_quota() {
        let decision = UsageDecision {
            allowed: true,
            calls_this_month: 40,
            total_calls: 900,
            limit: Some(100),
        };
        assert_eq!(decision.remaining(), Some(60));
    }

    #[test]
    fn test_remaining_never_underflows() {
        let decision = UsageDecision {
            allowed: false,
            calls_this_month: 100,
            total_calls: 100,
            limit: Some(100),
        };
        assert_eq!(decision.remaining(), Some(0));
    }

    #[test]
    fn test_remaining_unlimited() {
        let decision = UsageDecision {
            allowed: true,
            calls_this_month: 1_000_000,
            total_calls: 1_000_000,
            limit: None,
        };
        assert_eq!(decision.remaining(), None);
    }
}
