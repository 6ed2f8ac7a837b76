//! Usage record repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::record::UsageRecord;
use crate::domain::DomainError;

/// Query parameters for the usage ledger
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    /// Filter by key ID
    pub key_id: Option<String>,
    /// Filter by owner ID
    pub owner_id: Option<String>,
    /// Start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// End timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records to return
    pub limit: Option<usize>,
}

impl UsageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Append-only store for usage records.
#[async_trait]
pub trait UsageRepository: Send + Sync + Debug {
    /// Append one record. Records are immutable once written.
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError>;

    /// Query records, newest first.
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError>;

    /// Count records matching a query.
    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError>;
}
