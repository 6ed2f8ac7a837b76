//! In-memory usage ledger

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::usage::{UsageQuery, UsageRecord, UsageRepository};
use crate::domain::DomainError;

/// In-memory implementation of [`UsageRepository`]. Append-only, like
/// the table it stands in for.
#[derive(Debug, Default)]
pub struct InMemoryUsageRepository {
    records: Arc<RwLock<Vec<UsageRecord>>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(record: &UsageRecord, query: &UsageQuery) -> bool {
        if let Some(ref key_id) = query.key_id {
            if &record.key_id != key_id {
                return false;
            }
        }

        if let Some(ref owner_id) = query.owner_id {
            if &record.owner_id != owner_id {
                return false;
            }
        }

        if let Some(from) = query.from {
            if record.timestamp < from {
                return false;
            }
        }

        if let Some(to) = query.to {
            if record.timestamp >= to {
                return false;
            }
        }

        true
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError> {
        let records = self.records.read().await;

        let mut results: Vec<UsageRecord> = records
            .iter()
            .filter(|r| Self::matches(r, query))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| Self::matches(r, query)).count())
    }
}
