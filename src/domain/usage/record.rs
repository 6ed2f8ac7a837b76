//! Usage record entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a usage record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageRecordId(String);

impl UsageRecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique ID.
    pub fn generate() -> Self {
        Self(format!("usage_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsageRecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UsageRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One accounted request, written once and never mutated.
///
/// Records feed metering and audit. Authorization decisions read the
/// denormalized counters on the key, not this ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    id: UsageRecordId,
    /// Key that made the request
    pub key_id: String,
    /// Owner of that key
    pub owner_id: String,
    /// Request path, e.g. "/v1/me"
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// Response status code
    pub status_code: u16,
    /// Credits consumed; endpoints may cost more than one
    pub credits_used: u64,
    /// Request latency, when measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        id: UsageRecordId,
        key_id: impl Into<String>,
        owner_id: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            id,
            key_id: key_id.into(),
            owner_id: owner_id.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            status_code: 200,
            credits_used: 1,
            response_time_ms: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_credits(mut self, credits: u64) -> Self {
        self.credits_used = credits;
        self
    }

    pub fn with_response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn id(&self) -> &UsageRecordId {
        &self.id
    }
}
