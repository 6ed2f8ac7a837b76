//! API Key entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::tier::PricingTier;

/// Opaque API key identifier, generated at creation and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiKeyId(String);

impl ApiKeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique ID.
    pub fn generate() -> Self {
        Self(format!("key_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ApiKeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ApiKeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission scope from the fixed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// API key record as persisted.
///
/// The plaintext secret is never part of this entity - only its SHA-256
/// digest (`key_hash`, unique across all keys) and the 12-character
/// display prefix survive creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique identifier for the key
    id: ApiKeyId,
    /// One-way digest of the secret, used for lookup
    key_hash: String,
    /// Display prefix, e.g. "fsk_3f9aB2cD"
    key_prefix: String,
    /// User that owns this key
    owner_id: String,
    /// Display name
    name: String,
    /// Granted scopes
    scopes: Vec<Scope>,
    /// Tier whose limits apply to this key
    tier: PricingTier,
    /// Whether the key may authenticate at all
    is_active: bool,
    /// Test-mode keys hit sandboxed data sources
    is_test_mode: bool,
    /// Lifetime call count, monotonic
    total_calls: u64,
    /// Calls in the current accounting month
    calls_this_month: u64,
    /// Optional IP allowlist, passed through opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_ips: Option<Vec<String>>,
    /// Optional CORS domain allowlist, passed through opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_domains: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn new(
        id: ApiKeyId,
        key_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        scopes: Vec<Scope>,
        tier: PricingTier,
    ) -> Self {
        Self {
            id,
            key_hash: key_hash.into(),
            key_prefix: key_prefix.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            scopes,
            tier,
            is_active: true,
            is_test_mode: false,
            total_calls: 0,
            calls_this_month: 0,
            allowed_ips: None,
            allowed_domains: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        }
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.is_test_mode = test_mode;
        self
    }

    pub fn with_allowed_ips(mut self, ips: Vec<String>) -> Self {
        self.allowed_ips = Some(ips);
        self
    }

    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Restore the active flag when hydrating from storage.
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Restore usage counters when hydrating from storage.
    pub fn with_counters(
        mut self,
        total_calls: u64,
        calls_this_month: u64,
        last_used_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.total_calls = total_calls;
        self.calls_this_month = calls_this_month;
        self.last_used_at = last_used_at;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn key_hash(&self) -> &str {
        &self.key_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn tier(&self) -> PricingTier {
        self.tier
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_test_mode(&self) -> bool {
        self.is_test_mode
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    pub fn calls_this_month(&self) -> u64 {
        self.calls_this_month
    }

    pub fn allowed_ips(&self) -> Option<&[String]> {
        self.allowed_ips.as_deref()
    }

    pub fn allowed_domains(&self) -> Option<&[String]> {
        self.allowed_domains.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    // Status checks

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Expired when `expires_at` is at or before `now`. A key without an
    /// expiration never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A key past its expiration is unusable regardless of `is_active`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    // Mutators

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Apply an allowed, already-checked increment to the counters.
    pub fn apply_usage(&mut self, cost: u64, now: DateTime<Utc>) {
        self.total_calls += cost;
        self.calls_this_month += cost;
        self.last_used_at = Some(now);
    }

    /// Zero the monthly counter. `total_calls` is monotonic and untouched.
    pub fn reset_monthly_counter(&mut self) {
        self.calls_this_month = 0;
    }
}

/// Non-secret metadata carried across a key's lifetime.
///
/// Rotation supersedes the secret but preserves this record (with a
/// fresh creation timestamp), so a rotated key keeps its name, scopes,
/// and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub name: String,
    pub scopes: Vec<Scope>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl KeyMetadata {
    /// Build a metadata record, rejecting unknown or empty scopes.
    pub fn new<I, S>(
        name: impl Into<String>,
        scopes: I,
        owner_id: impl Into<String>,
    ) -> Result<Self, super::validation::ApiKeyValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        super::validation::validate_key_name(&name)?;
        let scopes = super::validation::parse_scopes(scopes)?;

        Ok(Self {
            name,
            scopes,
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        })
    }

    /// Metadata for the key superseding this one: same name, scopes,
    /// and owner, stamped at the rotation instant.
    pub fn rotated(&self) -> Self {
        Self {
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            owner_id: self.owner_id.clone(),
            created_at: Utc::now(),
        }
    }
}
