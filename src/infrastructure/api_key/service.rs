//! API key service
//!
//! High-level operations for the identity half of the key lifecycle:
//! creation, authentication, rotation, revocation, expiry sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::api_key::{ApiKey, ApiKeyId, KeyMetadata, KeyRepository};
use crate::domain::error::{AuthError, DomainError};
use crate::domain::tier::PricingTier;

use super::generator::KeyGenerator;
use super::rate_limiter::{RateLimitResult, RateLimiter};

/// Default bound on any persistence round-trip made while authorizing a
/// request.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of creating or rotating a key. The secret is returned here
/// exactly once and exists nowhere else.
#[derive(Debug)]
pub struct CreatedKey {
    pub api_key: ApiKey,
    pub secret: String,
}

/// Options applied at key creation.
#[derive(Debug, Clone, Default)]
pub struct CreateKeyOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub test_mode: bool,
    pub allowed_ips: Option<Vec<String>>,
    pub allowed_domains: Option<Vec<String>>,
}

/// API key management and authentication service.
#[derive(Debug)]
pub struct ApiKeyService {
    repository: Arc<dyn KeyRepository>,
    generator: KeyGenerator,
    rate_limiter: Arc<RateLimiter>,
    persistence_timeout: Duration,
}

impl ApiKeyService {
    pub fn new(repository: Arc<dyn KeyRepository>) -> Self {
        Self {
            repository,
            generator: KeyGenerator::new(),
            rate_limiter: Arc::new(RateLimiter::new()),
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
        }
    }

    pub fn with_persistence_timeout(mut self, timeout: Duration) -> Self {
        self.persistence_timeout = timeout;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Create a new key for the owner described by `metadata`.
    ///
    /// Enforces the tier's active-key quota. The plaintext secret is
    /// only present in the returned value.
    pub async fn create(
        &self,
        metadata: KeyMetadata,
        tier: PricingTier,
        options: CreateKeyOptions,
    ) -> Result<CreatedKey, DomainError> {
        if let Some(max_keys) = tier.max_api_keys() {
            let active = self
                .repository
                .count_active_by_owner(&metadata.owner_id)
                .await?;

            if active >= max_keys as usize {
                return Err(DomainError::conflict(format!(
                    "Owner '{}' already holds the maximum of {} active keys for the {} tier",
                    metadata.owner_id, max_keys, tier
                )));
            }
        }

        let generated = self.generator.generate();

        let mut api_key = ApiKey::new(
            ApiKeyId::generate(),
            &generated.hash,
            &generated.prefix,
            &metadata.owner_id,
            &metadata.name,
            metadata.scopes.clone(),
            tier,
        )
        .with_created_at(metadata.created_at)
        .with_test_mode(options.test_mode);

        if let Some(expires_at) = options.expires_at {
            api_key = api_key.with_expiration(expires_at);
        }
        if let Some(ips) = options.allowed_ips {
            api_key = api_key.with_allowed_ips(ips);
        }
        if let Some(domains) = options.allowed_domains {
            api_key = api_key.with_allowed_domains(domains);
        }

        let created = self.repository.insert(api_key).await?;

        info!(
            key_id = %created.id(),
            key_prefix = %created.key_prefix(),
            owner_id = %created.owner_id(),
            "API key created"
        );

        Ok(CreatedKey {
            api_key: created,
            secret: generated.secret,
        })
    }

    /// Create a key from an operator-provided secret.
    ///
    /// Bootstrap path: lets a deployment inject a known admin key via
    /// the environment. The secret must still be well-formed.
    pub async fn create_with_secret(
        &self,
        metadata: KeyMetadata,
        tier: PricingTier,
        options: CreateKeyOptions,
        secret: &str,
    ) -> Result<CreatedKey, DomainError> {
        if !KeyGenerator::is_valid_format(secret) {
            return Err(DomainError::validation(
                "Provided secret does not match the required key format",
            ));
        }

        let generated = self.generator.from_secret(secret);

        let mut api_key = ApiKey::new(
            ApiKeyId::generate(),
            &generated.hash,
            &generated.prefix,
            &metadata.owner_id,
            &metadata.name,
            metadata.scopes.clone(),
            tier,
        )
        .with_created_at(metadata.created_at)
        .with_test_mode(options.test_mode);

        if let Some(expires_at) = options.expires_at {
            api_key = api_key.with_expiration(expires_at);
        }

        let created = self.repository.insert(api_key).await?;

        info!(
            key_id = %created.id(),
            key_prefix = %created.key_prefix(),
            "API key created from provided secret"
        );

        Ok(CreatedKey {
            api_key: created,
            secret: generated.secret,
        })
    }

    /// Resolve a presented secret to its key, or say precisely why not.
    ///
    /// Order matters: format rejection is free and happens before any
    /// store lookup; expiry wins over the active flag. Every store call
    /// is bounded by the persistence timeout and a timeout is surfaced
    /// as its own kind, never folded into `NotFound`.
    pub async fn authenticate(&self, presented_secret: &str) -> Result<ApiKey, AuthError> {
        if !KeyGenerator::is_valid_format(presented_secret) {
            debug!(
                key_prefix = %KeyGenerator::extract_prefix(presented_secret),
                "Rejected key with invalid format"
            );
            return Err(AuthError::InvalidFormat);
        }

        let hash = KeyGenerator::hash_secret(presented_secret);

        let key = self
            .with_timeout(self.repository.find_by_hash(&hash))
            .await?
            .ok_or(AuthError::NotFound)?;

        if key.is_expired() {
            debug!(key_id = %key.id(), "Rejected expired key");
            return Err(AuthError::Expired);
        }

        if !key.is_active() {
            debug!(key_id = %key.id(), "Rejected deactivated key");
            return Err(AuthError::Deactivated);
        }

        Ok(key)
    }

    /// Per-minute rate check for an authenticated key, limit taken from
    /// its tier.
    pub async fn check_rate_limit(&self, key: &ApiKey) -> RateLimitResult {
        self.rate_limiter
            .check_and_record(key.id().as_str(), key.tier().rate_limit_per_minute())
            .await
    }

    /// Supersede a key: fresh secret and counters, same name, scopes,
    /// owner, tier, and restrictions. The old key is deactivated.
    pub async fn rotate(&self, id: &ApiKeyId) -> Result<CreatedKey, DomainError> {
        let old = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        // Independent generation makes a duplicate hash negligible, but
        // the replacement contract is enforced, not assumed.
        let generated = loop {
            let candidate = self.generator.generate();
            if candidate.hash != old.key_hash() {
                break candidate;
            }
        };

        // Same name, scopes, and owner; created_at moves to the
        // rotation instant.
        let metadata = KeyMetadata {
            name: old.name().to_string(),
            scopes: old.scopes().to_vec(),
            owner_id: old.owner_id().to_string(),
            created_at: old.created_at(),
        }
        .rotated();

        let mut replacement = ApiKey::new(
            ApiKeyId::generate(),
            &generated.hash,
            &generated.prefix,
            &metadata.owner_id,
            &metadata.name,
            metadata.scopes,
            old.tier(),
        )
        .with_created_at(metadata.created_at)
        .with_test_mode(old.is_test_mode());

        if let Some(expires_at) = old.expires_at() {
            replacement = replacement.with_expiration(expires_at);
        }
        if let Some(ips) = old.allowed_ips() {
            replacement = replacement.with_allowed_ips(ips.to_vec());
        }
        if let Some(domains) = old.allowed_domains() {
            replacement = replacement.with_allowed_domains(domains.to_vec());
        }

        let created = self.repository.insert(replacement).await?;
        self.repository.set_active(id, false).await?;
        self.rate_limiter.reset(id.as_str()).await;

        info!(
            old_key_id = %id,
            new_key_id = %created.id(),
            "API key rotated"
        );

        Ok(CreatedKey {
            api_key: created,
            secret: generated.secret,
        })
    }

    /// Deactivate a key. Returns false when no such key exists.
    pub async fn revoke(&self, id: &ApiKeyId) -> Result<bool, DomainError> {
        let revoked = self.repository.set_active(id, false).await?;

        if revoked {
            self.rate_limiter.reset(id.as_str()).await;
            info!(key_id = %id, "API key revoked");
        }

        Ok(revoked)
    }

    pub async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        self.repository.get(id).await
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        self.repository.list_by_owner(owner_id).await
    }

    /// Sweep keys past their expiration, flipping them inactive.
    pub async fn deactivate_expired(&self) -> Result<usize, DomainError> {
        let count = self.repository.deactivate_expired(Utc::now()).await?;

        if count > 0 {
            info!(count, "Deactivated expired API keys");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::Scope;
    use crate::infrastructure::api_key::InMemoryKeyRepository;
    use chrono::Duration as ChronoDuration;

    fn service() -> ApiKeyService {
        ApiKeyService::new(Arc::new(InMemoryKeyRepository::new()))
    }

    fn metadata(owner: &str) -> KeyMetadata {
        KeyMetadata::new("Test Key", ["read", "write"], owner).unwrap()
    }

    #[tokio::test]
    async fn test_create_returns_secret_once() {
        let service = service();

        let created = service
            .create(metadata("user_1"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();

        assert!(created.secret.starts_with("fsk_"));
        assert!(created.secret.len() >= 40);
        assert_eq!(created.api_key.name(), "Test Key");
        assert_eq!(created.api_key.key_prefix(), &created.secret[..12]);
        // The stored record carries the digest, never the secret.
        assert_ne!(created.api_key.key_hash(), created.secret);
    }

    #[tokio::test]
    async fn test_create_enforces_tier_key_quota() {
        let service = service();

        // Free tier allows a single active key.
        service
            .create(metadata("user_1"), PricingTier::Free, CreateKeyOptions::default())
            .await
            .unwrap();

        let err = service
            .create(metadata("user_1"), PricingTier::Free, CreateKeyOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_revoked_key_frees_quota_slot() {
        let service = service();

        let first = service
            .create(metadata("user_1"), PricingTier::Free, CreateKeyOptions::default())
            .await
            .unwrap();

        service.revoke(first.api_key.id()).await.unwrap();

        let second = service
            .create(metadata("user_1"), PricingTier::Free, CreateKeyOptions::default())
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_create_with_secret_bootstrap() {
        let service = service();
        let secret = format!("fsk_{}", "a".repeat(40));

        let created = service
            .create_with_secret(
                metadata("admin"),
                PricingTier::Enterprise,
                CreateKeyOptions::default(),
                &secret,
            )
            .await
            .unwrap();

        assert_eq!(created.secret, secret);

        let key = service.authenticate(&secret).await.unwrap();
        assert_eq!(key.id(), created.api_key.id());
    }

    #[tokio::test]
    async fn test_create_with_secret_rejects_malformed() {
        let service = service();

        let err = service
            .create_with_secret(
                metadata("admin"),
                PricingTier::Enterprise,
                CreateKeyOptions::default(),
                "not-a-finsight-key",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_authenticate_roundtrip() {
        let service = service();

        let created = service
            .create(metadata("user_1"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();

        let key = service.authenticate(&created.secret).await.unwrap();
        assert_eq!(key.id(), created.api_key.id());
        assert!(key.has_scope(Scope::Read));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_malformed_before_lookup() {
        let service = service();

        let err = service.authenticate("not-a-key").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat));

        let err = service.authenticate("fsk_short").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_key() {
        let service = service();

        let unknown = format!("fsk_{}", "x".repeat(40));
        let err = service.authenticate(&unknown).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn test_authenticate_expired_key_despite_active_flag() {
        let service = service();

        let created = service
            .create(
                metadata("user_1"),
                PricingTier::Starter,
                CreateKeyOptions {
                    expires_at: Some(Utc::now() - ChronoDuration::days(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(created.api_key.is_active());

        let err = service.authenticate(&created.secret).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn test_authenticate_revoked_key() {
        let service = service();

        let created = service
            .create(metadata("user_1"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();

        service.revoke(created.api_key.id()).await.unwrap();

        let err = service.authenticate(&created.secret).await.unwrap_err();
        assert!(matches!(err, AuthError::Deactivated));
    }

    #[tokio::test]
    async fn test_rotate_supersedes_old_secret() {
        let service = service();

        let created = service
            .create(metadata("user_1"), PricingTier::Professional, CreateKeyOptions::default())
            .await
            .unwrap();

        let rotated = service.rotate(created.api_key.id()).await.unwrap();

        assert_ne!(rotated.secret, created.secret);
        assert_ne!(rotated.api_key.id(), created.api_key.id());

        // Metadata survives, counters start over.
        assert_eq!(rotated.api_key.name(), created.api_key.name());
        assert_eq!(rotated.api_key.scopes(), created.api_key.scopes());
        assert_eq!(rotated.api_key.owner_id(), created.api_key.owner_id());
        assert_eq!(rotated.api_key.tier(), created.api_key.tier());
        assert_eq!(rotated.api_key.calls_this_month(), 0);
        assert_eq!(rotated.api_key.total_calls(), 0);
        assert!(rotated.api_key.created_at() >= created.api_key.created_at());

        // Old secret no longer authenticates; new one does.
        let err = service.authenticate(&created.secret).await.unwrap_err();
        assert!(matches!(err, AuthError::Deactivated));
        assert!(service.authenticate(&rotated.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_missing_key() {
        let service = service();

        let result = service.rotate(&ApiKeyId::new("missing")).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_revoke_missing_key_returns_false() {
        let service = service();

        let revoked = service.revoke(&ApiKeyId::new("missing")).await.unwrap();
        assert!(!revoked);
    }

    #[tokio::test]
    async fn test_rate_limit_uses_tier() {
        let service = service();

        let created = service
            .create(metadata("user_1"), PricingTier::Free, CreateKeyOptions::default())
            .await
            .unwrap();

        // Free tier: 10 requests per minute.
        for _ in 0..10 {
            let result = service.check_rate_limit(&created.api_key).await;
            assert!(result.allowed);
        }

        let result = service.check_rate_limit(&created.api_key).await;
        assert!(!result.allowed);
        assert_eq!(result.limit, 10);
    }

    #[tokio::test]
    async fn test_deactivate_expired_sweep() {
        let service = service();

        service
            .create(
                metadata("user_1"),
                PricingTier::Starter,
                CreateKeyOptions {
                    expires_at: Some(Utc::now() - ChronoDuration::hours(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        service
            .create(metadata("user_2"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();

        let count = service.deactivate_expired().await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_list_for_owner() {
        let service = service();

        service
            .create(metadata("user_1"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();
        service
            .create(metadata("user_2"), PricingTier::Starter, CreateKeyOptions::default())
            .await
            .unwrap();

        let keys = service.list_for_owner("user_1").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].owner_id(), "user_1");
    }
}
