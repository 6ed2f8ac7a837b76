//! PostgreSQL key repository implementation
//!
//! The conditional counter update is expressed as a single `UPDATE ...
//! WHERE` statement so the limit check and the increment are one atomic
//! operation inside the store - concurrent requests against the same
//! key cannot interleave between them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::api_key::{
    parse_scope, ApiKey, ApiKeyId, CurrentUsage, KeyRepository, UsageDecision,
};
use crate::domain::tier::PricingTier;
use crate::domain::DomainError;

/// PostgreSQL implementation of [`KeyRepository`].
#[derive(Debug, Clone)]
pub struct PostgresKeyRepository {
    pool: PgPool,
}

impl PostgresKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                key_id           TEXT PRIMARY KEY,
                key_hash         TEXT NOT NULL UNIQUE,
                key_prefix       TEXT NOT NULL,
                owner_id         TEXT NOT NULL,
                name             TEXT NOT NULL,
                scopes           TEXT[] NOT NULL,
                tier             TEXT NOT NULL,
                is_active        BOOLEAN NOT NULL DEFAULT TRUE,
                is_test_mode     BOOLEAN NOT NULL DEFAULT FALSE,
                total_calls      BIGINT NOT NULL DEFAULT 0,
                calls_this_month BIGINT NOT NULL DEFAULT 0,
                allowed_ips      TEXT[],
                allowed_domains  TEXT[],
                created_at       TIMESTAMPTZ NOT NULL,
                expires_at       TIMESTAMPTZ,
                last_used_at     TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_owner ON api_keys (owner_id)")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    fn row_to_key(row: &sqlx::postgres::PgRow) -> Result<ApiKey, DomainError> {
        let scopes: Vec<String> = row.try_get("scopes").map_err(storage_error)?;
        let scopes = scopes
            .iter()
            .map(|s| parse_scope(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::storage(format!("Corrupt scope column: {}", e)))?;

        let tier: String = row.try_get("tier").map_err(storage_error)?;
        let tier = parse_tier(&tier)?;

        let total_calls: i64 = row.try_get("total_calls").map_err(storage_error)?;
        let calls_this_month: i64 = row.try_get("calls_this_month").map_err(storage_error)?;

        let mut key = ApiKey::new(
            ApiKeyId::new(row.try_get::<String, _>("key_id").map_err(storage_error)?),
            row.try_get::<String, _>("key_hash").map_err(storage_error)?,
            row.try_get::<String, _>("key_prefix").map_err(storage_error)?,
            row.try_get::<String, _>("owner_id").map_err(storage_error)?,
            row.try_get::<String, _>("name").map_err(storage_error)?,
            scopes,
            tier,
        )
        .with_created_at(row.try_get("created_at").map_err(storage_error)?)
        .with_active(row.try_get("is_active").map_err(storage_error)?)
        .with_test_mode(row.try_get("is_test_mode").map_err(storage_error)?)
        .with_counters(
            total_calls as u64,
            calls_this_month as u64,
            row.try_get("last_used_at").map_err(storage_error)?,
        );

        if let Some(expires_at) = row
            .try_get::<Option<DateTime<Utc>>, _>("expires_at")
            .map_err(storage_error)?
        {
            key = key.with_expiration(expires_at);
        }
        if let Some(ips) = row
            .try_get::<Option<Vec<String>>, _>("allowed_ips")
            .map_err(storage_error)?
        {
            key = key.with_allowed_ips(ips);
        }
        if let Some(domains) = row
            .try_get::<Option<Vec<String>>, _>("allowed_domains")
            .map_err(storage_error)?
        {
            key = key.with_allowed_domains(domains);
        }

        Ok(key)
    }
}

fn parse_tier(tier: &str) -> Result<PricingTier, DomainError> {
    match tier {
        "free" => Ok(PricingTier::Free),
        "starter" => Ok(PricingTier::Starter),
        "professional" => Ok(PricingTier::Professional),
        "enterprise" => Ok(PricingTier::Enterprise),
        other => Err(DomainError::storage(format!(
            "Corrupt tier column: '{}'",
            other
        ))),
    }
}

fn storage_error(err: sqlx::Error) -> DomainError {
    DomainError::storage(err.to_string())
}

#[async_trait]
impl KeyRepository for PostgresKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    async fn insert(&self, key: ApiKey) -> Result<ApiKey, DomainError> {
        let scopes: Vec<String> = key.scopes().iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (
                key_id, key_hash, key_prefix, owner_id, name, scopes, tier,
                is_active, is_test_mode, total_calls, calls_this_month,
                allowed_ips, allowed_domains, created_at, expires_at, last_used_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(key.id().as_str())
        .bind(key.key_hash())
        .bind(key.key_prefix())
        .bind(key.owner_id())
        .bind(key.name())
        .bind(&scopes)
        .bind(key.tier().to_string())
        .bind(key.is_active())
        .bind(key.is_test_mode())
        .bind(key.total_calls() as i64)
        .bind(key.calls_this_month() as i64)
        .bind(key.allowed_ips().map(|ips| ips.to_vec()))
        .bind(key.allowed_domains().map(|d| d.to_vec()))
        .bind(key.created_at())
        .bind(key.expires_at())
        .bind(key.last_used_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(key),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                DomainError::conflict(format!("API key '{}' already exists", key.id())),
            ),
            Err(err) => Err(storage_error(err)),
        }
    }

    async fn update(&self, key: &ApiKey) -> Result<ApiKey, DomainError> {
        let scopes: Vec<String> = key.scopes().iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET key_hash = $2, key_prefix = $3, name = $4, scopes = $5,
                tier = $6, is_active = $7, is_test_mode = $8,
                total_calls = $9, calls_this_month = $10,
                allowed_ips = $11, allowed_domains = $12,
                expires_at = $13, last_used_at = $14
            WHERE key_id = $1
            "#,
        )
        .bind(key.id().as_str())
        .bind(key.key_hash())
        .bind(key.key_prefix())
        .bind(key.name())
        .bind(&scopes)
        .bind(key.tier().to_string())
        .bind(key.is_active())
        .bind(key.is_test_mode())
        .bind(key.total_calls() as i64)
        .bind(key.calls_this_month() as i64)
        .bind(key.allowed_ips().map(|ips| ips.to_vec()))
        .bind(key.allowed_domains().map(|d| d.to_vec()))
        .bind(key.expires_at())
        .bind(key.last_used_at())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                key.id()
            )));
        }

        Ok(key.clone())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE owner_id = $1 ORDER BY created_at")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(Self::row_to_key).collect()
    }

    async fn count_active_by_owner(&self, owner_id: &str) -> Result<usize, DomainError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM api_keys WHERE owner_id = $1 AND is_active",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let count: i64 = row.try_get("count").map_err(storage_error)?;
        Ok(count as usize)
    }

    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<bool, DomainError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = $2 WHERE key_id = $1")
            .bind(id.as_str())
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_usage(
        &self,
        id: &ApiKeyId,
        cost: u64,
        limit: Option<u64>,
    ) -> Result<UsageDecision, DomainError> {
        // One conditional statement: the row either absorbs the full
        // increment or is left untouched.
        let updated = sqlx::query(
            r#"
            UPDATE api_keys
            SET calls_this_month = calls_this_month + $2,
                total_calls = total_calls + $2,
                last_used_at = NOW()
            WHERE key_id = $1
              AND ($3::BIGINT IS NULL OR calls_this_month + $2 <= $3)
            RETURNING calls_this_month, total_calls
            "#,
        )
        .bind(id.as_str())
        .bind(cost as i64)
        .bind(limit.map(|l| l as i64))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        if let Some(row) = updated {
            let calls_this_month: i64 = row.try_get("calls_this_month").map_err(storage_error)?;
            let total_calls: i64 = row.try_get("total_calls").map_err(storage_error)?;

            return Ok(UsageDecision {
                allowed: true,
                calls_this_month: calls_this_month as u64,
                total_calls: total_calls as u64,
                limit,
            });
        }

        // No row updated: the key is missing or the increment would
        // cross the limit. Distinguish without writing anything.
        let row = sqlx::query(
            "SELECT calls_this_month, total_calls FROM api_keys WHERE key_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        let calls_this_month: i64 = row.try_get("calls_this_month").map_err(storage_error)?;
        let total_calls: i64 = row.try_get("total_calls").map_err(storage_error)?;

        Ok(UsageDecision {
            allowed: false,
            calls_this_month: calls_this_month as u64,
            total_calls: total_calls as u64,
            limit,
        })
    }

    async fn current_usage(&self, id: &ApiKeyId) -> Result<Option<CurrentUsage>, DomainError> {
        let row = sqlx::query("SELECT calls_this_month, tier FROM api_keys WHERE key_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let calls_this_month: i64 =
                    row.try_get("calls_this_month").map_err(storage_error)?;
                let tier: String = row.try_get("tier").map_err(storage_error)?;

                Ok(Some(CurrentUsage {
                    calls_this_month: calls_this_month as u64,
                    limit: parse_tier(&tier)?.monthly_call_limit(),
                }))
            }
            None => Ok(None),
        }
    }

    async fn reset_monthly(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        // Row-scoped update: a concurrent increment either lands before
        // this statement (and is zeroed with the rest of the stale
        // window) or after it (and counts against the new window).
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET calls_this_month = 0
            WHERE calls_this_month > 0
              AND date_trunc('month', COALESCE(last_used_at, created_at))
                  < date_trunc('month', $1::TIMESTAMPTZ)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = FALSE
            WHERE is_active
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() as usize)
    }
}
