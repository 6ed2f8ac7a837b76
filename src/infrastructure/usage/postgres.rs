//! PostgreSQL usage ledger implementation

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::usage::{UsageQuery, UsageRecord, UsageRecordId, UsageRepository};
use crate::domain::DomainError;

/// PostgreSQL implementation of [`UsageRepository`].
#[derive(Debug, Clone)]
pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_records (
                record_id        TEXT PRIMARY KEY,
                key_id           TEXT NOT NULL,
                owner_id         TEXT NOT NULL,
                endpoint         TEXT NOT NULL,
                method           TEXT NOT NULL,
                status_code      INTEGER NOT NULL,
                credits_used     BIGINT NOT NULL,
                response_time_ms BIGINT,
                timestamp        TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_records_key \
             ON usage_records (key_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<UsageRecord, DomainError> {
        let status_code: i32 = row.try_get("status_code").map_err(storage_error)?;
        let credits_used: i64 = row.try_get("credits_used").map_err(storage_error)?;
        let response_time_ms: Option<i64> =
            row.try_get("response_time_ms").map_err(storage_error)?;

        let mut record = UsageRecord::new(
            UsageRecordId::new(row.try_get::<String, _>("record_id").map_err(storage_error)?),
            row.try_get::<String, _>("key_id").map_err(storage_error)?,
            row.try_get::<String, _>("owner_id").map_err(storage_error)?,
            row.try_get::<String, _>("endpoint").map_err(storage_error)?,
            row.try_get::<String, _>("method").map_err(storage_error)?,
        )
        .with_status_code(status_code as u16)
        .with_credits(credits_used as u64);

        if let Some(ms) = response_time_ms {
            record = record.with_response_time_ms(ms as u64);
        }

        record.timestamp = row.try_get("timestamp").map_err(storage_error)?;

        Ok(record)
    }
}

fn storage_error(err: sqlx::Error) -> DomainError {
    DomainError::storage(err.to_string())
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (
                record_id, key_id, owner_id, endpoint, method,
                status_code, credits_used, response_time_ms, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id().as_str())
        .bind(&record.key_id)
        .bind(&record.owner_id)
        .bind(&record.endpoint)
        .bind(&record.method)
        .bind(record.status_code as i32)
        .bind(record.credits_used as i64)
        .bind(record.response_time_ms.map(|ms| ms as i64))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError> {
        let limit = query.limit.map(|l| l as i64).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT * FROM usage_records
            WHERE ($1::TEXT IS NULL OR key_id = $1)
              AND ($2::TEXT IS NULL OR owner_id = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR timestamp >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR timestamp < $4)
            ORDER BY timestamp DESC
            LIMIT $5
            "#,
        )
        .bind(query.key_id.as_deref())
        .bind(query.owner_id.as_deref())
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM usage_records
            WHERE ($1::TEXT IS NULL OR key_id = $1)
              AND ($2::TEXT IS NULL OR owner_id = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR timestamp >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR timestamp < $4)
            "#,
        )
        .bind(query.key_id.as_deref())
        .bind(query.owner_id.as_deref())
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let count: i64 = row.try_get("count").map_err(storage_error)?;
        Ok(count as usize)
    }
}
