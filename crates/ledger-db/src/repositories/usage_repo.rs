//! Usage ledger repository implementation
//!
//! Read side of `credit_usage`. Rows are written only by
//! `PgBalanceStore::apply_debit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    models::{UsageFilter, UsageRecord, UsageType, UsageTypeTotal},
    traits::UsageLedger,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

pub(crate) const USAGE_COLUMNS: &str = r#"
    id, account_id, entity_id, credits_used, usage_type, description,
    reference_id, reference_type, metadata, balance_after, created_at
"#;

/// PostgreSQL implementation of UsageLedger
pub struct PgUsageLedger {
    pool: PgPool,
}

impl PgUsageLedger {
    /// Create a new usage ledger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLedger for PgUsageLedger {
    #[instrument(skip(self))]
    async fn find_usage(&self, id: Uuid) -> AppResult<Option<UsageRecord>> {
        let sql = format!("SELECT {} FROM credit_usage WHERE id = $1", USAGE_COLUMNS);

        let row = sqlx::query_as::<_, UsageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding usage {}: {}", id, e);
                AppError::Database(format!("Failed to find usage record: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, filter))]
    async fn list_usage(
        &self,
        account_id: Uuid,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<UsageRecord>, i64)> {
        debug!(
            "Listing usage for account {} (limit {}, offset {})",
            account_id, limit, offset
        );

        let usage_type = filter.usage_type.map(|t| t.as_str());

        let sql = format!(
            r#"
            SELECT {}
            FROM credit_usage
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
              AND ($4::varchar IS NULL OR usage_type = $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
            USAGE_COLUMNS
        );

        let rows = sqlx::query_as::<_, UsageRow>(&sql)
            .bind(account_id)
            .bind(filter.from)
            .bind(filter.to)
            .bind(usage_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing usage: {}", e);
                AppError::Database(format!("Failed to list usage: {}", e))
            })?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM credit_usage
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
              AND ($4::varchar IS NULL OR usage_type = $4)
            "#,
        )
        .bind(account_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(usage_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting usage: {}", e);
            AppError::Database(format!("Failed to count usage: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self))]
    async fn usage_stats(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<UsageTypeTotal>> {
        let rows = sqlx::query_as::<_, UsageTotalRow>(
            r#"
            SELECT usage_type,
                   COUNT(*) AS count,
                   COALESCE(SUM(credits_used), 0) AS credits
            FROM credit_usage
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            GROUP BY usage_type
            ORDER BY usage_type
            "#,
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error aggregating usage: {}", e);
            AppError::Database(format!("Failed to aggregate usage: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Database row representation of a usage record
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UsageRow {
    id: Uuid,
    account_id: Uuid,
    entity_id: Option<Uuid>,
    credits_used: Decimal,
    usage_type: String,
    description: String,
    reference_id: Option<String>,
    reference_type: Option<String>,
    metadata: Option<JsonValue>,
    balance_after: Decimal,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            entity_id: row.entity_id,
            credits_used: row.credits_used,
            usage_type: UsageType::from_str(&row.usage_type).unwrap_or_default(),
            description: row.description,
            reference_id: row.reference_id,
            reference_type: row.reference_type,
            metadata: row.metadata,
            balance_after: row.balance_after,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageTotalRow {
    usage_type: String,
    count: i64,
    credits: Decimal,
}

impl From<UsageTotalRow> for UsageTypeTotal {
    fn from(row: UsageTotalRow) -> Self {
        Self {
            usage_type: UsageType::from_str(&row.usage_type).unwrap_or_default(),
            count: row.count,
            credits: row.credits,
        }
    }
}
