//! Uptime log repository implementation

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    models::{DailyCharge, EntityKind},
    traits::DailyChargeRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

const CHARGE_COLUMNS: &str = r#"
    id, entity_id, entity_kind, account_id, charged_date, amount,
    balance_before, balance_after, usage_id, created_at
"#;

/// PostgreSQL implementation of DailyChargeRepository
pub struct PgDailyChargeRepository {
    pool: PgPool,
}

impl PgDailyChargeRepository {
    /// Create a new uptime log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyChargeRepository for PgDailyChargeRepository {
    #[instrument(skip(self))]
    async fn find_charge(
        &self,
        entity_id: Uuid,
        charged_date: NaiveDate,
    ) -> AppResult<Option<DailyCharge>> {
        let sql = format!(
            "SELECT {} FROM uptime_log WHERE entity_id = $1 AND charged_date = $2",
            CHARGE_COLUMNS
        );

        let row = sqlx::query_as::<_, ChargeRow>(&sql)
            .bind(entity_id)
            .bind(charged_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error reading uptime log for {}: {}", entity_id, e);
                AppError::Database(format!("Failed to read uptime log: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_for_entity(
        &self,
        entity_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<DailyCharge>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM uptime_log
            WHERE entity_id = $1
              AND ($2::date IS NULL OR charged_date >= $2)
              AND ($3::date IS NULL OR charged_date <= $3)
            ORDER BY charged_date DESC
            "#,
            CHARGE_COLUMNS
        );

        let rows = sqlx::query_as::<_, ChargeRow>(&sql)
            .bind(entity_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing uptime log for {}: {}", entity_id, e);
                AppError::Database(format!("Failed to list uptime log: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChargeRow {
    id: Uuid,
    entity_id: Uuid,
    entity_kind: String,
    account_id: Uuid,
    charged_date: NaiveDate,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    usage_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<ChargeRow> for DailyCharge {
    fn from(row: ChargeRow) -> Self {
        Self {
            id: row.id,
            entity_id: row.entity_id,
            entity_kind: EntityKind::from_str(&row.entity_kind).unwrap_or(EntityKind::Store),
            account_id: row.account_id,
            charged_date: row.charged_date,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            usage_id: row.usage_id,
            created_at: row.created_at,
        }
    }
}
