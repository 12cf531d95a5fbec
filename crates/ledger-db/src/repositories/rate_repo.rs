//! Service rate repository implementation
//!
//! Reads always hit the table so administrative changes apply to the very
//! next deduction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    models::{BillingCadence, NewServiceRate, ServiceRate},
    money::normalize_credits,
    traits::RateRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::is_unique_violation;

const RATE_COLUMNS: &str = r#"
    id, service_key, name, description, cost_per_unit, cadence, is_active,
    created_at, updated_at
"#;

/// PostgreSQL implementation of RateRepository
pub struct PgRateRepository {
    pool: PgPool,
}

impl PgRateRepository {
    /// Create a new rate repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateRepository for PgRateRepository {
    #[instrument(skip(self))]
    async fn find_by_key(&self, service_key: &str) -> AppResult<Option<ServiceRate>> {
        let sql = format!(
            "SELECT {} FROM service_rates WHERE service_key = $1",
            RATE_COLUMNS
        );

        let row = sqlx::query_as::<_, RateRow>(&sql)
            .bind(service_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding rate {}: {}", service_key, e);
                AppError::Database(format!("Failed to find rate: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self, include_inactive: bool) -> AppResult<Vec<ServiceRate>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM service_rates
            WHERE $1 OR is_active
            ORDER BY service_key
            "#,
            RATE_COLUMNS
        );

        let rows = sqlx::query_as::<_, RateRow>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing rates: {}", e);
                AppError::Database(format!("Failed to list rates: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, rate), fields(service_key = %rate.service_key))]
    async fn create(&self, rate: &NewServiceRate) -> AppResult<ServiceRate> {
        debug!("Creating rate {}", rate.service_key);

        let sql = format!(
            r#"
            INSERT INTO service_rates (
                id, service_key, name, description, cost_per_unit, cadence, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            RATE_COLUMNS
        );

        let row = sqlx::query_as::<_, RateRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(&rate.service_key)
            .bind(&rate.name)
            .bind(&rate.description)
            .bind(normalize_credits(rate.cost_per_unit))
            .bind(rate.cadence.as_str())
            .bind(rate.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::AlreadyExists(format!("Rate {} already exists", rate.service_key))
                } else {
                    error!("Database error creating rate: {}", e);
                    AppError::Database(format!("Failed to create rate: {}", e))
                }
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn update_cost(
        &self,
        service_key: &str,
        cost_per_unit: Decimal,
    ) -> AppResult<Option<ServiceRate>> {
        let sql = format!(
            r#"
            UPDATE service_rates
            SET cost_per_unit = $2, updated_at = NOW()
            WHERE service_key = $1
            RETURNING {}
            "#,
            RATE_COLUMNS
        );

        let row = sqlx::query_as::<_, RateRow>(&sql)
            .bind(service_key)
            .bind(cost_per_unit)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating rate {}: {}", service_key, e);
                AppError::Database(format!("Failed to update rate: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn set_active(&self, service_key: &str, is_active: bool) -> AppResult<Option<ServiceRate>> {
        let sql = format!(
            r#"
            UPDATE service_rates
            SET is_active = $2, updated_at = NOW()
            WHERE service_key = $1
            RETURNING {}
            "#,
            RATE_COLUMNS
        );

        let row = sqlx::query_as::<_, RateRow>(&sql)
            .bind(service_key)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error toggling rate {}: {}", service_key, e);
                AppError::Database(format!("Failed to update rate: {}", e))
            })?;

        Ok(row.map(Into::into))
    }
}

/// Database row representation of a service rate
#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    service_key: String,
    name: String,
    description: Option<String>,
    cost_per_unit: Decimal,
    cadence: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RateRow> for ServiceRate {
    fn from(row: RateRow) -> Self {
        Self {
            id: row.id,
            service_key: row.service_key,
            name: row.name,
            description: row.description,
            cost_per_unit: row.cost_per_unit,
            cadence: BillingCadence::from_str(&row.cadence).unwrap_or_default(),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
