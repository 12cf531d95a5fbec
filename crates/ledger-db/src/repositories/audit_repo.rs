//! Audit log repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    models::{AuditLog, AuditLogData},
    traits::AuditLogRepository,
    AppError, AppResult,
};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of AuditLogRepository
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    /// Create a new audit log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new audit log entry
    #[instrument(skip(self, data))]
    pub async fn create(&self, data: AuditLogData) -> AppResult<AuditLog> {
        debug!("Creating audit log: {} on {}", data.action, data.entity_type);

        let row = sqlx::query(
            r#"
            INSERT INTO audit_logs (
                actor, action, entity_type, entity_id, details, ip_address
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                id, actor, action, entity_type, entity_id, details, ip_address, created_at
            "#,
        )
        .bind(&data.actor)
        .bind(&data.action)
        .bind(&data.entity_type)
        .bind(&data.entity_id)
        .bind(&data.details)
        .bind(&data.ip_address)
        .map(|row: sqlx::postgres::PgRow| AuditLog {
            id: row.get("id"),
            actor: row.get("actor"),
            action: row.get("action"),
            entity_type: row.get("entity_type"),
            entity_id: row.get("entity_id"),
            details: row.get("details"),
            ip_address: row.get("ip_address"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating audit log: {}", e);
            AppError::Database(format!("Failed to create audit log: {}", e))
        })?;

        Ok(row)
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn record(&self, entry: AuditLogData) -> AppResult<()> {
        self.create(entry).await.map(|_| ())
    }
}
