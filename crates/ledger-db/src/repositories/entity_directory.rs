//! Entity directory backed by the platform's `stores` and `custom_domains` tables

use async_trait::async_trait;
use ledger_core::{
    models::{BillableEntity, EntityKind},
    traits::EntityDirectory,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of EntityDirectory
pub struct PgEntityDirectory {
    pool: PgPool,
}

impl PgEntityDirectory {
    /// Create a new entity directory
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityDirectory for PgEntityDirectory {
    #[instrument(skip(self))]
    async fn published_stores(&self) -> AppResult<Vec<BillableEntity>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, name
            FROM stores
            WHERE is_published
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing published stores: {}", e);
            AppError::Database(format!("Failed to list stores: {}", e))
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| BillableEntity::store(id, name))
            .collect())
    }

    #[instrument(skip(self))]
    async fn active_verified_domains(&self) -> AppResult<Vec<BillableEntity>> {
        let rows: Vec<(Uuid, String, Uuid)> = sqlx::query_as(
            r#"
            SELECT id, domain, store_id
            FROM custom_domains
            WHERE is_active AND is_verified
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing custom domains: {}", e);
            AppError::Database(format!("Failed to list custom domains: {}", e))
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, domain, store_id)| BillableEntity::custom_domain(id, domain, store_id))
            .collect())
    }

    #[instrument(skip(self, entity), fields(entity_id = %entity.id, kind = %entity.kind))]
    async fn resolve_owner(&self, entity: &BillableEntity) -> AppResult<Option<Uuid>> {
        let sql = match entity.kind {
            EntityKind::Store => "SELECT owner_account_id FROM stores WHERE id = $1",
            EntityKind::CustomDomain => {
                r#"
                SELECT s.owner_account_id
                FROM custom_domains d
                JOIN stores s ON s.id = d.store_id
                WHERE d.id = $1
                "#
            }
        };

        let owner: Option<(Uuid,)> = sqlx::query_as(sql)
            .bind(entity.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error resolving owner of {}: {}", entity.id, e);
                AppError::Database(format!("Failed to resolve owner: {}", e))
            })?;

        Ok(owner.map(|(id,)| id))
    }

    #[instrument(skip(self, entity), fields(entity_id = %entity.id, kind = %entity.kind))]
    async fn deactivate(&self, entity: &BillableEntity, reason: &str) -> AppResult<()> {
        let sql = match entity.kind {
            EntityKind::Store => {
                r#"
                UPDATE stores
                SET is_published = FALSE, unpublish_reason = $2, updated_at = NOW()
                WHERE id = $1
                "#
            }
            EntityKind::CustomDomain => {
                r#"
                UPDATE custom_domains
                SET is_active = FALSE, deactivation_reason = $2, updated_at = NOW()
                WHERE id = $1
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(entity.id)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deactivating {}: {}", entity.id, e);
                AppError::Database(format!("Failed to deactivate entity: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::EntityNotFound(entity.id.to_string()));
        }

        info!("Deactivated {} {} ({})", entity.kind, entity.id, reason);
        Ok(())
    }
}
