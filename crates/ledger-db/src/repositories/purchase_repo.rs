//! Purchase store implementation
//!
//! Status transitions are single conditional updates on `status = 'pending'`,
//! so a payment webhook delivered twice completes the purchase exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    models::{CreditTransaction, PurchaseTransition, TransactionKind, TransactionStatus},
    traits::PurchaseStore,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::balance_store::credit_in_tx;

pub(crate) const TRANSACTION_COLUMNS: &str = r#"
    id, account_id, kind, amount_usd, credits_amount, status, external_ref,
    failure_reason, description, metadata, created_at, completed_at
"#;

/// PostgreSQL implementation of PurchaseStore
pub struct PgPurchaseStore {
    pool: PgPool,
}

impl PgPurchaseStore {
    /// Create a new purchase store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Option<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding transaction {}: {}", id, e);
                AppError::Database(format!("Failed to find transaction: {}", e))
            })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl PurchaseStore for PgPurchaseStore {
    #[instrument(skip(self, tx), fields(account_id = %tx.account_id))]
    async fn create_pending(&self, tx: &CreditTransaction) -> AppResult<CreditTransaction> {
        debug!("Creating pending purchase {}", tx.id);

        let sql = format!(
            r#"
            INSERT INTO credit_transactions (
                id, account_id, kind, amount_usd, credits_amount, status,
                description, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(tx.id)
            .bind(tx.account_id)
            .bind(tx.kind.to_string())
            .bind(tx.amount_usd)
            .bind(tx.credits_amount)
            .bind(TransactionStatus::Pending.to_string())
            .bind(&tx.description)
            .bind(&tx.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating purchase: {}", e);
                AppError::Database(format!("Failed to create purchase: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<CreditTransaction>> {
        self.fetch(id).await
    }

    #[instrument(skip(self))]
    async fn complete(
        &self,
        id: Uuid,
        external_ref: Option<&str>,
    ) -> AppResult<Option<PurchaseTransition>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let sql = format!(
            r#"
            UPDATE credit_transactions
            SET status = 'completed',
                external_ref = COALESCE($2, external_ref),
                completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let flipped = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(external_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to complete purchase {}: {}", id, e);
                AppError::Database(format!("Failed to complete purchase: {}", e))
            })?;

        let Some(row) = flipped else {
            drop(tx);
            return Ok(self.fetch(id).await?.map(PurchaseTransition::Unchanged));
        };

        let transaction: CreditTransaction = row.into();
        let balance = credit_in_tx(
            &mut tx,
            transaction.account_id,
            TransactionKind::Purchase,
            transaction.credits_amount,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Purchase {} completed, {} credits added to {}",
            transaction.id, transaction.credits_amount, transaction.account_id
        );

        Ok(Some(PurchaseTransition::Applied {
            transaction,
            balance: Some(balance),
        }))
    }

    #[instrument(skip(self))]
    async fn fail(&self, id: Uuid, reason: &str) -> AppResult<Option<PurchaseTransition>> {
        let sql = format!(
            r#"
            UPDATE credit_transactions
            SET status = 'failed',
                failure_reason = $2,
                completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let flipped = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to mark purchase {} failed: {}", id, e);
                AppError::Database(format!("Failed to fail purchase: {}", e))
            })?;

        match flipped {
            Some(row) => Ok(Some(PurchaseTransition::Applied {
                transaction: row.into(),
                balance: None,
            })),
            None => Ok(self.fetch(id).await?.map(PurchaseTransition::Unchanged)),
        }
    }

    #[instrument(skip(self))]
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CreditTransaction>, i64)> {
        let sql = format!(
            r#"
            SELECT {}
            FROM credit_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        );

        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing transactions: {}", e);
                AppError::Database(format!("Failed to list transactions: {}", e))
            })?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM credit_transactions WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting transactions: {}", e);
                    AppError::Database(format!("Failed to count transactions: {}", e))
                })?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

/// Database row representation of a credit transaction
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    kind: String,
    amount_usd: Decimal,
    credits_amount: Decimal,
    status: String,
    external_ref: Option<String>,
    failure_reason: Option<String>,
    description: Option<String>,
    metadata: Option<JsonValue>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TransactionRow> for CreditTransaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            kind: TransactionKind::from_str(&row.kind).unwrap_or_default(),
            amount_usd: row.amount_usd,
            credits_amount: row.credits_amount,
            status: TransactionStatus::from_str(&row.status).unwrap_or_default(),
            external_ref: row.external_ref,
            failure_reason: row.failure_reason,
            description: row.description,
            metadata: row.metadata,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}
