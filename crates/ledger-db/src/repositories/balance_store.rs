//! Balance store implementation
//!
//! All balance mutations go through single-statement conditional updates
//! inside a database transaction. The `balance >= $amount` predicate is
//! re-evaluated by PostgreSQL after a concurrent writer releases the row
//! lock, so two deductions can never both succeed when only one is covered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    models::{
        AppliedDebit, CreditBalance, CreditGrant, CreditReceipt, CreditTransaction, DailyChargeKey,
        DebitOutcome, TransactionKind, TransactionStatus, UsageDebit, UsageRecord,
    },
    traits::BalanceStore,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::purchase_repo::{TransactionRow, TRANSACTION_COLUMNS};
use super::usage_repo::{UsageRow, USAGE_COLUMNS};

pub(crate) const BALANCE_COLUMNS: &str = r#"
    account_id, balance, total_purchased, total_bonus, total_used, created_at, updated_at
"#;

/// PostgreSQL implementation of BalanceStore
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    /// Create a new balance store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn begin(pool: &PgPool) -> AppResult<Transaction<'static, Postgres>> {
    pool.begin().await.map_err(|e| {
        error!("Failed to start transaction: {}", e);
        AppError::Transaction(format!("Failed to start transaction: {}", e))
    })
}

async fn commit(tx: Transaction<'_, Postgres>) -> AppResult<()> {
    tx.commit().await.map_err(|e| {
        error!("Failed to commit transaction: {}", e);
        AppError::Transaction(format!("Failed to commit transaction: {}", e))
    })
}

async fn rollback(tx: Transaction<'_, Postgres>) -> AppResult<()> {
    tx.rollback().await.map_err(|e| {
        error!("Failed to roll back transaction: {}", e);
        AppError::Transaction(format!("Failed to roll back transaction: {}", e))
    })
}

/// Make sure the balance row exists so the conditional update has a target
async fn ensure_balance_row(tx: &mut Transaction<'_, Postgres>, account_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_balances (account_id)
        VALUES ($1)
        ON CONFLICT (account_id) DO NOTHING
        "#,
    )
    .bind(account_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!("Failed to create balance row for {}: {}", account_id, e);
        AppError::Database(format!("Failed to create balance: {}", e))
    })?;

    Ok(())
}

/// Insert the uptime log row for `key`, returning its id, or `None` when the
/// entity was already charged for that date.
///
/// Balance columns are filled in once the decrement succeeds.
async fn claim_daily_charge(
    tx: &mut Transaction<'_, Postgres>,
    debit: &UsageDebit,
    key: &DailyChargeKey,
) -> AppResult<Option<Uuid>> {
    let claimed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO uptime_log (
            id, entity_id, entity_kind, account_id, charged_date,
            amount, balance_before, balance_after, usage_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, 0, 0, $7)
        ON CONFLICT (entity_id, charged_date) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(key.entity_id)
    .bind(key.entity_kind.as_str())
    .bind(debit.account_id)
    .bind(key.charged_date)
    .bind(debit.amount)
    .bind(debit.usage_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| {
        error!("Failed to write uptime log for {}: {}", key.entity_id, e);
        AppError::Database(format!("Failed to write uptime log: {}", e))
    })?;

    Ok(claimed.map(|(id,)| id))
}

/// Drop a claimed uptime log row whose debit did not go through
async fn release_daily_charge(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM uptime_log WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to release uptime log row {}: {}", id, e);
            AppError::Database(format!("Failed to release uptime log: {}", e))
        })?;

    Ok(())
}

/// Add credits to an account inside an open transaction.
///
/// Shared by bonus awards and purchase completion so both follow the same
/// increment path.
pub(crate) async fn credit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    kind: TransactionKind,
    credits: Decimal,
) -> AppResult<CreditBalance> {
    let (purchased, bonus) = match kind {
        TransactionKind::Purchase => (credits, Decimal::ZERO),
        TransactionKind::Bonus => (Decimal::ZERO, credits),
    };

    let sql = format!(
        r#"
        INSERT INTO credit_balances (account_id, balance, total_purchased, total_bonus)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (account_id) DO UPDATE
        SET balance = credit_balances.balance + EXCLUDED.balance,
            total_purchased = credit_balances.total_purchased + EXCLUDED.total_purchased,
            total_bonus = credit_balances.total_bonus + EXCLUDED.total_bonus,
            updated_at = NOW()
        RETURNING {}
        "#,
        BALANCE_COLUMNS
    );

    let row = sqlx::query_as::<_, BalanceRow>(&sql)
        .bind(account_id)
        .bind(credits)
        .bind(purchased)
        .bind(bonus)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to credit account {}: {}", account_id, e);
            AppError::Database(format!("Failed to credit balance: {}", e))
        })?;

    Ok(row.into())
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    #[instrument(skip(self))]
    async fn find_balance(&self, account_id: Uuid) -> AppResult<Option<CreditBalance>> {
        let sql = format!(
            "SELECT {} FROM credit_balances WHERE account_id = $1",
            BALANCE_COLUMNS
        );

        let row = sqlx::query_as::<_, BalanceRow>(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding balance for {}: {}", account_id, e);
                AppError::Database(format!("Failed to find balance: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, debit), fields(account_id = %debit.account_id, amount = %debit.amount))]
    async fn apply_debit(&self, debit: &UsageDebit) -> AppResult<DebitOutcome> {
        let mut tx = begin(&self.pool).await?;

        ensure_balance_row(&mut tx, debit.account_id).await?;

        // The uptime log row is claimed before any money moves. A concurrent
        // run holding the same key blocks here until it commits or rolls back.
        let claimed = match &debit.daily_charge {
            Some(key) => match claim_daily_charge(&mut tx, debit, key).await? {
                Some(id) => Some(id),
                None => {
                    rollback(tx).await?;
                    debug!(
                        "Entity {} already charged for {}",
                        key.entity_id, key.charged_date
                    );
                    return Ok(DebitOutcome::AlreadyCharged {
                        entity_id: key.entity_id,
                        charged_date: key.charged_date,
                    });
                }
            },
            None => None,
        };

        let decremented: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE credit_balances
            SET balance = balance - $2,
                total_used = total_used + $2,
                updated_at = NOW()
            WHERE account_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(debit.account_id)
        .bind(debit.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to decrement balance for {}: {}", debit.account_id, e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?;

        let Some((balance_after,)) = decremented else {
            let (available,): (Decimal,) =
                sqlx::query_as("SELECT balance FROM credit_balances WHERE account_id = $1")
                    .bind(debit.account_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| {
                        error!("Failed to read balance for {}: {}", debit.account_id, e);
                        AppError::Database(format!("Failed to read balance: {}", e))
                    })?;

            if let Some(id) = claimed {
                release_daily_charge(&mut tx, id).await?;
            }

            // Only the lazily created balance row is kept
            commit(tx).await?;

            debug!(
                "Insufficient credits for {}: required {}, available {}",
                debit.account_id, debit.amount, available
            );
            return Ok(DebitOutcome::Insufficient {
                required: debit.amount,
                available,
            });
        };

        let sql = format!(
            r#"
            INSERT INTO credit_usage (
                id, account_id, entity_id, credits_used, usage_type, description,
                reference_id, reference_type, metadata, balance_after
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            USAGE_COLUMNS
        );

        let usage: UsageRecord = sqlx::query_as::<_, UsageRow>(&sql)
            .bind(debit.usage_id)
            .bind(debit.account_id)
            .bind(debit.entity_id)
            .bind(debit.amount)
            .bind(debit.usage_type.as_str())
            .bind(&debit.description)
            .bind(&debit.reference_id)
            .bind(&debit.reference_type)
            .bind(&debit.metadata)
            .bind(balance_after)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to append usage record: {}", e);
                AppError::Database(format!("Failed to append usage record: {}", e))
            })?
            .into();

        let balance_before = balance_after + debit.amount;

        if let Some(id) = claimed {
            sqlx::query(
                r#"
                UPDATE uptime_log
                SET balance_before = $2, balance_after = $3
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(balance_before)
            .bind(balance_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to complete uptime log row {}: {}", id, e);
                AppError::Database(format!("Failed to write uptime log: {}", e))
            })?;
        }

        commit(tx).await?;

        debug!(
            "Debited {} from {}, balance {} -> {}",
            debit.amount, debit.account_id, balance_before, balance_after
        );

        Ok(DebitOutcome::Applied(AppliedDebit {
            usage,
            balance_before,
            balance_after,
        }))
    }

    #[instrument(skip(self, grant), fields(account_id = %grant.account_id, credits = %grant.credits))]
    async fn apply_credit(&self, grant: &CreditGrant) -> AppResult<CreditReceipt> {
        let mut tx = begin(&self.pool).await?;

        let balance = credit_in_tx(&mut tx, grant.account_id, grant.kind, grant.credits).await?;

        let sql = format!(
            r#"
            INSERT INTO credit_transactions (
                id, account_id, kind, amount_usd, credits_amount, status,
                description, metadata, completed_at
            )
            VALUES ($1, $2, $3, 0, $4, $5, $6, $7, NOW())
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let transaction: CreditTransaction = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(grant.transaction_id)
            .bind(grant.account_id)
            .bind(grant.kind.to_string())
            .bind(grant.credits)
            .bind(TransactionStatus::Completed.to_string())
            .bind(&grant.description)
            .bind(&grant.metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to record credit transaction: {}", e);
                AppError::Database(format!("Failed to record transaction: {}", e))
            })?
            .into();

        commit(tx).await?;

        info!(
            "Credited {} {} to {}, balance {}",
            grant.credits, grant.kind, grant.account_id, balance.balance
        );

        Ok(CreditReceipt {
            transaction,
            balance,
        })
    }
}

/// Database row representation of a balance
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BalanceRow {
    account_id: Uuid,
    balance: Decimal,
    total_purchased: Decimal,
    total_bonus: Decimal,
    total_used: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BalanceRow> for CreditBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            account_id: row.account_id,
            balance: row.balance,
            total_purchased: row.total_purchased,
            total_bonus: row.total_bonus,
            total_used: row.total_used,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
