//! Purchase ledger
//!
//! Pending purchases are created before the payment processor is called and
//! completed (or failed) when its webhook arrives. Completion is idempotent:
//! a redelivered webhook returns the stored transaction without adding
//! credits again.

use ledger_core::{
    models::{
        CreditBalance, CreditGrant, CreditReceipt, CreditTransaction, PurchaseTransition,
        TransactionKind, TransactionStatus,
    },
    money::{normalize_credits, normalize_usd},
    traits::{BalanceStore, PaginatedResponse, Pagination, PurchaseStore},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of completing a purchase
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseCompletion {
    pub transaction: CreditTransaction,
    /// Balance after the credits were added; `None` on a repeated completion
    pub balance: Option<CreditBalance>,
    pub newly_completed: bool,
}

/// Purchase ledger
pub struct PurchaseLedger {
    purchases: Arc<dyn PurchaseStore>,
    balances: Arc<dyn BalanceStore>,
}

impl PurchaseLedger {
    pub fn new(purchases: Arc<dyn PurchaseStore>, balances: Arc<dyn BalanceStore>) -> Self {
        Self {
            purchases,
            balances,
        }
    }

    /// Record a pending purchase
    #[instrument(skip(self, metadata))]
    pub async fn create_purchase(
        &self,
        account_id: Uuid,
        amount_usd: Decimal,
        credits_amount: Decimal,
        metadata: Option<JsonValue>,
    ) -> AppResult<CreditTransaction> {
        let amount_usd = normalize_usd(amount_usd);
        let credits_amount = normalize_credits(credits_amount);

        if amount_usd <= Decimal::ZERO {
            return Err(AppError::Validation("amount_usd must be positive".to_string()));
        }
        if credits_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "credits_amount must be positive".to_string(),
            ));
        }

        let pending =
            CreditTransaction::pending_purchase(account_id, amount_usd, credits_amount, metadata);
        let stored = self.purchases.create_pending(&pending).await?;

        info!(
            "Created pending purchase {} for {}: {} USD -> {} credits",
            stored.id, account_id, amount_usd, credits_amount
        );
        Ok(stored)
    }

    /// Complete a pending purchase and add its credits
    #[instrument(skip(self))]
    pub async fn complete_purchase(
        &self,
        transaction_id: Uuid,
        external_ref: Option<&str>,
    ) -> AppResult<PurchaseCompletion> {
        let transition = self
            .purchases
            .complete(transaction_id, external_ref)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))?;

        match transition {
            PurchaseTransition::Applied {
                transaction,
                balance,
            } => Ok(PurchaseCompletion {
                transaction,
                balance,
                newly_completed: true,
            }),
            PurchaseTransition::Unchanged(transaction)
                if transaction.status == TransactionStatus::Completed =>
            {
                info!("Purchase {} already completed", transaction_id);
                Ok(PurchaseCompletion {
                    transaction,
                    balance: None,
                    newly_completed: false,
                })
            }
            PurchaseTransition::Unchanged(transaction) => {
                warn!(
                    "Cannot complete purchase {} in status {}",
                    transaction_id, transaction.status
                );
                Err(AppError::Conflict(format!(
                    "Transaction {} is {} and cannot be completed",
                    transaction_id, transaction.status
                )))
            }
        }
    }

    /// Mark a pending purchase failed
    #[instrument(skip(self))]
    pub async fn fail_purchase(&self, transaction_id: Uuid, reason: &str) -> AppResult<CreditTransaction> {
        let transition = self
            .purchases
            .fail(transaction_id, reason)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))?;

        match transition {
            PurchaseTransition::Applied { transaction, .. } => {
                info!("Purchase {} failed: {}", transaction_id, reason);
                Ok(transaction)
            }
            PurchaseTransition::Unchanged(transaction)
                if transaction.status == TransactionStatus::Failed =>
            {
                Ok(transaction)
            }
            PurchaseTransition::Unchanged(transaction) => Err(AppError::Conflict(format!(
                "Transaction {} is {} and cannot be failed",
                transaction_id, transaction.status
            ))),
        }
    }

    /// Add bonus credits through the same increment path as purchases
    #[instrument(skip(self, description))]
    pub async fn award_bonus(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: impl Into<String> + Send,
    ) -> AppResult<CreditReceipt> {
        let credits = normalize_credits(amount);
        if credits <= Decimal::ZERO {
            return Err(AppError::Validation("Bonus amount must be positive".to_string()));
        }

        let grant = CreditGrant {
            transaction_id: Uuid::now_v7(),
            account_id,
            kind: TransactionKind::Bonus,
            credits,
            description: description.into(),
            metadata: None,
        };

        let receipt = self.balances.apply_credit(&grant).await?;
        info!("Awarded {} bonus credits to {}", credits, account_id);
        Ok(receipt)
    }

    /// Look up a transaction
    pub async fn get_transaction(&self, transaction_id: Uuid) -> AppResult<CreditTransaction> {
        self.purchases
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Purchases and bonuses of an account, newest first
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<CreditTransaction>> {
        let (transactions, total) = self
            .purchases
            .list_by_account(account_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse::new(transactions, total, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_db::MemoryLedger;
    use rust_decimal_macros::dec;

    fn ledger() -> (Arc<MemoryLedger>, PurchaseLedger) {
        let store = Arc::new(MemoryLedger::new());
        let ledger = PurchaseLedger::new(store.clone(), store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_complete_twice_credits_once() {
        let (store, ledger) = ledger();
        let account = Uuid::new_v4();
        let pending = ledger
            .create_purchase(account, dec!(10), dec!(100), None)
            .await
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);

        let first = ledger
            .complete_purchase(pending.id, Some("ch_123"))
            .await
            .unwrap();
        assert!(first.newly_completed);
        assert_eq!(first.transaction.status, TransactionStatus::Completed);
        assert_eq!(first.transaction.external_ref.as_deref(), Some("ch_123"));

        let second = ledger
            .complete_purchase(pending.id, Some("ch_123"))
            .await
            .unwrap();
        assert!(!second.newly_completed);
        assert!(second.balance.is_none());

        let balance = store.find_balance(account).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(100));
        assert_eq!(balance.total_purchased, dec!(100));
        assert!(balance.is_consistent());
    }

    #[tokio::test]
    async fn test_fail_then_complete_conflicts() {
        let (store, ledger) = ledger();
        let account = Uuid::new_v4();
        let pending = ledger
            .create_purchase(account, dec!(5), dec!(50), None)
            .await
            .unwrap();

        let failed = ledger.fail_purchase(pending.id, "card_declined").await.unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card_declined"));

        // Repeated fail is idempotent
        assert!(ledger.fail_purchase(pending.id, "card_declined").await.is_ok());

        assert!(matches!(
            ledger.complete_purchase(pending.id, None).await,
            Err(AppError::Conflict(_))
        ));
        assert!(store.find_balance(account).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_completed_conflicts() {
        let (_, ledger) = ledger();
        let pending = ledger
            .create_purchase(Uuid::new_v4(), dec!(5), dec!(50), None)
            .await
            .unwrap();
        ledger.complete_purchase(pending.id, None).await.unwrap();

        assert!(matches!(
            ledger.fail_purchase(pending.id, "late").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_transaction_not_found() {
        let (_, ledger) = ledger();
        let id = Uuid::new_v4();

        assert!(matches!(
            ledger.complete_purchase(id, None).await,
            Err(AppError::TransactionNotFound(_))
        ));
        assert!(matches!(
            ledger.fail_purchase(id, "x").await,
            Err(AppError::TransactionNotFound(_))
        ));
        assert!(matches!(
            ledger.get_transaction(id).await,
            Err(AppError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected() {
        let (_, ledger) = ledger();
        let account = Uuid::new_v4();

        assert!(matches!(
            ledger.create_purchase(account, dec!(0), dec!(10), None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ledger.create_purchase(account, dec!(10), dec!(-1), None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_bonus_recorded_and_listed() {
        let (store, ledger) = ledger();
        let account = Uuid::new_v4();

        let receipt = ledger.award_bonus(account, dec!(2.5), "welcome").await.unwrap();
        assert_eq!(receipt.transaction.kind, TransactionKind::Bonus);
        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(receipt.transaction.amount_usd, Decimal::ZERO);
        assert_eq!(receipt.balance.total_bonus, dec!(2.5));

        ledger
            .create_purchase(account, dec!(1), dec!(10), None)
            .await
            .unwrap();

        let page = ledger
            .list_transactions(account, &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.data[0].kind, TransactionKind::Purchase);

        let balance = store.find_balance(account).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(2.5));
    }
}
