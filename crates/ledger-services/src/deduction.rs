//! Deduction engine
//!
//! Validates deductions at the call boundary and hands them to the
//! `BalanceStore`, which applies the conditional decrement and the usage
//! record atomically. Insufficient funds is an expected outcome, returned as
//! a value rather than an error.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    models::{
        CreditBalance, CreditGrant, CreditReceipt, DailyChargeKey, DebitOutcome, TransactionKind,
        UsageDebit, UsageFilter, UsageRecord, UsageType, UsageTypeTotal,
    },
    money::normalize_credits,
    traits::{BalanceStore, PaginatedResponse, Pagination, UsageLedger},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{CUSTOM_DOMAIN_KEY, INTEGRATION_RUN_KEY, PUBLISHED_STORE_KEY};
use crate::rate_catalog::RateCatalog;
use crate::references::ReferenceRegistry;

/// A deduction to apply
#[derive(Debug, Clone)]
pub struct DeductionRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub usage_type: UsageType,
    pub entity_id: Option<Uuid>,
    pub metadata: Option<JsonValue>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub daily_charge: Option<DailyChargeKey>,
}

impl DeductionRequest {
    pub fn new(account_id: Uuid, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            amount,
            description: description.into(),
            usage_type: UsageType::Feature,
            entity_id: None,
            metadata: None,
            reference_id: None,
            reference_type: None,
            daily_charge: None,
        }
    }

    pub fn usage_type(mut self, usage_type: UsageType) -> Self {
        self.usage_type = usage_type;
        self
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn reference(mut self, reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Tie the deduction to the uptime log; a second deduction with the same
    /// key is refused.
    pub fn daily_charge(mut self, key: DailyChargeKey) -> Self {
        self.daily_charge = Some(key);
        self
    }
}

/// Receipt for a committed deduction
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeductionReceipt {
    pub usage_id: Uuid,
    pub credits_deducted: Decimal,
    pub remaining_balance: Decimal,
}

/// Result of a deduction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DeductionOutcome {
    /// Balance decremented and usage recorded
    Success(DeductionReceipt),
    /// Balance did not cover the amount; nothing changed
    InsufficientCredits { required: Decimal, available: Decimal },
    /// Only for requests carrying a daily charge key: the entity was already
    /// charged for that day and nothing changed
    AlreadyCharged {
        entity_id: Uuid,
        charged_date: NaiveDate,
    },
}

impl DeductionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeductionOutcome::Success(_))
    }

    /// Convert to a receipt, turning the non-success outcomes into errors
    pub fn into_receipt(self) -> AppResult<DeductionReceipt> {
        match self {
            DeductionOutcome::Success(receipt) => Ok(receipt),
            DeductionOutcome::InsufficientCredits {
                required,
                available,
            } => Err(AppError::InsufficientCredits {
                required: required.to_string(),
                available: available.to_string(),
            }),
            DeductionOutcome::AlreadyCharged {
                entity_id,
                charged_date,
            } => Err(AppError::Conflict(format!(
                "Entity {} already charged for {}",
                entity_id, charged_date
            ))),
        }
    }
}

/// Aggregated usage for an account
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub account_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub by_type: Vec<UsageTypeTotal>,
    pub total_count: i64,
    pub total_credits: Decimal,
}

/// Deduction engine
pub struct DeductionEngine {
    balances: Arc<dyn BalanceStore>,
    usage: Arc<dyn UsageLedger>,
    rates: Arc<RateCatalog>,
    references: Arc<ReferenceRegistry>,
}

/// Storage failures on read paths surface as `StorageUnavailable`
fn storage_error(err: AppError) -> AppError {
    if err.is_systemic() {
        AppError::StorageUnavailable(err.to_string())
    } else {
        err
    }
}

impl DeductionEngine {
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        usage: Arc<dyn UsageLedger>,
        rates: Arc<RateCatalog>,
        references: Arc<ReferenceRegistry>,
    ) -> Self {
        Self {
            balances,
            usage,
            rates,
            references,
        }
    }

    /// Atomically deduct credits and record the usage
    #[instrument(skip(self, request), fields(account_id = %request.account_id, amount = %request.amount))]
    pub async fn deduct(&self, request: DeductionRequest) -> AppResult<DeductionOutcome> {
        let amount = normalize_credits(request.amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Deduction amount must be positive, got {}",
                request.amount
            )));
        }
        if request.description.trim().is_empty() {
            return Err(AppError::Validation("description must not be empty".to_string()));
        }

        self.references.validate(
            request.reference_type.as_deref(),
            request.reference_id.as_deref(),
            request.metadata.as_ref(),
        )?;

        let debit = UsageDebit {
            usage_id: Uuid::now_v7(),
            account_id: request.account_id,
            entity_id: request.entity_id,
            amount,
            usage_type: request.usage_type,
            description: request.description,
            reference_id: request.reference_id,
            reference_type: request.reference_type,
            metadata: request.metadata,
            daily_charge: request.daily_charge,
        };

        let outcome = match self.balances.apply_debit(&debit).await? {
            DebitOutcome::Applied(applied) => {
                info!(
                    "Deducted {} from {} ({}), remaining {}",
                    amount, debit.account_id, debit.usage_type, applied.balance_after
                );
                DeductionOutcome::Success(DeductionReceipt {
                    usage_id: applied.usage.id,
                    credits_deducted: applied.usage.credits_used,
                    remaining_balance: applied.balance_after,
                })
            }
            DebitOutcome::Insufficient {
                required,
                available,
            } => {
                warn!(
                    "Insufficient credits for {}: required {}, available {}",
                    debit.account_id, required, available
                );
                DeductionOutcome::InsufficientCredits {
                    required,
                    available,
                }
            }
            DebitOutcome::AlreadyCharged {
                entity_id,
                charged_date,
            } => {
                debug!("Entity {} already charged for {}", entity_id, charged_date);
                DeductionOutcome::AlreadyCharged {
                    entity_id,
                    charged_date,
                }
            }
        };

        Ok(outcome)
    }

    /// Price `units` of a service through the rate catalog, then deduct
    #[instrument(skip(self, description))]
    pub async fn deduct_for_service(
        &self,
        account_id: Uuid,
        service_key: &str,
        units: Decimal,
        description: impl Into<String> + Send,
    ) -> AppResult<DeductionOutcome> {
        let cost = self.calculate_cost(service_key, units).await?;

        let usage_type = match service_key {
            PUBLISHED_STORE_KEY => UsageType::StoreHosting,
            CUSTOM_DOMAIN_KEY => UsageType::CustomDomain,
            INTEGRATION_RUN_KEY => UsageType::IntegrationRun,
            _ => UsageType::Feature,
        };

        let request = DeductionRequest::new(account_id, cost, description)
            .usage_type(usage_type)
            .metadata(json!({ "service_key": service_key, "units": units }));

        self.deduct(request).await
    }

    /// Unconditionally add bonus credits
    #[instrument(skip(self, description))]
    pub async fn award(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: impl Into<String> + Send,
    ) -> AppResult<CreditReceipt> {
        let credits = normalize_credits(amount);
        if credits <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Award amount must be positive, got {}",
                amount
            )));
        }

        let grant = CreditGrant {
            transaction_id: Uuid::now_v7(),
            account_id,
            kind: TransactionKind::Bonus,
            credits,
            description: description.into(),
            metadata: None,
        };

        self.balances.apply_credit(&grant).await
    }

    /// Spendable balance, zero for an account without history
    #[instrument(skip(self))]
    pub async fn get_balance(&self, account_id: Uuid) -> AppResult<Decimal> {
        Ok(self
            .balances
            .find_balance(account_id)
            .await
            .map_err(storage_error)?
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Balance with its running totals
    #[instrument(skip(self))]
    pub async fn get_balance_summary(&self, account_id: Uuid) -> AppResult<CreditBalance> {
        Ok(self
            .balances
            .find_balance(account_id)
            .await
            .map_err(storage_error)?
            .unwrap_or_else(|| CreditBalance::empty(account_id)))
    }

    /// Cost of `units` of a service, to four decimal places
    pub async fn calculate_cost(&self, service_key: &str, units: Decimal) -> AppResult<Decimal> {
        self.rates.calculate_cost(service_key, units).await
    }

    /// Paginated usage history, newest first
    #[instrument(skip(self, filter))]
    pub async fn usage_history(
        &self,
        account_id: Uuid,
        filter: &UsageFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<UsageRecord>> {
        let (records, total) = self
            .usage
            .list_usage(account_id, filter, pagination.limit(), pagination.offset())
            .await
            .map_err(storage_error)?;

        Ok(PaginatedResponse::new(records, total, pagination))
    }

    /// Usage totals per usage type plus the grand total
    #[instrument(skip(self))]
    pub async fn usage_stats(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<UsageStats> {
        let by_type = self
            .usage
            .usage_stats(account_id, from, to)
            .await
            .map_err(storage_error)?;

        let total_count = by_type.iter().map(|t| t.count).sum();
        let total_credits = by_type.iter().map(|t| t.credits).sum();

        Ok(UsageStats {
            account_id,
            from,
            to,
            by_type,
            total_count,
            total_credits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::models::EntityKind;
    use ledger_db::MemoryLedger;
    use rust_decimal_macros::dec;
    use tokio::task::JoinSet;

    async fn engine() -> (Arc<MemoryLedger>, DeductionEngine) {
        let store = Arc::new(MemoryLedger::new());
        let rates = Arc::new(RateCatalog::new(store.clone(), store.clone()));
        rates.seed_defaults().await.unwrap();
        let engine = DeductionEngine::new(
            store.clone(),
            store.clone(),
            rates,
            Arc::new(ReferenceRegistry::with_builtins()),
        );
        (store, engine)
    }

    async fn funded_account(engine: &DeductionEngine, credits: Decimal) -> Uuid {
        let account = Uuid::new_v4();
        engine.award(account, credits, "starting credits").await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_deduct_reduces_balance_and_records_usage() {
        let (store, engine) = engine().await;
        let account = funded_account(&engine, dec!(5.00)).await;

        let outcome = engine
            .deduct(DeductionRequest::new(account, dec!(2.00), "report export"))
            .await
            .unwrap();

        let receipt = outcome.into_receipt().unwrap();
        assert_eq!(receipt.credits_deducted, dec!(2.0000));
        assert_eq!(receipt.remaining_balance, dec!(3.0000));
        assert_eq!(engine.get_balance(account).await.unwrap(), dec!(3.00));

        let usage = store.find_usage(receipt.usage_id).await.unwrap().unwrap();
        assert_eq!(usage.credits_used, dec!(2.00));
        assert_eq!(usage.balance_after, dec!(3.00));
        assert_eq!(store.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits_is_a_value() {
        let (store, engine) = engine().await;
        let account = funded_account(&engine, dec!(0.30)).await;

        let outcome = engine
            .deduct(DeductionRequest::new(account, dec!(0.50), "domain"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeductionOutcome::InsufficientCredits {
                required: dec!(0.5000),
                available: dec!(0.3000),
            }
        );
        assert_eq!(engine.get_balance(account).await.unwrap(), dec!(0.30));
        assert_eq!(store.usage_count(), 0);

        let err = outcome.into_receipt().unwrap_err();
        assert_eq!(err.error_code(), "insufficient_credits");
        assert!(err.to_string().contains("required 0.5000, available 0.3000"));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (_, engine) = engine().await;
        let account = funded_account(&engine, dec!(1)).await;

        for amount in [dec!(0), dec!(-1), dec!(0.00001)] {
            let result = engine
                .deduct(DeductionRequest::new(account, amount, "bad"))
                .await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{}", amount);
        }
        assert!(matches!(
            engine.award(account, dec!(0), "nothing").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reference_metadata_validated() {
        let (_, engine) = engine().await;
        let account = funded_account(&engine, dec!(5)).await;

        let missing = DeductionRequest::new(account, dec!(1), "sync")
            .reference("integration_run", "run-1")
            .metadata(json!({}));
        assert!(matches!(
            engine.deduct(missing).await,
            Err(AppError::Validation(_))
        ));

        let unknown = DeductionRequest::new(account, dec!(1), "audit").reference("seo_audit", "p-1");
        assert!(matches!(
            engine.deduct(unknown).await,
            Err(AppError::Validation(_))
        ));

        let ok = DeductionRequest::new(account, dec!(1), "sync")
            .usage_type(UsageType::IntegrationRun)
            .reference("integration_run", "run-1")
            .metadata(json!({ "integration_id": "int-9" }));
        assert!(engine.deduct(ok).await.unwrap().is_success());
        assert_eq!(engine.get_balance(account).await.unwrap(), dec!(4));
    }

    #[tokio::test]
    async fn test_unknown_account_reads_zero_without_creating() {
        let (store, engine) = engine().await;
        let account = Uuid::new_v4();

        assert_eq!(engine.get_balance(account).await.unwrap(), Decimal::ZERO);
        assert!(store.find_balance(account).await.unwrap().is_none());

        let summary = engine.get_balance_summary(account).await.unwrap();
        assert_eq!(summary.total_used, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_unavailable() {
        let (store, engine) = engine().await;
        store.set_unavailable(true);

        assert!(matches!(
            engine.get_balance(Uuid::new_v4()).await,
            Err(AppError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_deduct_for_service_prices_through_catalog() {
        let (store, engine) = engine().await;
        let account = funded_account(&engine, dec!(1)).await;

        let receipt = engine
            .deduct_for_service(account, "integration_run", dec!(3), "nightly sync")
            .await
            .unwrap()
            .into_receipt()
            .unwrap();

        assert_eq!(receipt.credits_deducted, dec!(0.3000));
        let usage = store.find_usage(receipt.usage_id).await.unwrap().unwrap();
        assert_eq!(usage.usage_type, UsageType::IntegrationRun);

        assert!(matches!(
            engine.deduct_for_service(account, "unknown", dec!(1), "x").await,
            Err(AppError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_invariant_holds_after_mixed_operations() {
        let (store, engine) = engine().await;
        let account = funded_account(&engine, dec!(10)).await;

        engine
            .deduct(DeductionRequest::new(account, dec!(3.3333), "a"))
            .await
            .unwrap();
        engine
            .deduct(DeductionRequest::new(account, dec!(20), "too much"))
            .await
            .unwrap();
        engine.award(account, dec!(0.5), "goodwill").await.unwrap();

        let balance = store.find_balance(account).await.unwrap().unwrap();
        assert!(balance.is_consistent());
        assert_eq!(balance.balance, dec!(7.1667));
    }

    #[tokio::test]
    async fn test_concurrent_deductions_never_overdraw() {
        let (store, engine) = engine().await;
        let engine = Arc::new(engine);
        let account = funded_account(&engine, dec!(5)).await;

        let mut tasks = JoinSet::new();
        for i in 0..20 {
            let engine = engine.clone();
            tasks.spawn(async move {
                engine
                    .deduct(DeductionRequest::new(account, dec!(1.00), format!("job {}", i)))
                    .await
                    .unwrap()
            });
        }

        let mut succeeded = 0;
        while let Some(outcome) = tasks.join_next().await {
            if outcome.unwrap().is_success() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(engine.get_balance(account).await.unwrap(), Decimal::ZERO);
        assert_eq!(store.usage_count(), 5);
    }

    #[tokio::test]
    async fn test_usage_history_and_stats() {
        let (_, engine) = engine().await;
        let account = funded_account(&engine, dec!(10)).await;

        for _ in 0..3 {
            engine
                .deduct_for_service(account, "custom_domain", dec!(1), "domain day")
                .await
                .unwrap();
        }
        engine
            .deduct_for_service(account, "published_store", dec!(1), "store day")
            .await
            .unwrap();

        let filter = UsageFilter {
            usage_type: Some(UsageType::CustomDomain),
            ..Default::default()
        };
        let page = engine
            .usage_history(account, &filter, &Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);

        let stats = engine.usage_stats(account, None, None).await.unwrap();
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.total_credits, dec!(2.5000));
        assert_eq!(stats.by_type.len(), 2);
    }

    #[tokio::test]
    async fn test_daily_charge_key_reported_as_already_charged() {
        let (_, engine) = engine().await;
        let account = funded_account(&engine, dec!(5)).await;
        let entity = Uuid::new_v4();
        let key = DailyChargeKey::new(
            entity,
            EntityKind::Store,
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        );

        let first = DeductionRequest::new(account, dec!(1), "store day")
            .entity(entity)
            .daily_charge(key);
        assert!(engine.deduct(first.clone()).await.unwrap().is_success());
        assert!(matches!(
            engine.deduct(first).await.unwrap(),
            DeductionOutcome::AlreadyCharged { .. }
        ));
        assert_eq!(engine.get_balance(account).await.unwrap(), dec!(4));
    }
}
