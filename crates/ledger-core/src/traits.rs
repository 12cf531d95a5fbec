//! Storage and collaborator traits
//!
//! Services depend on these abstractions only. `ledger-db` provides the
//! PostgreSQL implementations and an in-memory store for tests.

use crate::error::AppError;
use crate::models::{
    AuditLogData, BillableEntity, CreditBalance, CreditGrant, CreditReceipt, CreditTransaction,
    DailyCharge, DebitOutcome, NewServiceRate, PurchaseTransition, ServiceRate, UsageDebit,
    UsageFilter, UsageRecord, UsageTypeTotal,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Durable per-account balance
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance row, `None` for an account without history
    async fn find_balance(&self, account_id: Uuid) -> Result<Option<CreditBalance>, AppError>;

    /// Conditionally decrement the balance and append the usage record.
    ///
    /// Both happen in one transaction. When `debit.daily_charge` is set the
    /// uptime log row is inserted in the same transaction and an existing row
    /// for the key aborts the whole debit.
    async fn apply_debit(&self, debit: &UsageDebit) -> Result<DebitOutcome, AppError>;

    /// Unconditionally increase the balance and insert a completed transaction
    async fn apply_credit(&self, grant: &CreditGrant) -> Result<CreditReceipt, AppError>;
}

/// Append-only record of deductions
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Find a usage record by id
    async fn find_usage(&self, id: Uuid) -> Result<Option<UsageRecord>, AppError>;

    /// List usage for an account, newest first, with total count
    async fn list_usage(
        &self,
        account_id: Uuid,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UsageRecord>, i64), AppError>;

    /// Totals per usage type in the given range
    async fn usage_stats(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageTypeTotal>, AppError>;
}

/// Purchase and bonus transactions
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Insert a pending purchase
    async fn create_pending(&self, tx: &CreditTransaction) -> Result<CreditTransaction, AppError>;

    /// Find a transaction by id
    async fn find_transaction(&self, id: Uuid) -> Result<Option<CreditTransaction>, AppError>;

    /// Flip pending to completed and add the credits in one transaction.
    ///
    /// Returns `None` when the transaction does not exist.
    async fn complete(
        &self,
        id: Uuid,
        external_ref: Option<&str>,
    ) -> Result<Option<PurchaseTransition>, AppError>;

    /// Flip pending to failed. Returns `None` when the transaction does not exist.
    async fn fail(&self, id: Uuid, reason: &str) -> Result<Option<PurchaseTransition>, AppError>;

    /// List transactions for an account, newest first, with total count
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CreditTransaction>, i64), AppError>;
}

/// Service rate repository
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Find rate by service key, active or not
    async fn find_by_key(&self, service_key: &str) -> Result<Option<ServiceRate>, AppError>;

    /// List rates ordered by key
    async fn list(&self, include_inactive: bool) -> Result<Vec<ServiceRate>, AppError>;

    /// Insert a rate; a duplicate key fails with `AlreadyExists`
    async fn create(&self, rate: &NewServiceRate) -> Result<ServiceRate, AppError>;

    /// Set the unit cost. Returns `None` when the key does not exist.
    async fn update_cost(
        &self,
        service_key: &str,
        cost_per_unit: Decimal,
    ) -> Result<Option<ServiceRate>, AppError>;

    /// Set the active flag. Returns `None` when the key does not exist.
    async fn set_active(
        &self,
        service_key: &str,
        is_active: bool,
    ) -> Result<Option<ServiceRate>, AppError>;
}

/// Uptime log reads (writes happen inside `BalanceStore::apply_debit`)
#[async_trait]
pub trait DailyChargeRepository: Send + Sync {
    /// Charge for an entity on a given day
    async fn find_charge(
        &self,
        entity_id: Uuid,
        charged_date: NaiveDate,
    ) -> Result<Option<DailyCharge>, AppError>;

    /// Charges for an entity, newest first
    async fn list_for_entity(
        &self,
        entity_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyCharge>, AppError>;
}

/// Directory of billable entities owned by the rest of the platform
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Stores currently published
    async fn published_stores(&self) -> Result<Vec<BillableEntity>, AppError>;

    /// Custom domains that are both active and verified
    async fn active_verified_domains(&self) -> Result<Vec<BillableEntity>, AppError>;

    /// Owning account of an entity, `None` when it cannot be resolved
    async fn resolve_owner(&self, entity: &BillableEntity) -> Result<Option<Uuid>, AppError>;

    /// Switch an entity off (unpublish store, deactivate domain)
    async fn deactivate(&self, entity: &BillableEntity, reason: &str) -> Result<(), AppError>;
}

/// Audit log sink
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Persist an audit entry
    async fn record(&self, entry: AuditLogData) -> Result<(), AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 10);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 2000).per_page, 1000);
    }

    #[test]
    fn test_paginated_response_meta() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 21, &Pagination::new(2, 10));
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.data.len(), 3);
    }
}
