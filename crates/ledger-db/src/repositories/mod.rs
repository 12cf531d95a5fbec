//! Repository implementations
//!
//! PostgreSQL implementations of the storage traits defined in ledger-core.

pub mod audit_repo;
pub mod balance_store;
pub mod charge_repo;
pub mod entity_directory;
pub mod purchase_repo;
pub mod rate_repo;
pub mod usage_repo;

pub use audit_repo::PgAuditLogRepository;
pub use balance_store::PgBalanceStore;
pub use charge_repo::PgDailyChargeRepository;
pub use entity_directory::PgEntityDirectory;
pub use purchase_repo::PgPurchaseStore;
pub use rate_repo::PgRateRepository;
pub use usage_repo::PgUsageLedger;

/// Whether a sqlx error is a unique constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
