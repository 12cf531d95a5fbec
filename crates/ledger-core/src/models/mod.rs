//! Domain models for the credit ledger
//!
//! This module contains all the core domain models used throughout the application.

pub mod audit;
pub mod balance;
pub mod charge;
pub mod entity;
pub mod rate;
pub mod transaction;
pub mod usage;

pub use audit::{AuditLog, AuditLogBuilder, AuditLogData};
pub use balance::{CreditBalance, CreditGrant, CreditReceipt};
pub use charge::{DailyCharge, DailyChargeKey};
pub use entity::{BillableEntity, EntityKind};
pub use rate::{BillingCadence, NewServiceRate, ServiceRate};
pub use transaction::{CreditTransaction, PurchaseTransition, TransactionKind, TransactionStatus};
pub use usage::{
    AppliedDebit, DebitOutcome, UsageDebit, UsageFilter, UsageRecord, UsageType, UsageTypeTotal,
};
