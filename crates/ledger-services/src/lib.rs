//! Business logic services for the credit ledger
//!
//! # Architecture
//!
//! Services are constructed once at startup with their storage injected as
//! `Arc<dyn Trait>`, then shared behind `Arc` by the HTTP layer and the
//! billing timer. Nothing here holds an in-process lock: balance safety comes
//! from the conditional debit implemented by the `BalanceStore`.
//!
//! # Services
//!
//! - `RateCatalog` - per-service unit costs, read through on every lookup
//! - `ReferenceRegistry` - reference types a deduction may point at
//! - `DeductionEngine` - validated atomic deductions, awards, and usage reporting
//! - `PurchaseLedger` - pending/completed/failed purchase lifecycle and bonuses
//! - `FleetBillingScheduler` - once-per-day charging of stores and custom domains

pub mod deduction;
pub mod fleet;
pub mod purchases;
pub mod rate_catalog;
pub mod references;

pub use deduction::{DeductionEngine, DeductionOutcome, DeductionReceipt, DeductionRequest, UsageStats};
pub use fleet::{
    BillingRunSummary, ClassSummary, EntityBillingResult, EntityBillingStatus, EntityError,
    FleetBillingScheduler,
};
pub use purchases::{PurchaseCompletion, PurchaseLedger};
pub use rate_catalog::RateCatalog;
pub use references::ReferenceRegistry;

/// Business logic constants
pub mod constants {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Rate key for published store hosting
    pub const PUBLISHED_STORE_KEY: &str = "published_store";

    /// Rate key for active custom domains
    pub const CUSTOM_DOMAIN_KEY: &str = "custom_domain";

    /// Rate key for scheduled integration runs
    pub const INTEGRATION_RUN_KEY: &str = "integration_run";

    /// Default daily cost of a published store
    pub const DEFAULT_STORE_COST: Decimal = dec!(1.0000);

    /// Default daily cost of a custom domain
    pub const DEFAULT_DOMAIN_COST: Decimal = dec!(0.5000);

    /// Default cost of one integration run
    pub const DEFAULT_INTEGRATION_RUN_COST: Decimal = dec!(0.1000);

    /// Reason recorded on entities switched off for lack of funds
    pub const INSUFFICIENT_CREDITS_REASON: &str = "insufficient_credits";

    /// Reason recorded on entities skipped because their rate costs nothing
    pub const FREE_RATE_REASON: &str = "free_rate";
}
