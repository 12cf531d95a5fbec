//! Shared service handles
//!
//! Built once at startup and registered as `web::Data<LedgerServices>`.

use ledger_services::{DeductionEngine, FleetBillingScheduler, PurchaseLedger, RateCatalog};
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerServices {
    pub engine: Arc<DeductionEngine>,
    pub rates: Arc<RateCatalog>,
    pub purchases: Arc<PurchaseLedger>,
    pub scheduler: Arc<FleetBillingScheduler>,
}
