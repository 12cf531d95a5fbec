//! Fleet billing handlers

use crate::auth::ServiceCaller;
use crate::dto::{ApiResponse, BillingRunRequest, ChargeHistoryParams};
use crate::state::LedgerServices;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use ledger_core::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Run the daily billing job, normally called by external cron
///
/// POST /api/v1/billing/run?date=YYYY-MM-DD
///
/// A date that does not parse is rejected with 400.
#[instrument(skip(services, caller, query))]
pub async fn run_billing(
    services: web::Data<LedgerServices>,
    caller: ServiceCaller,
    query: web::Query<BillingRunRequest>,
) -> Result<HttpResponse, AppError> {
    let charged_date = query
        .into_inner()
        .date
        .unwrap_or_else(|| Utc::now().date_naive());

    info!(date = %charged_date, caller = %caller.name, "Billing run requested");

    let summary = services.scheduler.run_billing_cycle_for(charged_date).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(summary)))
}

/// Uptime log of one entity
///
/// GET /api/v1/entities/{id}/charges
#[instrument(skip(services, _caller))]
pub async fn charge_history(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    query: web::Query<ChargeHistoryParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let charges = services
        .scheduler
        .charge_history(path.into_inner(), query.from, query.to)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(charges)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/billing/run", web::post().to(run_billing))
        .route("/entities/{id}/charges", web::get().to(charge_history));
}
