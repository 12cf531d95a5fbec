//! Account handlers
//!
//! Balance, deductions, usage reporting, bonuses, and transaction history.

use crate::auth::ServiceCaller;
use crate::dto::{
    ApiResponse, BalanceResponse, BonusRequest, DeductionCreateRequest, PaginationParams,
    UsageQueryParams, UsageStatsParams,
};
use crate::state::LedgerServices;
use actix_web::{web, HttpResponse};
use ledger_core::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Balance with running totals
///
/// GET /api/v1/accounts/{id}/balance
#[instrument(skip(services, _caller))]
pub async fn get_balance(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let account_id = path.into_inner();
    let summary = services.engine.get_balance_summary(account_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse::from(summary))))
}

/// Deduct credits for a feature
///
/// POST /api/v1/accounts/{id}/deductions
///
/// Responds 402 when the balance does not cover the amount.
#[instrument(skip(services, caller, req))]
pub async fn create_deduction(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    caller: ServiceCaller,
    req: web::Json<DeductionCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Deduction validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let account_id = path.into_inner();
    let request = req.into_inner().into_request(account_id)?;

    debug!(
        account_id = %account_id,
        amount = %request.amount,
        caller = %caller.name,
        "Deducting credits"
    );

    let receipt = services.engine.deduct(request).await?.into_receipt()?;

    info!(
        account_id = %account_id,
        usage_id = %receipt.usage_id,
        remaining = %receipt.remaining_balance,
        "Deduction applied"
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(receipt)))
}

/// Usage history, newest first
///
/// GET /api/v1/accounts/{id}/usage
#[instrument(skip(services, _caller))]
pub async fn list_usage(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    pagination: web::Query<PaginationParams>,
    filters: web::Query<UsageQueryParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    pagination.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let filter = filters.to_filter()?;
    let page = services
        .engine
        .usage_history(path.into_inner(), &filter, &pagination.to_pagination())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Usage totals by usage type
///
/// GET /api/v1/accounts/{id}/usage/stats
#[instrument(skip(services, _caller))]
pub async fn usage_stats(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    query: web::Query<UsageStatsParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let stats = services
        .engine
        .usage_stats(path.into_inner(), query.from, query.to)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Award bonus credits
///
/// POST /api/v1/accounts/{id}/bonuses
#[instrument(skip(services, caller, req))]
pub async fn award_bonus(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    caller: ServiceCaller,
    req: web::Json<BonusRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Bonus validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let account_id = path.into_inner();
    let req = req.into_inner();
    let receipt = services
        .purchases
        .award_bonus(account_id, req.amount, req.description)
        .await?;

    info!(
        account_id = %account_id,
        credits = %receipt.transaction.credits_amount,
        caller = %caller.name,
        "Bonus awarded"
    );

    Ok(HttpResponse::Created().json(ApiResponse::with_message(receipt, "Bonus credits awarded")))
}

/// Purchases and bonuses, newest first
///
/// GET /api/v1/accounts/{id}/transactions
#[instrument(skip(services, _caller))]
pub async fn list_transactions(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    pagination: web::Query<PaginationParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    pagination.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let page = services
        .purchases
        .list_transactions(path.into_inner(), &pagination.to_pagination())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounts")
            .route("/{id}/balance", web::get().to(get_balance))
            .route("/{id}/deductions", web::post().to(create_deduction))
            .route("/{id}/usage", web::get().to(list_usage))
            .route("/{id}/usage/stats", web::get().to(usage_stats))
            .route("/{id}/bonuses", web::post().to(award_bonus))
            .route("/{id}/transactions", web::get().to(list_transactions)),
    );
}
