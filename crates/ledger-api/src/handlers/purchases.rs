//! Purchase handlers
//!
//! Driven by the payment webhook relay. Completion is safe to retry.

use crate::auth::ServiceCaller;
use crate::dto::{ApiResponse, PurchaseCompleteRequest, PurchaseCreateRequest, PurchaseFailRequest};
use crate::state::LedgerServices;
use actix_web::{web, HttpResponse};
use ledger_core::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// POST /api/v1/purchases
#[instrument(skip(services, _caller, req))]
pub async fn create_purchase(
    services: web::Data<LedgerServices>,
    _caller: ServiceCaller,
    req: web::Json<PurchaseCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let transaction = services
        .purchases
        .create_purchase(req.account_id, req.amount_usd, req.credits_amount, req.metadata)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(transaction)))
}

/// GET /api/v1/purchases/{id}
#[instrument(skip(services, _caller))]
pub async fn get_purchase(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let transaction = services.purchases.get_transaction(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(transaction)))
}

/// POST /api/v1/purchases/{id}/complete
///
/// A repeated completion answers 200 without crediting again.
#[instrument(skip(services, _caller, req))]
pub async fn complete_purchase(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    _caller: ServiceCaller,
    req: Option<web::Json<PurchaseCompleteRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(|r| r.into_inner()).unwrap_or_default();
    req.validate().map_err(|e| {
        warn!("Purchase completion validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let transaction_id = path.into_inner();
    let completion = services
        .purchases
        .complete_purchase(transaction_id, req.external_ref.as_deref())
        .await?;

    let message = if completion.newly_completed {
        "Purchase completed"
    } else {
        info!(transaction_id = %transaction_id, "Purchase already completed");
        "Purchase already completed"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(completion, message)))
}

/// POST /api/v1/purchases/{id}/fail
#[instrument(skip(services, _caller, req))]
pub async fn fail_purchase(
    services: web::Data<LedgerServices>,
    path: web::Path<Uuid>,
    _caller: ServiceCaller,
    req: web::Json<PurchaseFailRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Purchase failure validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let transaction = services
        .purchases
        .fail_purchase(path.into_inner(), &req.reason)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(transaction, "Purchase marked failed")))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/purchases")
            .route("", web::post().to(create_purchase))
            .route("/{id}", web::get().to(get_purchase))
            .route("/{id}/complete", web::post().to(complete_purchase))
            .route("/{id}/fail", web::post().to(fail_purchase)),
    );
}
