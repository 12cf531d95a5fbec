//! Rate catalog handlers

use crate::auth::ServiceCaller;
use crate::dto::{
    ApiResponse, CostQueryParams, CostResponse, RateCostUpdateRequest, RateCreateRequest,
    RateListParams,
};
use crate::state::LedgerServices;
use actix_web::{web, HttpResponse};
use ledger_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

/// GET /api/v1/rates
#[instrument(skip(services, _caller))]
pub async fn list_rates(
    services: web::Data<LedgerServices>,
    query: web::Query<RateListParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let rates = services.rates.list_rates(query.include_inactive).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(rates)))
}

/// Active rate for a service key
///
/// GET /api/v1/rates/{key}
#[instrument(skip(services, _caller))]
pub async fn get_rate(
    services: web::Data<LedgerServices>,
    path: web::Path<String>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let rate = services.rates.get_rate(&path).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(rate)))
}

/// POST /api/v1/rates
#[instrument(skip(services, caller, req))]
pub async fn create_rate(
    services: web::Data<LedgerServices>,
    caller: ServiceCaller,
    req: web::Json<RateCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Rate creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let rate = services.rates.create_rate(req.into_inner().into()).await?;

    info!(
        service_key = %rate.service_key,
        cost = %rate.cost_per_unit,
        caller = %caller.name,
        "Rate created"
    );

    Ok(HttpResponse::Created().json(ApiResponse::with_message(rate, "Rate created")))
}

/// PUT /api/v1/rates/{key}/cost
#[instrument(skip(services, _caller, req))]
pub async fn update_cost(
    services: web::Data<LedgerServices>,
    path: web::Path<String>,
    _caller: ServiceCaller,
    req: web::Json<RateCostUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let rate = services
        .rates
        .update_cost(&path, req.cost_per_unit)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(rate, "Rate cost updated")))
}

/// POST /api/v1/rates/{key}/toggle
#[instrument(skip(services, _caller))]
pub async fn toggle_rate(
    services: web::Data<LedgerServices>,
    path: web::Path<String>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let rate = services.rates.toggle_active(&path).await?;
    let message = if rate.is_active {
        "Rate activated"
    } else {
        "Rate deactivated"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(rate, message)))
}

/// Price `units` of a service
///
/// GET /api/v1/rates/{key}/cost?units=
#[instrument(skip(services, _caller))]
pub async fn calculate_cost(
    services: web::Data<LedgerServices>,
    path: web::Path<String>,
    query: web::Query<CostQueryParams>,
    _caller: ServiceCaller,
) -> Result<HttpResponse, AppError> {
    let service_key = path.into_inner();
    let cost = services.rates.calculate_cost(&service_key, query.units).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CostResponse {
        service_key,
        units: query.units,
        cost,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/rates")
            .route("", web::get().to(list_rates))
            .route("", web::post().to(create_rate))
            .route("/{key}", web::get().to(get_rate))
            .route("/{key}/cost", web::get().to(calculate_cost))
            .route("/{key}/cost", web::put().to(update_cost))
            .route("/{key}/toggle", web::post().to(toggle_rate)),
    );
}
