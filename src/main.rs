//! Credit ledger server
//!
//! Serves the ledger HTTP API and, when enabled, runs the daily fleet
//! billing job on an in-process timer.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use ledger_api::{configure, LedgerServices, ServiceAuth};
use ledger_core::config::AppConfig;
use ledger_db::{
    create_pool, run_migrations, PgAuditLogRepository, PgBalanceStore, PgDailyChargeRepository,
    PgEntityDirectory, PgPurchaseStore, PgRateRepository, PgUsageLedger,
};
use ledger_services::{
    DeductionEngine, FleetBillingScheduler, PurchaseLedger, RateCatalog, ReferenceRegistry,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ledger_billing={0},ledger_api={0},ledger_services={0},ledger_db={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting credit ledger v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;

    if !config.auth.is_configured() {
        anyhow::bail!("auth.service_token must be set to a non-placeholder value");
    }

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let balances = Arc::new(PgBalanceStore::new(pool.clone()));
    let usage = Arc::new(PgUsageLedger::new(pool.clone()));
    let purchase_store = Arc::new(PgPurchaseStore::new(pool.clone()));
    let rate_repo = Arc::new(PgRateRepository::new(pool.clone()));
    let charges = Arc::new(PgDailyChargeRepository::new(pool.clone()));
    let directory = Arc::new(PgEntityDirectory::new(pool.clone()));
    let audit = Arc::new(PgAuditLogRepository::new(pool.clone()));

    let rates = Arc::new(RateCatalog::new(rate_repo, audit));
    if config.billing.seed_rates {
        let seeded = rates
            .seed_defaults()
            .await
            .context("failed to seed default rates")?;
        if seeded > 0 {
            info!("Seeded {} default rates", seeded);
        }
    }

    let engine = Arc::new(DeductionEngine::new(
        balances.clone(),
        usage,
        rates.clone(),
        Arc::new(ReferenceRegistry::with_builtins()),
    ));
    let purchases = Arc::new(PurchaseLedger::new(purchase_store, balances));
    let scheduler = Arc::new(FleetBillingScheduler::new(
        engine.clone(),
        rates.clone(),
        directory,
        charges,
        config.billing.clone(),
    ));

    if config.scheduler.enabled {
        let _timer = scheduler.clone().spawn_timer(config.scheduler.interval_secs);
        info!(
            "Fleet billing timer enabled every {}s",
            config.scheduler.interval_secs
        );
    } else {
        warn!("Fleet billing timer disabled; expecting external cron on POST /api/v1/billing/run");
    }

    let services = LedgerServices {
        engine,
        rates,
        purchases,
        scheduler,
    };
    let auth = ServiceAuth::new(config.auth.service_token.clone());
    let cors_origins = config.server.cors_origin_list();

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    HttpServer::new(move || {
        let origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|o| origins.iter().any(|allowed| allowed == o))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .allowed_header("x-service-token")
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(services.clone()))
            .app_data(web::Data::new(auth.clone()))
            .app_data(web::JsonConfig::default().limit(256 * 1024))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure)
    })
    .workers(config.server.workers)
    .client_request_timeout(Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
