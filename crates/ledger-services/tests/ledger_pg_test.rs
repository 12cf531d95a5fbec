//! End-to-end ledger tests against PostgreSQL
//!
//! Run with `DATABASE_URL` pointing at a disposable database:
//! `cargo test -p ledger-services --test ledger_pg_test -- --ignored`

use chrono::NaiveDate;
use ledger_core::config::{BillingConfig, DatabaseConfig};
use ledger_core::models::{DailyChargeKey, EntityKind};
use ledger_core::traits::BalanceStore;
use ledger_db::{
    create_pool, run_migrations, PgAuditLogRepository, PgBalanceStore, PgDailyChargeRepository,
    PgEntityDirectory, PgPool, PgPurchaseStore, PgRateRepository, PgUsageLedger,
};
use ledger_services::{
    DeductionEngine, DeductionOutcome, DeductionRequest, FleetBillingScheduler, PurchaseLedger,
    RateCatalog, ReferenceRegistry,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

struct Services {
    pool: PgPool,
    engine: Arc<DeductionEngine>,
    purchases: PurchaseLedger,
    scheduler: FleetBillingScheduler,
}

async fn services() -> Services {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/credit_ledger".to_string());
    let pool = create_pool(&DatabaseConfig {
        url,
        max_connections: 25,
        min_connections: 1,
        acquire_timeout_secs: 5,
        idle_timeout_secs: 60,
        run_migrations: true,
    })
    .await
    .unwrap();
    run_migrations(&pool).await.unwrap();

    let balances = Arc::new(PgBalanceStore::new(pool.clone()));
    let rates = Arc::new(RateCatalog::new(
        Arc::new(PgRateRepository::new(pool.clone())),
        Arc::new(PgAuditLogRepository::new(pool.clone())),
    ));
    rates.seed_defaults().await.unwrap();

    let engine = Arc::new(DeductionEngine::new(
        balances.clone(),
        Arc::new(PgUsageLedger::new(pool.clone())),
        rates.clone(),
        Arc::new(ReferenceRegistry::with_builtins()),
    ));
    let purchases = PurchaseLedger::new(Arc::new(PgPurchaseStore::new(pool.clone())), balances);
    let scheduler = FleetBillingScheduler::new(
        engine.clone(),
        rates,
        Arc::new(PgEntityDirectory::new(pool.clone())),
        Arc::new(PgDailyChargeRepository::new(pool.clone())),
        BillingConfig::default(),
    );

    Services {
        pool,
        engine,
        purchases,
        scheduler,
    }
}

async fn funded_account(s: &Services, credits: Decimal) -> Uuid {
    let account = Uuid::new_v4();
    s.engine.award(account, credits, "test funding").await.unwrap();
    account
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_deductions_never_overdraw() {
    let s = services().await;
    let account = funded_account(&s, dec!(5.00)).await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let engine = s.engine.clone();
        tasks.spawn(async move {
            engine
                .deduct(DeductionRequest::new(account, dec!(1.00), format!("burst {}", i)))
                .await
                .unwrap()
        });
    }

    let mut succeeded = 0;
    while let Some(outcome) = tasks.join_next().await {
        if outcome.unwrap().is_success() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    let balance = s.engine.get_balance_summary(account).await.unwrap();
    assert_eq!(balance.balance, Decimal::ZERO);
    assert!(balance.is_consistent());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_daily_charge_key_applies_once() {
    let s = services().await;
    let account = funded_account(&s, dec!(3.00)).await;
    let entity = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
    let key = DailyChargeKey::new(entity, EntityKind::Store, day);

    let request = DeductionRequest::new(account, dec!(1.00), "Store hosting")
        .entity(entity)
        .daily_charge(key);

    assert!(s.engine.deduct(request.clone()).await.unwrap().is_success());
    assert!(matches!(
        s.engine.deduct(request).await.unwrap(),
        DeductionOutcome::AlreadyCharged { .. }
    ));
    assert_eq!(s.engine.get_balance(account).await.unwrap(), dec!(2.00));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_charged_key_reported_before_empty_balance() {
    let s = services().await;
    let account = funded_account(&s, dec!(1.00)).await;
    let entity = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
    let key = DailyChargeKey::new(entity, EntityKind::Store, day);

    let request = DeductionRequest::new(account, dec!(1.00), "Store hosting")
        .entity(entity)
        .daily_charge(key);

    assert!(s.engine.deduct(request.clone()).await.unwrap().is_success());
    assert_eq!(s.engine.get_balance(account).await.unwrap(), Decimal::ZERO);

    assert!(matches!(
        s.engine.deduct(request).await.unwrap(),
        DeductionOutcome::AlreadyCharged { entity_id, charged_date }
            if entity_id == entity && charged_date == day
    ));

    let charges = s.scheduler.charge_history(entity, None, None).await.unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].balance_before, dec!(1.00));
    assert_eq!(charges[0].balance_after, Decimal::ZERO);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_insufficient_debit_releases_daily_charge_key() {
    let s = services().await;
    let account = funded_account(&s, dec!(0.50)).await;
    let entity = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
    let key = DailyChargeKey::new(entity, EntityKind::Store, day);

    let request = DeductionRequest::new(account, dec!(1.00), "Store hosting")
        .entity(entity)
        .daily_charge(key);

    assert!(matches!(
        s.engine.deduct(request.clone()).await.unwrap(),
        DeductionOutcome::InsufficientCredits { .. }
    ));
    assert!(s
        .scheduler
        .charge_history(entity, None, None)
        .await
        .unwrap()
        .is_empty());

    s.engine.award(account, dec!(1.00), "top up").await.unwrap();
    assert!(s.engine.deduct(request).await.unwrap().is_success());
    assert_eq!(s.engine.get_balance(account).await.unwrap(), dec!(0.50));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_purchase_completion_credits_once() {
    let s = services().await;
    let account = Uuid::new_v4();

    let pending = s
        .purchases
        .create_purchase(account, dec!(10.00), dec!(100), None)
        .await
        .unwrap();

    let first = s
        .purchases
        .complete_purchase(pending.id, Some("pi_test"))
        .await
        .unwrap();
    let second = s
        .purchases
        .complete_purchase(pending.id, Some("pi_test"))
        .await
        .unwrap();

    assert!(first.newly_completed);
    assert!(!second.newly_completed);
    assert_eq!(s.engine.get_balance(account).await.unwrap(), dec!(100));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_billing_run_is_idempotent_per_day() {
    let s = services().await;
    let owner = funded_account(&s, dec!(2.00)).await;
    let store_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO stores (id, owner_account_id, name, is_published) VALUES ($1, $2, $3, TRUE)",
    )
    .bind(store_id)
    .bind(owner)
    .bind("Integration Store")
    .execute(&s.pool)
    .await
    .unwrap();

    let day = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

    s.scheduler.run_billing_cycle_for(day).await.unwrap();
    s.scheduler.run_billing_cycle_for(day).await.unwrap();

    let charges = s.scheduler.charge_history(store_id, None, None).await.unwrap();
    assert_eq!(charges.len(), 1);

    let balance = PgBalanceStore::new(s.pool.clone())
        .find_balance(owner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, dec!(1.00));

    sqlx::query("UPDATE stores SET is_published = FALSE WHERE id = $1")
        .bind(store_id)
        .execute(&s.pool)
        .await
        .unwrap();
}

