//! Fleet billing scheduler
//!
//! Charges every published store and every active, verified custom domain
//! once per UTC day. A run is safe to repeat: the uptime log row written in
//! the same transaction as each deduction makes the second attempt for the
//! same `(entity, day)` a no-op.
//!
//! One entity's failure never stops the run. Storage failures do, since
//! recording them per entity would read as mass attrition.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    config::BillingConfig,
    models::{BillableEntity, DailyCharge, DailyChargeKey, EntityKind},
    traits::{DailyChargeRepository, EntityDirectory},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{FREE_RATE_REASON, INSUFFICIENT_CREDITS_REASON};
use crate::deduction::{DeductionEngine, DeductionOutcome, DeductionRequest};
use crate::rate_catalog::RateCatalog;

/// What happened to one entity in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityBillingStatus {
    /// Deducted and logged
    Charged,
    /// Already charged for the day
    Skipped,
    /// Owner could not pay; entity switched off
    Deactivated,
    /// Could not be billed (unresolved owner, invalid request, ...)
    Failed,
}

/// Per-entity result
#[derive(Debug, Clone, Serialize)]
pub struct EntityBillingResult {
    pub entity_id: Uuid,
    pub kind: EntityKind,
    pub label: String,
    pub account_id: Option<Uuid>,
    pub status: EntityBillingStatus,
    pub amount: Decimal,
    pub remaining_balance: Option<Decimal>,
    pub deactivated: bool,
    pub reason: Option<String>,
}

impl EntityBillingResult {
    fn new(entity: &BillableEntity, status: EntityBillingStatus) -> Self {
        Self {
            entity_id: entity.id,
            kind: entity.kind,
            label: entity.label.clone(),
            account_id: None,
            status,
            amount: Decimal::ZERO,
            remaining_balance: None,
            deactivated: false,
            reason: None,
        }
    }
}

/// Error recorded against one entity
#[derive(Debug, Clone, Serialize)]
pub struct EntityError {
    pub entity_id: Uuid,
    pub label: String,
    pub error: String,
}

/// Counters and details for one entity class
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassSummary {
    pub processed: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deactivated: usize,
    pub errors: Vec<EntityError>,
    pub details: Vec<EntityBillingResult>,
}

impl ClassSummary {
    fn record(&mut self, result: EntityBillingResult) {
        self.processed += 1;
        match result.status {
            EntityBillingStatus::Charged => self.successful += 1,
            EntityBillingStatus::Skipped => self.skipped += 1,
            EntityBillingStatus::Deactivated => {
                self.failed += 1;
                self.deactivated += 1;
            }
            EntityBillingStatus::Failed => {
                self.failed += 1;
                self.errors.push(EntityError {
                    entity_id: result.entity_id,
                    label: result.label.clone(),
                    error: result.reason.clone().unwrap_or_default(),
                });
            }
        }
        self.details.push(result);
    }

    fn record_error(&mut self, entity: &BillableEntity, err: &AppError) {
        let mut result = EntityBillingResult::new(entity, EntityBillingStatus::Failed);
        result.reason = Some(err.to_string());
        self.record(result);
    }
}

/// Summary of one billing run
#[derive(Debug, Clone, Serialize)]
pub struct BillingRunSummary {
    pub charged_date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub stores: ClassSummary,
    pub domains: ClassSummary,
}

impl BillingRunSummary {
    pub fn total_processed(&self) -> usize {
        self.stores.processed + self.domains.processed
    }

    pub fn total_charged(&self) -> usize {
        self.stores.successful + self.domains.successful
    }

    pub fn total_skipped(&self) -> usize {
        self.stores.skipped + self.domains.skipped
    }

    pub fn total_failed(&self) -> usize {
        self.stores.failed + self.domains.failed
    }
}

/// Fleet billing scheduler
pub struct FleetBillingScheduler {
    engine: Arc<DeductionEngine>,
    rates: Arc<RateCatalog>,
    directory: Arc<dyn EntityDirectory>,
    charges: Arc<dyn DailyChargeRepository>,
    config: BillingConfig,
}

impl FleetBillingScheduler {
    pub fn new(
        engine: Arc<DeductionEngine>,
        rates: Arc<RateCatalog>,
        directory: Arc<dyn EntityDirectory>,
        charges: Arc<dyn DailyChargeRepository>,
        config: BillingConfig,
    ) -> Self {
        Self {
            engine,
            rates,
            directory,
            charges,
            config,
        }
    }

    /// Bill every entity for today's UTC date
    pub async fn run_billing_cycle(&self) -> AppResult<BillingRunSummary> {
        self.run_billing_cycle_for(Utc::now().date_naive()).await
    }

    /// Bill every entity for an explicit date
    #[instrument(skip(self))]
    pub async fn run_billing_cycle_for(&self, charged_date: NaiveDate) -> AppResult<BillingRunSummary> {
        info!("Starting fleet billing run for {}", charged_date);

        let stores = self.directory.published_stores().await?;
        let domains = self.directory.active_verified_domains().await?;

        info!(
            "Billing {} published stores and {} custom domains",
            stores.len(),
            domains.len()
        );

        let mut summary = BillingRunSummary {
            charged_date,
            timestamp: Utc::now(),
            stores: ClassSummary::default(),
            domains: ClassSummary::default(),
        };

        for entity in &stores {
            self.process(entity, charged_date, &mut summary.stores).await?;
        }
        for entity in &domains {
            self.process(entity, charged_date, &mut summary.domains).await?;
        }

        info!(
            "Billing run for {} finished: processed {}, charged {}, skipped {}, failed {}",
            charged_date,
            summary.total_processed(),
            summary.total_charged(),
            summary.total_skipped(),
            summary.total_failed()
        );

        if summary.total_processed() > 0 && summary.total_charged() + summary.total_skipped() == 0 {
            error!(
                "Billing run for {} charged none of {} entities",
                charged_date,
                summary.total_processed()
            );
            return Err(AppError::BillingRunFailed(format!(
                "none of {} billable entities could be charged for {}",
                summary.total_processed(),
                charged_date
            )));
        }

        Ok(summary)
    }

    /// Bill one entity, recording the result. Only systemic errors escape.
    async fn process(
        &self,
        entity: &BillableEntity,
        charged_date: NaiveDate,
        class: &mut ClassSummary,
    ) -> AppResult<()> {
        match self.bill_entity(entity, charged_date).await {
            Ok(result) => class.record(result),
            Err(e) if e.is_systemic() => {
                error!("Aborting billing run at {} {}: {}", entity.kind, entity.id, e);
                return Err(e);
            }
            Err(e) => {
                warn!("Failed to bill {} {}: {}", entity.kind, entity.id, e);
                class.record_error(entity, &e);
            }
        }
        Ok(())
    }

    /// Bill a single entity for a date
    #[instrument(skip(self, entity), fields(entity_id = %entity.id, kind = %entity.kind))]
    pub async fn bill_entity(
        &self,
        entity: &BillableEntity,
        charged_date: NaiveDate,
    ) -> AppResult<EntityBillingResult> {
        let account_id = self
            .directory
            .resolve_owner(entity)
            .await?
            .ok_or_else(|| AppError::EntityNotFound(format!("owner of {} {}", entity.kind, entity.id)))?;

        let mut result = EntityBillingResult::new(entity, EntityBillingStatus::Charged);
        result.account_id = Some(account_id);

        if self.charges.find_charge(entity.id, charged_date).await?.is_some() {
            debug!("{} {} already charged for {}", entity.kind, entity.id, charged_date);
            result.status = EntityBillingStatus::Skipped;
            result.reason = Some("already_charged".to_string());
            return Ok(result);
        }

        let cost = self.period_cost(entity.kind).await?;
        result.amount = cost;

        // A zero rate is a free tier, not a charge
        if cost.is_zero() {
            debug!("{} {} is free for {}", entity.kind, entity.id, charged_date);
            result.status = EntityBillingStatus::Skipped;
            result.reason = Some(FREE_RATE_REASON.to_string());
            return Ok(result);
        }

        let request = self.charge_request(entity, account_id, cost, charged_date);

        match self.engine.deduct(request).await? {
            DeductionOutcome::Success(receipt) => {
                result.remaining_balance = Some(receipt.remaining_balance);
            }
            DeductionOutcome::AlreadyCharged { .. } => {
                result.status = EntityBillingStatus::Skipped;
                result.reason = Some("already_charged".to_string());
            }
            DeductionOutcome::InsufficientCredits {
                required,
                available,
            } => {
                self.directory
                    .deactivate(entity, INSUFFICIENT_CREDITS_REASON)
                    .await?;

                info!(
                    "Deactivated {} {} for account {}: required {}, available {}",
                    entity.kind, entity.id, account_id, required, available
                );

                result.status = EntityBillingStatus::Deactivated;
                result.deactivated = true;
                result.remaining_balance = Some(available);
                result.reason = Some(format!(
                    "{}: required {}, available {}",
                    INSUFFICIENT_CREDITS_REASON, required, available
                ));
            }
        }

        Ok(result)
    }

    /// Uptime log history of one entity
    pub async fn charge_history(
        &self,
        entity_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<DailyCharge>> {
        self.charges.list_for_entity(entity_id, from, to).await
    }

    /// Daily cost for an entity class, falling back to the configured default
    async fn period_cost(&self, kind: EntityKind) -> AppResult<Decimal> {
        let (service_key, fallback) = match kind {
            EntityKind::Store => (&self.config.store_service_key, self.config.store_fallback_cost),
            EntityKind::CustomDomain => (
                &self.config.domain_service_key,
                self.config.domain_fallback_cost,
            ),
        };

        match self.rates.get_cost_by_key(service_key).await {
            Ok(cost) => Ok(cost),
            Err(e) if e.is_systemic() => Err(e),
            Err(e) => {
                warn!(
                    "Rate lookup for {} failed ({}), using fallback cost {}",
                    service_key, e, fallback
                );
                Ok(fallback)
            }
        }
    }

    fn charge_request(
        &self,
        entity: &BillableEntity,
        account_id: Uuid,
        cost: Decimal,
        charged_date: NaiveDate,
    ) -> DeductionRequest {
        let (description, metadata) = match entity.kind {
            EntityKind::Store => (
                format!("Daily hosting for store {} ({})", entity.label, charged_date),
                json!({ "store_id": entity.id, "charged_date": charged_date }),
            ),
            EntityKind::CustomDomain => (
                format!("Daily charge for domain {} ({})", entity.label, charged_date),
                json!({
                    "domain_id": entity.id,
                    "domain": entity.label,
                    "store_id": entity.store_id,
                    "charged_date": charged_date,
                }),
            ),
        };

        DeductionRequest::new(account_id, cost, description)
            .usage_type(entity.kind.usage_type())
            .entity(entity.id)
            .reference(entity.kind.as_str(), entity.id.to_string())
            .metadata(metadata)
            .daily_charge(DailyChargeKey::new(entity.id, entity.kind, charged_date))
    }

    /// Run the billing cycle on a fixed interval until the task is aborted.
    ///
    /// A failed run is logged and the timer keeps going.
    pub fn spawn_timer(self: Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.run_billing_cycle().await {
                    Ok(summary) => info!(
                        "Scheduled billing run: charged {}, skipped {}, failed {}",
                        summary.total_charged(),
                        summary.total_skipped(),
                        summary.total_failed()
                    ),
                    Err(e) => error!("Scheduled billing run failed: {}", e),
                }
            }
        })
    }
}
