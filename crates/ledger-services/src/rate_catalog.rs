//! Rate catalog service
//!
//! Per-service unit costs. Every lookup reads the repository directly, so
//! an administrator's change applies to the very next deduction.

use ledger_core::{
    models::{AuditLog, BillingCadence, NewServiceRate, ServiceRate},
    money::normalize_credits,
    traits::{AuditLogRepository, RateRepository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::constants::{
    CUSTOM_DOMAIN_KEY, DEFAULT_DOMAIN_COST, DEFAULT_INTEGRATION_RUN_COST, DEFAULT_STORE_COST,
    INTEGRATION_RUN_KEY, PUBLISHED_STORE_KEY,
};

/// Rate catalog
pub struct RateCatalog {
    rates: Arc<dyn RateRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl RateCatalog {
    pub fn new(rates: Arc<dyn RateRepository>, audit: Arc<dyn AuditLogRepository>) -> Self {
        Self { rates, audit }
    }

    /// Active rate for a service key
    #[instrument(skip(self))]
    pub async fn get_rate(&self, service_key: &str) -> AppResult<ServiceRate> {
        match self.rates.find_by_key(service_key).await? {
            Some(rate) if rate.is_active => Ok(rate),
            Some(_) => {
                debug!("Rate {} is inactive", service_key);
                Err(AppError::ServiceNotFound(service_key.to_string()))
            }
            None => Err(AppError::ServiceNotFound(service_key.to_string())),
        }
    }

    /// Unit cost of an active service
    pub async fn get_cost_by_key(&self, service_key: &str) -> AppResult<Decimal> {
        Ok(self.get_rate(service_key).await?.cost_per_unit)
    }

    /// Cost of `units` units, rounded to four decimal places
    #[instrument(skip(self))]
    pub async fn calculate_cost(&self, service_key: &str, units: Decimal) -> AppResult<Decimal> {
        if units.is_sign_negative() {
            return Err(AppError::Validation("units must not be negative".to_string()));
        }

        let rate = self.get_rate(service_key).await?;
        let cost = rate.cost_for(units);

        debug!(
            "Calculated cost {} for {} x {} at {}",
            cost, units, service_key, rate.cost_per_unit
        );

        Ok(cost)
    }

    /// All rates, optionally including inactive ones
    pub async fn list_rates(&self, include_inactive: bool) -> AppResult<Vec<ServiceRate>> {
        self.rates.list(include_inactive).await
    }

    /// Add a new rate
    #[instrument(skip(self, new_rate), fields(service_key = %new_rate.service_key))]
    pub async fn create_rate(&self, new_rate: NewServiceRate) -> AppResult<ServiceRate> {
        if new_rate.service_key.trim().is_empty() {
            return Err(AppError::Validation("service_key must not be empty".to_string()));
        }
        if new_rate.cost_per_unit.is_sign_negative() {
            return Err(AppError::Validation(
                "cost_per_unit must not be negative".to_string(),
            ));
        }

        let rate = self.rates.create(&new_rate).await?;

        info!("Created rate {} at {}", rate.service_key, rate.cost_per_unit);
        self.audit(
            "create_rate",
            &rate.service_key,
            json!({ "cost_per_unit": rate.cost_per_unit, "cadence": rate.cadence }),
        )
        .await;

        Ok(rate)
    }

    /// Change the unit cost of a service
    #[instrument(skip(self))]
    pub async fn update_cost(&self, service_key: &str, cost_per_unit: Decimal) -> AppResult<ServiceRate> {
        if cost_per_unit.is_sign_negative() {
            return Err(AppError::Validation(
                "cost_per_unit must not be negative".to_string(),
            ));
        }

        let previous = self
            .rates
            .find_by_key(service_key)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(service_key.to_string()))?;

        let rate = self
            .rates
            .update_cost(service_key, normalize_credits(cost_per_unit))
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(service_key.to_string()))?;

        info!(
            "Rate {} cost changed {} -> {}",
            service_key, previous.cost_per_unit, rate.cost_per_unit
        );
        self.audit(
            "update_cost",
            service_key,
            json!({ "old_cost": previous.cost_per_unit, "new_cost": rate.cost_per_unit }),
        )
        .await;

        Ok(rate)
    }

    /// Flip the active flag of a service
    #[instrument(skip(self))]
    pub async fn toggle_active(&self, service_key: &str) -> AppResult<ServiceRate> {
        let current = self
            .rates
            .find_by_key(service_key)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(service_key.to_string()))?;

        self.set_active(service_key, !current.is_active).await
    }

    /// Set the active flag of a service
    #[instrument(skip(self))]
    pub async fn set_active(&self, service_key: &str, is_active: bool) -> AppResult<ServiceRate> {
        let rate = self
            .rates
            .set_active(service_key, is_active)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(service_key.to_string()))?;

        info!("Rate {} active = {}", service_key, is_active);
        self.audit("set_active", service_key, json!({ "is_active": is_active }))
            .await;

        Ok(rate)
    }

    /// Insert the built-in rates that are missing. Returns how many were added.
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> AppResult<usize> {
        let defaults = [
            NewServiceRate::new(
                PUBLISHED_STORE_KEY,
                "Published store",
                DEFAULT_STORE_COST,
                BillingCadence::PerDay,
            )
            .with_description("Daily hosting for each published store"),
            NewServiceRate::new(
                CUSTOM_DOMAIN_KEY,
                "Custom domain",
                DEFAULT_DOMAIN_COST,
                BillingCadence::PerDay,
            )
            .with_description("Daily charge for each active custom domain"),
            NewServiceRate::new(
                INTEGRATION_RUN_KEY,
                "Integration run",
                DEFAULT_INTEGRATION_RUN_COST,
                BillingCadence::PerUse,
            )
            .with_description("One scheduled integration run"),
        ];

        let mut inserted = 0;
        for rate in defaults {
            if self.rates.find_by_key(&rate.service_key).await?.is_some() {
                continue;
            }
            match self.rates.create(&rate).await {
                Ok(_) => inserted += 1,
                // Lost a race with another instance seeding the same key
                Err(AppError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if inserted > 0 {
            info!("Seeded {} default rates", inserted);
        }
        Ok(inserted)
    }

    async fn audit(&self, action: &str, service_key: &str, details: JsonValue) {
        let entry = match AuditLog::builder()
            .action(action)
            .entity_type("service_rate")
            .entity_id(service_key)
            .details(details)
            .build()
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to build audit entry: {}", e);
                return;
            }
        };

        if let Err(e) = self.audit.record(entry).await {
            warn!("Failed to write audit log for {} {}: {}", action, service_key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger_core::models::AuditLogData;
    use ledger_db::MemoryLedger;
    use rust_decimal_macros::dec;

    struct FailingAudit;

    #[async_trait]
    impl AuditLogRepository for FailingAudit {
        async fn record(&self, _entry: AuditLogData) -> AppResult<()> {
            Err(AppError::Database("audit table missing".to_string()))
        }
    }

    async fn seeded_catalog() -> (Arc<MemoryLedger>, RateCatalog) {
        let store = Arc::new(MemoryLedger::new());
        let catalog = RateCatalog::new(store.clone(), store.clone());
        catalog.seed_defaults().await.unwrap();
        (store, catalog)
    }

    #[tokio::test]
    async fn test_calculate_cost_custom_domain() {
        let (_, catalog) = seeded_catalog().await;

        let cost = catalog.calculate_cost("custom_domain", dec!(1)).await.unwrap();
        assert_eq!(cost, dec!(0.5000));
        assert_eq!(cost.to_string(), "0.5000");
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_keys_not_found() {
        let (_, catalog) = seeded_catalog().await;

        assert!(matches!(
            catalog.calculate_cost("seo_audit", dec!(1)).await,
            Err(AppError::ServiceNotFound(_))
        ));

        catalog.toggle_active("integration_run").await.unwrap();
        assert!(matches!(
            catalog.get_cost_by_key("integration_run").await,
            Err(AppError::ServiceNotFound(_))
        ));

        catalog.toggle_active("integration_run").await.unwrap();
        assert_eq!(
            catalog.get_cost_by_key("integration_run").await.unwrap(),
            dec!(0.1000)
        );
    }

    #[tokio::test]
    async fn test_update_cost_applies_immediately_and_is_audited() {
        let (store, catalog) = seeded_catalog().await;

        catalog.update_cost("published_store", dec!(1.25)).await.unwrap();
        assert_eq!(
            catalog.calculate_cost("published_store", dec!(2)).await.unwrap(),
            dec!(2.5000)
        );

        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "update_cost");
        assert_eq!(audit[0].entity_id.as_deref(), Some("published_store"));
    }

    #[tokio::test]
    async fn test_negative_cost_rejected() {
        let (_, catalog) = seeded_catalog().await;
        assert!(matches!(
            catalog.update_cost("custom_domain", dec!(-0.5)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            catalog.update_cost("nope", dec!(0.5)).await,
            Err(AppError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent_and_duplicates_rejected() {
        let (_, catalog) = seeded_catalog().await;
        assert_eq!(catalog.seed_defaults().await.unwrap(), 0);
        assert_eq!(catalog.list_rates(true).await.unwrap().len(), 3);

        let duplicate = NewServiceRate::new(
            "custom_domain",
            "Again",
            dec!(1),
            BillingCadence::PerDay,
        );
        assert!(matches!(
            catalog.create_rate(duplicate).await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_update() {
        let store = Arc::new(MemoryLedger::new());
        let catalog = RateCatalog::new(store.clone(), Arc::new(FailingAudit));
        catalog.seed_defaults().await.unwrap();

        let rate = catalog.update_cost("custom_domain", dec!(0.75)).await.unwrap();
        assert_eq!(rate.cost_per_unit, dec!(0.7500));
    }
}
