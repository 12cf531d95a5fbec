//! Service rate model
//!
//! One entry per billable service. Costs are per unit of the entry's cadence.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::money::normalize_credits;

/// How often a service is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingCadence {
    PerDay,
    #[default]
    PerUse,
    PerMonth,
    PerHour,
}

impl fmt::Display for BillingCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BillingCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCadence::PerDay => "per_day",
            BillingCadence::PerUse => "per_use",
            BillingCadence::PerMonth => "per_month",
            BillingCadence::PerHour => "per_hour",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "per_day" => Some(BillingCadence::PerDay),
            "per_use" => Some(BillingCadence::PerUse),
            "per_month" => Some(BillingCadence::PerMonth),
            "per_hour" => Some(BillingCadence::PerHour),
            _ => None,
        }
    }
}

/// Rate catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRate {
    /// Unique identifier
    pub id: Uuid,

    /// Lookup key (e.g., "published_store", "custom_domain")
    pub service_key: String,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Credits per unit
    pub cost_per_unit: Decimal,

    /// Charging cadence
    pub cadence: BillingCadence,

    /// Inactive rates cannot be charged
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ServiceRate {
    /// Cost of `units` units, rounded to credit precision
    #[inline]
    pub fn cost_for(&self, units: Decimal) -> Decimal {
        normalize_credits(self.cost_per_unit * units)
    }
}

/// Data for creating a rate
#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceRate {
    pub service_key: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_per_unit: Decimal,
    pub cadence: BillingCadence,
    pub is_active: bool,
}

impl NewServiceRate {
    pub fn new(
        service_key: impl Into<String>,
        name: impl Into<String>,
        cost_per_unit: Decimal,
        cadence: BillingCadence,
    ) -> Self {
        Self {
            service_key: service_key.into(),
            name: name.into(),
            description: None,
            cost_per_unit,
            cadence,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Materialize into a stored rate
    pub fn into_rate(self, now: DateTime<Utc>) -> ServiceRate {
        ServiceRate {
            id: Uuid::now_v7(),
            service_key: self.service_key,
            name: self.name,
            description: self.description,
            cost_per_unit: normalize_credits(self.cost_per_unit),
            cadence: self.cadence,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rate(cost: Decimal) -> ServiceRate {
        NewServiceRate::new("custom_domain", "Custom domain", cost, BillingCadence::PerDay)
            .into_rate(Utc::now())
    }

    #[test]
    fn test_cost_for_units() {
        let r = rate(dec!(0.5));
        assert_eq!(r.cost_for(dec!(1)).to_string(), "0.5000");
        assert_eq!(r.cost_for(dec!(3)).to_string(), "1.5000");
    }

    #[test]
    fn test_cost_rounds_midpoint_away_from_zero() {
        let r = rate(dec!(0.33335));
        assert_eq!(r.cost_per_unit, dec!(0.3334));
        assert_eq!(rate(dec!(0.00005)).cost_for(dec!(1)), dec!(0.0001));
    }

    #[test]
    fn test_cadence_parse() {
        assert_eq!(BillingCadence::from_str("PER_DAY"), Some(BillingCadence::PerDay));
        assert_eq!(BillingCadence::from_str("weekly"), None);
    }
}
