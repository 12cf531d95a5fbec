//! Usage record model
//!
//! Every successful deduction appends exactly one immutable usage record.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::charge::DailyChargeKey;

/// What kind of consumption a deduction pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Daily hosting charge for a published store
    StoreHosting,
    /// Daily charge for an active custom domain
    CustomDomain,
    /// Scheduled integration run
    IntegrationRun,
    /// Any other feature billed through the engine
    #[default]
    Feature,
    /// Operator-initiated deduction
    Manual,
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UsageType {
    /// Stable tag stored in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::StoreHosting => "store_hosting",
            UsageType::CustomDomain => "custom_domain",
            UsageType::IntegrationRun => "integration_run",
            UsageType::Feature => "feature",
            UsageType::Manual => "manual",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "store_hosting" => Some(UsageType::StoreHosting),
            "custom_domain" => Some(UsageType::CustomDomain),
            "integration_run" => Some(UsageType::IntegrationRun),
            "feature" => Some(UsageType::Feature),
            "manual" => Some(UsageType::Manual),
            _ => None,
        }
    }
}

/// Immutable record of one deduction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Account that was charged
    pub account_id: Uuid,

    /// Billed entity (store, domain, ...) if any
    pub entity_id: Option<Uuid>,

    /// Credits deducted
    pub credits_used: Decimal,

    /// Usage category
    pub usage_type: UsageType,

    /// Human-readable description
    pub description: String,

    /// Polymorphic pointer at whatever triggered the charge
    pub reference_id: Option<String>,

    /// Type tag for `reference_id`
    pub reference_type: Option<String>,

    /// Free-form metadata
    pub metadata: Option<JsonValue>,

    /// Balance right after this deduction
    pub balance_after: Decimal,

    /// When the deduction was committed
    pub created_at: DateTime<Utc>,
}

/// A deduction ready to be applied by a `BalanceStore`
#[derive(Debug, Clone)]
pub struct UsageDebit {
    pub usage_id: Uuid,
    pub account_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub amount: Decimal,
    pub usage_type: UsageType,
    pub description: String,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub metadata: Option<JsonValue>,
    /// When set, the store writes the uptime log row in the same transaction
    /// and refuses the debit if the row already exists.
    pub daily_charge: Option<DailyChargeKey>,
}

impl UsageDebit {
    /// Build the usage record this debit produces
    pub fn to_record(&self, balance_after: Decimal, created_at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            id: self.usage_id,
            account_id: self.account_id,
            entity_id: self.entity_id,
            credits_used: self.amount,
            usage_type: self.usage_type,
            description: self.description.clone(),
            reference_id: self.reference_id.clone(),
            reference_type: self.reference_type.clone(),
            metadata: self.metadata.clone(),
            balance_after,
            created_at,
        }
    }
}

/// A debit that was committed
#[derive(Debug, Clone, Serialize)]
pub struct AppliedDebit {
    pub usage: UsageRecord,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

/// Storage-level result of a conditional debit
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    /// Balance decremented, usage appended (and uptime row written if keyed)
    Applied(AppliedDebit),
    /// Balance did not cover the amount; nothing changed
    Insufficient { required: Decimal, available: Decimal },
    /// The uptime log already holds a row for this entity and date; nothing changed
    AlreadyCharged {
        entity_id: Uuid,
        charged_date: NaiveDate,
    },
}

/// Filters for usage history queries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub usage_type: Option<UsageType>,
}

impl UsageFilter {
    /// Whether a record passes this filter
    pub fn matches(&self, record: &UsageRecord) -> bool {
        self.from.map_or(true, |from| record.created_at >= from)
            && self.to.map_or(true, |to| record.created_at <= to)
            && self.usage_type.map_or(true, |t| record.usage_type == t)
    }
}

/// Aggregated usage for one usage type
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageTypeTotal {
    pub usage_type: UsageType,
    pub count: i64,
    pub credits: Decimal,
}
