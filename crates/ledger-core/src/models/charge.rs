//! Daily charge (uptime log) model
//!
//! One row per billed entity per calendar day. The unique
//! `(entity_id, charged_date)` key is what keeps the fleet job from
//! charging the same entity twice for the same period.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EntityKind;

/// Identity of a periodic charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DailyChargeKey {
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    pub charged_date: NaiveDate,
}

impl DailyChargeKey {
    pub fn new(entity_id: Uuid, entity_kind: EntityKind, charged_date: NaiveDate) -> Self {
        Self {
            entity_id,
            entity_kind,
            charged_date,
        }
    }
}

/// A committed daily charge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCharge {
    /// Unique identifier
    pub id: Uuid,

    /// Billed entity
    pub entity_id: Uuid,

    /// Store or custom domain
    pub entity_kind: EntityKind,

    /// Account that paid
    pub account_id: Uuid,

    /// Billing day (UTC)
    pub charged_date: NaiveDate,

    /// Credits charged
    pub amount: Decimal,

    /// Balance before the charge
    pub balance_before: Decimal,

    /// Balance after the charge
    pub balance_after: Decimal,

    /// Usage record written with this charge
    pub usage_id: Uuid,

    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

impl DailyCharge {
    /// Key this charge occupies in the log
    pub fn key(&self) -> DailyChargeKey {
        DailyChargeKey::new(self.entity_id, self.entity_kind, self.charged_date)
    }
}
