//! Billable entity model
//!
//! Stores and custom domains live outside the ledger. The ledger only
//! needs their identity, owner, and the ability to switch them off.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::usage::UsageType;

/// Class of a billable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Published store
    Store,
    /// Active and verified custom domain
    CustomDomain,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Store => "store",
            EntityKind::CustomDomain => "custom_domain",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "store" => Some(EntityKind::Store),
            "custom_domain" => Some(EntityKind::CustomDomain),
            _ => None,
        }
    }

    /// Usage type recorded for the daily charge of this class
    pub fn usage_type(&self) -> UsageType {
        match self {
            EntityKind::Store => UsageType::StoreHosting,
            EntityKind::CustomDomain => UsageType::CustomDomain,
        }
    }
}

/// An entity the fleet job charges once per day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillableEntity {
    /// Entity identifier
    pub id: Uuid,

    /// Store or custom domain
    pub kind: EntityKind,

    /// Display label (store name or domain)
    pub label: String,

    /// Store a custom domain is attached to
    pub store_id: Option<Uuid>,
}

impl BillableEntity {
    pub fn store(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: EntityKind::Store,
            label: name.into(),
            store_id: None,
        }
    }

    pub fn custom_domain(id: Uuid, domain: impl Into<String>, store_id: Uuid) -> Self {
        Self {
            id,
            kind: EntityKind::CustomDomain,
            label: domain.into(),
            store_id: Some(store_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_to_usage_type() {
        assert_eq!(EntityKind::Store.usage_type(), UsageType::StoreHosting);
        assert_eq!(EntityKind::CustomDomain.usage_type(), UsageType::CustomDomain);
        assert_eq!(EntityKind::from_str("CUSTOM_DOMAIN"), Some(EntityKind::CustomDomain));
        assert_eq!(EntityKind::from_str("page"), None);
    }
}
