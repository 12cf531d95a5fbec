//! Audit log model
//!
//! Records administrative actions (rate changes, manual bonuses, billing runs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    /// Unique identifier
    pub id: i64,

    /// Caller that performed the action (service name or "system")
    pub actor: String,

    /// Action performed
    pub action: String,

    /// Entity type affected (e.g., "service_rate", "account")
    pub entity_type: String,

    /// Entity ID (if applicable)
    pub entity_id: Option<String>,

    /// Additional details (JSON)
    pub details: Option<JsonValue>,

    /// IP address of the request
    pub ip_address: Option<String>,

    /// Timestamp of the action
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Create a new audit log builder
    pub fn builder() -> AuditLogBuilder {
        AuditLogBuilder::default()
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Default)]
pub struct AuditLogBuilder {
    actor: Option<String>,
    action: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    details: Option<JsonValue>,
    ip_address: Option<String>,
}

impl AuditLogBuilder {
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Build the entry data (the id and timestamp are assigned on insert)
    pub fn build(self) -> Result<AuditLogData, &'static str> {
        Ok(AuditLogData {
            actor: self.actor.unwrap_or_else(|| "system".to_string()),
            action: self.action.ok_or("action is required")?,
            entity_type: self.entity_type.ok_or("entity_type is required")?,
            entity_id: self.entity_id,
            details: self.details,
            ip_address: self.ip_address,
        })
    }
}

/// Data for creating an audit log entry
#[derive(Debug, Clone)]
pub struct AuditLogData {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: Option<JsonValue>,
    pub ip_address: Option<String>,
}
