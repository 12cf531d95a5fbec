//! Purchase DTOs

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Pending purchase request
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseCreateRequest {
    pub account_id: Uuid,
    /// Amount paid in USD (must be positive, validated by the ledger)
    pub amount_usd: Decimal,
    /// Credits granted on completion (must be positive, validated by the ledger)
    pub credits_amount: Decimal,
    pub metadata: Option<JsonValue>,
}

/// Completion sent by the payment webhook relay
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PurchaseCompleteRequest {
    /// Payment provider reference
    #[validate(length(min = 1, max = 255))]
    pub external_ref: Option<String>,
}

/// Failure sent by the payment webhook relay
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PurchaseFailRequest {
    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,
}
