//! Balance and deduction DTOs

use chrono::{DateTime, Utc};
use ledger_core::models::{CreditBalance, UsageType};
use ledger_core::AppError;
use ledger_services::DeductionRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Balance with running totals
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub total_purchased: Decimal,
    pub total_bonus: Decimal,
    pub total_used: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<CreditBalance> for BalanceResponse {
    fn from(b: CreditBalance) -> Self {
        Self {
            account_id: b.account_id,
            balance: b.balance,
            total_purchased: b.total_purchased,
            total_bonus: b.total_bonus,
            total_used: b.total_used,
            updated_at: b.updated_at,
        }
    }
}

/// Deduction request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeductionCreateRequest {
    /// Credits to deduct (must be positive, validated by the engine)
    pub amount: Decimal,

    #[validate(length(min = 1, max = 500, message = "Description is required"))]
    pub description: String,

    /// One of the usage type tags; defaults to "feature"
    pub usage_type: Option<String>,

    pub entity_id: Option<Uuid>,

    #[validate(length(max = 100))]
    pub reference_type: Option<String>,

    #[validate(length(max = 255))]
    pub reference_id: Option<String>,

    pub metadata: Option<JsonValue>,
}

impl DeductionCreateRequest {
    /// Build the engine request for `account_id`
    pub fn into_request(self, account_id: Uuid) -> Result<DeductionRequest, AppError> {
        let usage_type = match self.usage_type.as_deref() {
            Some(tag) => UsageType::from_str(tag)
                .ok_or_else(|| AppError::Validation(format!("Unknown usage type: {}", tag)))?,
            None => UsageType::Feature,
        };

        let mut request =
            DeductionRequest::new(account_id, self.amount, self.description).usage_type(usage_type);
        request.entity_id = self.entity_id;
        request.reference_type = self.reference_type;
        request.reference_id = self.reference_id;
        request.metadata = self.metadata;
        Ok(request)
    }
}

/// Bonus request body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BonusRequest {
    /// Credits to award (must be positive, validated by the ledger)
    pub amount: Decimal,

    #[validate(length(min = 1, max = 500, message = "Description is required"))]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(usage_type: Option<&str>) -> DeductionCreateRequest {
        DeductionCreateRequest {
            amount: dec!(2.00),
            description: "Export".to_string(),
            usage_type: usage_type.map(str::to_string),
            entity_id: None,
            reference_type: None,
            reference_id: None,
            metadata: None,
        }
    }

    #[test]
    fn test_usage_type_defaults_to_feature() {
        let account = Uuid::new_v4();
        let req = request(None).into_request(account).unwrap();
        assert_eq!(req.usage_type, UsageType::Feature);
        assert_eq!(req.account_id, account);
    }

    #[test]
    fn test_unknown_usage_type_rejected() {
        let err = request(Some("teleport")).into_request(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let req = request(Some("manual")).into_request(Uuid::new_v4()).unwrap();
        assert_eq!(req.usage_type, UsageType::Manual);
    }

    #[test]
    fn test_description_required() {
        let mut req = request(None);
        req.description = String::new();
        assert!(req.validate().is_err());
    }
}
