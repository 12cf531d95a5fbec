//! Rate catalog DTOs

use ledger_core::models::{BillingCadence, NewServiceRate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Rate creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateCreateRequest {
    #[validate(length(min = 1, max = 100, message = "Service key is required"))]
    pub service_key: String,

    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,

    pub description: Option<String>,

    /// Cost per unit in credits (non-negative, validated by the catalog)
    pub cost_per_unit: Decimal,

    #[serde(default)]
    pub cadence: BillingCadence,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<RateCreateRequest> for NewServiceRate {
    fn from(req: RateCreateRequest) -> Self {
        NewServiceRate {
            service_key: req.service_key,
            name: req.name,
            description: req.description,
            cost_per_unit: req.cost_per_unit,
            cadence: req.cadence,
            is_active: req.is_active,
        }
    }
}

/// Cost update request
#[derive(Debug, Clone, Deserialize)]
pub struct RateCostUpdateRequest {
    pub cost_per_unit: Decimal,
}

/// Rate listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateListParams {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Cost calculation query
#[derive(Debug, Clone, Deserialize)]
pub struct CostQueryParams {
    #[serde(default = "default_units")]
    pub units: Decimal,
}

fn default_units() -> Decimal {
    Decimal::ONE
}

/// Cost calculation result
#[derive(Debug, Clone, Serialize)]
pub struct CostResponse {
    pub service_key: String,
    pub units: Decimal,
    pub cost: Decimal,
}
