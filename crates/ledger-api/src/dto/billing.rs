//! Fleet billing DTOs

use chrono::NaiveDate;
use serde::Deserialize;

/// Manual billing run trigger, read from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingRunRequest {
    /// Day to charge; today (UTC) when absent
    pub date: Option<NaiveDate>,
}

/// Uptime log window
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeHistoryParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
