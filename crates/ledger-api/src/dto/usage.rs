//! Usage query DTOs

use chrono::{DateTime, Utc};
use ledger_core::models::{UsageFilter, UsageType};
use ledger_core::AppError;
use serde::Deserialize;

/// Usage history filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQueryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub usage_type: Option<String>,
}

impl UsageQueryParams {
    pub fn to_filter(&self) -> Result<UsageFilter, AppError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::Validation("`from` must not be after `to`".to_string()));
            }
        }

        let usage_type = match self.usage_type.as_deref() {
            Some(tag) => Some(
                UsageType::from_str(tag)
                    .ok_or_else(|| AppError::Validation(format!("Unknown usage type: {}", tag)))?,
            ),
            None => None,
        };

        Ok(UsageFilter {
            from: self.from,
            to: self.to,
            usage_type,
        })
    }
}

/// Usage stats window
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageStatsParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
