//! Credit transaction model
//!
//! Append-only record of purchases and bonuses. Purchases move through
//! pending → completed | failed exactly once; bonuses are written completed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::balance::CreditBalance;

/// Transaction category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Paid top-up driven by the payment processor
    #[default]
    Purchase,
    /// Promotional or manual credit award
    Bonus,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Purchase => write!(f, "purchase"),
            TransactionKind::Bonus => write!(f, "bonus"),
        }
    }
}

impl TransactionKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purchase" => Some(TransactionKind::Purchase),
            "bonus" => Some(TransactionKind::Bonus),
            _ => None,
        }
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Awaiting the payment processor
    #[default]
    Pending,
    /// Credits were added to the balance
    Completed,
    /// Payment failed, no balance effect
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TransactionStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed transactions never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Purchase or bonus record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditTransaction {
    /// Unique identifier
    pub id: Uuid,

    /// Account receiving the credits
    pub account_id: Uuid,

    /// Purchase or bonus
    pub kind: TransactionKind,

    /// Amount paid in USD (zero for bonuses)
    pub amount_usd: Decimal,

    /// Credits added once completed
    pub credits_amount: Decimal,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// Payment processor charge reference
    pub external_ref: Option<String>,

    /// Reason recorded when the payment failed
    pub failure_reason: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// Free-form metadata
    pub metadata: Option<JsonValue>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the transaction reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl CreditTransaction {
    /// New pending purchase
    pub fn pending_purchase(
        account_id: Uuid,
        amount_usd: Decimal,
        credits_amount: Decimal,
        metadata: Option<JsonValue>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            kind: TransactionKind::Purchase,
            amount_usd,
            credits_amount,
            status: TransactionStatus::Pending,
            external_ref: None,
            failure_reason: None,
            description: None,
            metadata,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Outcome of a status transition attempt on a stored purchase
#[derive(Debug, Clone)]
pub enum PurchaseTransition {
    /// The transaction left `pending`; `balance` is set when credits were added
    Applied {
        transaction: CreditTransaction,
        balance: Option<CreditBalance>,
    },
    /// The transaction was already terminal and was left untouched
    Unchanged(CreditTransaction),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            TransactionStatus::from_str("COMPLETED"),
            Some(TransactionStatus::Completed)
        );
        assert_eq!(TransactionStatus::from_str("refunded"), None);
        assert_eq!(TransactionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_purchase() {
        let account = Uuid::new_v4();
        let tx = CreditTransaction::pending_purchase(account, dec!(10.00), dec!(100), None);

        assert_eq!(tx.account_id, account);
        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.completed_at.is_none());
    }
}
