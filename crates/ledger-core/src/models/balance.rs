//! Credit balance model
//!
//! One row per account holding the prepaid credit balance and the running
//! totals it is derived from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::transaction::{CreditTransaction, TransactionKind};

/// Per-account credit balance
///
/// `balance` is never negative at any committed state and always equals
/// `total_purchased + total_bonus - total_used`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditBalance {
    /// Owning account
    pub account_id: Uuid,

    /// Spendable credits
    pub balance: Decimal,

    /// Credits added by completed purchases
    pub total_purchased: Decimal,

    /// Credits added by bonuses and manual awards
    pub total_bonus: Decimal,

    /// Credits consumed by deductions
    pub total_used: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    /// Empty balance for an account with no ledger history
    pub fn empty(account_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            balance: Decimal::ZERO,
            total_purchased: Decimal::ZERO,
            total_bonus: Decimal::ZERO,
            total_used: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the balance covers `amount`
    #[inline]
    pub fn covers(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Balance recomputed from the running totals
    pub fn derived_balance(&self) -> Decimal {
        self.total_purchased + self.total_bonus - self.total_used
    }

    /// Check the ledger invariant for this row
    pub fn is_consistent(&self) -> bool {
        self.balance >= Decimal::ZERO && self.balance == self.derived_balance()
    }
}

/// Unconditional balance increase, recorded as a completed transaction
#[derive(Debug, Clone)]
pub struct CreditGrant {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub credits: Decimal,
    pub description: String,
    pub metadata: Option<JsonValue>,
}

/// Result of applying a [`CreditGrant`]
#[derive(Debug, Clone, Serialize)]
pub struct CreditReceipt {
    pub transaction: CreditTransaction,
    pub balance: CreditBalance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_balance_is_consistent() {
        let balance = CreditBalance::empty(Uuid::new_v4());
        assert_eq!(balance.balance, Decimal::ZERO);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_covers() {
        let balance = CreditBalance {
            balance: dec!(5.00),
            total_purchased: dec!(5.00),
            ..CreditBalance::empty(Uuid::new_v4())
        };

        assert!(balance.covers(dec!(5.00)));
        assert!(balance.covers(dec!(2.00)));
        assert!(!balance.covers(dec!(5.0001)));
    }

    #[test]
    fn test_inconsistent_balance_detected() {
        let balance = CreditBalance {
            balance: dec!(4.00),
            total_purchased: dec!(5.00),
            total_bonus: dec!(1.00),
            total_used: dec!(1.00),
            ..CreditBalance::empty(Uuid::new_v4())
        };

        assert_eq!(balance.derived_balance(), dec!(5.00));
        assert!(!balance.is_consistent());
    }
}
