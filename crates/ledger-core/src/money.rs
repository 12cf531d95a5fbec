//! Credit amount helpers
//!
//! All credit amounts are stored as NUMERIC(18,4). Every amount that enters
//! the ledger passes through [`normalize_credits`] so repeated small charges
//! never accumulate drift.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fixed number of decimal places for credit amounts
pub const CREDIT_SCALE: u32 = 4;

/// Fixed number of decimal places for USD amounts
pub const USD_SCALE: u32 = 2;

/// Round a credit amount to [`CREDIT_SCALE`] places, midpoint away from zero.
///
/// The result always carries exactly four decimal places, so `0.5` becomes
/// `0.5000`.
pub fn normalize_credits(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(CREDIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CREDIT_SCALE);
    rounded
}

/// Round a USD amount to cents.
pub fn normalize_usd(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(USD_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(USD_SCALE);
    rounded
}
