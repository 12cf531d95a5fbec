//! API layer for the credit ledger
//!
//! HTTP handlers for balances, deductions, rates, purchases, and fleet billing.
//! Every route except `/health` requires the `X-Service-Token` header.

#![forbid(unsafe_code)]

pub mod auth;
pub mod dto;
pub mod handlers;
pub mod state;

pub use auth::{ServiceAuth, ServiceCaller};
pub use dto::{ApiResponse, PaginationParams};
pub use handlers::configure;
pub use state::LedgerServices;
