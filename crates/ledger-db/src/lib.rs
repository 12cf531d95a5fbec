//! Credit Ledger Database Layer
//!
//! This crate provides storage for the credit ledger:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - PostgreSQL implementations of every storage trait in `ledger-core`
//! - Atomic conditional debits (balance, usage record, and uptime log in one transaction)
//! - An in-memory store with the same guarantees for tests, behind the
//!   `test-util` feature

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod pool;
pub mod repositories;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{InMemoryEntityDirectory, MemoryLedger};
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use ledger_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
