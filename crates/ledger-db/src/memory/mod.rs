//! In-memory storage
//!
//! Implements every storage trait with the same atomicity guarantees as the
//! PostgreSQL repositories: each operation runs entirely under one lock.
//! Used by unit tests and for running the API without a database.

mod directory;
mod ledger;

pub use directory::InMemoryEntityDirectory;
pub use ledger::MemoryLedger;
