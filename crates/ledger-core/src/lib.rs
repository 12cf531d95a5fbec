//! Credit Ledger Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the credit ledger. It includes:
//!
//! - Domain models (CreditBalance, UsageRecord, CreditTransaction, ServiceRate, ...)
//! - Storage and collaborator traits implemented by `ledger-db`
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod money;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
