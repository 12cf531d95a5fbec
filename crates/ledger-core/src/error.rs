//! Unified error handling for the credit ledger
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the application, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Storage Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    // ==================== Authentication Errors ====================
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ==================== Ledger Errors ====================
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: String, available: String },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Billing run failed: {0}")]
    BillingRunFailed(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,

            // 404 Not Found
            AppError::ServiceNotFound(_)
            | AppError::TransactionNotFound(_)
            | AppError::EntityNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_) | AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 503 Service Unavailable
            AppError::StorageUnavailable(_) | AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InsufficientCredits { .. } => "insufficient_credits",
            AppError::ServiceNotFound(_) => "service_not_found",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::EntityNotFound(_) => "entity_not_found",
            AppError::BillingRunFailed(_) => "billing_run_failed",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this error means the ledger's storage itself is failing.
    ///
    /// Systemic errors abort a fleet billing run instead of being recorded
    /// against a single entity.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::StorageUnavailable(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::ServiceNotFound("custom_domain".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InsufficientCredits {
                required: "0.50".to_string(),
                available: "0.30".to_string()
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::StorageUnavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_insufficient_credits_message_states_amounts() {
        let err = AppError::InsufficientCredits {
            required: "0.5000".to_string(),
            available: "0.3000".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: required 0.5000, available 0.3000"
        );
        assert_eq!(err.error_code(), "insufficient_credits");
    }

    #[test]
    fn test_systemic_errors() {
        assert!(AppError::Database("x".to_string()).is_systemic());
        assert!(AppError::Transaction("x".to_string()).is_systemic());
        assert!(!AppError::EntityNotFound("x".to_string()).is_systemic());
        assert!(!AppError::InsufficientCredits {
            required: "1".to_string(),
            available: "0".to_string()
        }
        .is_systemic());
    }
}
