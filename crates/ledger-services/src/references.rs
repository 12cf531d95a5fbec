//! Reference type registry
//!
//! A deduction may point at whatever triggered it through an open
//! `(reference_type, reference_id)` pair. Each registered type declares the
//! metadata keys a deduction of that type must carry.

use ledger_core::{AppError, AppResult};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Registered reference types and their required metadata keys
#[derive(Debug, Clone, Default)]
pub struct ReferenceRegistry {
    types: HashMap<String, Vec<String>>,
}

impl ReferenceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the platform's built-in reference types
    pub fn with_builtins() -> Self {
        Self::new()
            .register("store", &["store_id"])
            .register("custom_domain", &["domain_id", "domain"])
            .register("integration_run", &["integration_id"])
            .register("manual", &[])
    }

    /// Register a reference type, replacing any previous registration
    pub fn register(mut self, reference_type: &str, required_keys: &[&str]) -> Self {
        self.types.insert(
            reference_type.to_string(),
            required_keys.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    pub fn is_registered(&self, reference_type: &str) -> bool {
        self.types.contains_key(reference_type)
    }

    /// Check a deduction's reference and metadata
    pub fn validate(
        &self,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
        metadata: Option<&JsonValue>,
    ) -> AppResult<()> {
        let Some(reference_type) = reference_type else {
            if reference_id.is_some() {
                return Err(AppError::Validation(
                    "reference_id given without reference_type".to_string(),
                ));
            }
            return Ok(());
        };

        let required = self.types.get(reference_type).ok_or_else(|| {
            AppError::Validation(format!("Unknown reference type: {}", reference_type))
        })?;

        let missing: Vec<&str> = required
            .iter()
            .filter(|key| {
                metadata
                    .and_then(|m| m.get(key.as_str()))
                    .map_or(true, JsonValue::is_null)
            })
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Reference type {} requires metadata keys: {}",
                reference_type,
                missing.join(", ")
            )));
        }

        Ok(())
    }
}
