//! External schema-validator boundary.
//!
//! The validator itself is a black box; the operation builder only needs
//! `validate(category, schema, version, document) -> errors`.

use serde_json::Value;

/// One error reported by the external validator
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Validation outcome; no errors means valid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub trait SchemaValidator {
    fn validate(
        &self,
        category: &str,
        schema_name: &str,
        schema_version: &str,
        document: &Value,
    ) -> ValidationReport;
}

/// Validator that accepts every document. Stands in when no external
/// validator is wired up.
#[derive(Debug, Default)]
pub struct AcceptAllValidator;

impl SchemaValidator for AcceptAllValidator {
    fn validate(&self, _: &str, _: &str, _: &str, _: &Value) -> ValidationReport {
        ValidationReport::valid()
    }
}
