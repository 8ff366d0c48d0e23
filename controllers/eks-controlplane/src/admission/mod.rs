//! Admission defaulting and validation for EKSControlPlane.
//!
//! `defaults` and `validation` are pure functions over the typed object; the
//! `server` module is the HTTP transport that calls them.

pub mod cidr;
pub mod defaults;
pub mod server;
pub mod validation;

pub use defaults::default;
pub use validation::validate;

use std::fmt;
use thiserror::Error;

/// Stable reason codes for field violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldReason {
    /// A required value is missing
    FieldValueRequired,
    /// The value is malformed or out of range
    FieldValueInvalid,
    /// The value is not allowed in this combination
    FieldValueForbidden,
    /// The value cannot change once set
    FieldValueImmutable,
}

impl fmt::Display for FieldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldReason::FieldValueRequired => "FieldValueRequired",
            FieldReason::FieldValueInvalid => "FieldValueInvalid",
            FieldReason::FieldValueForbidden => "FieldValueForbidden",
            FieldReason::FieldValueImmutable => "FieldValueImmutable",
        };
        f.write_str(s)
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// JSON path of the field, e.g. `spec.version`
    pub field: String,
    /// Reason code
    pub reason: FieldReason,
    /// Human readable detail
    pub message: String,
}

impl FieldViolation {
    pub(crate) fn new(field: impl Into<String>, reason: FieldReason, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason,
            message: message.into(),
        }
    }

    pub(crate) fn required(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, FieldReason::FieldValueRequired, message)
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, FieldReason::FieldValueInvalid, message)
    }

    pub(crate) fn forbidden(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, FieldReason::FieldValueForbidden, message)
    }

    pub(crate) fn immutable(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, FieldReason::FieldValueImmutable, message)
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.reason, self.field, self.message)
    }
}

/// All violations found in one admission request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.violations))]
pub struct AdmissionError {
    /// Violations in the order they were found
    pub violations: Vec<FieldViolation>,
}

impl AdmissionError {
    /// Whether any violation is for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// Violation for `field`, if any.
    pub fn find(&self, field: &str) -> Option<&FieldViolation> {
        self.violations.iter().find(|v| v.field == field)
    }
}

fn render(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_message() {
        let err = AdmissionError {
            violations: vec![
                FieldViolation::immutable("spec.region", "field is immutable"),
                FieldViolation::invalid("spec.version", "new version less than old version"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "[FieldValueImmutable] spec.region: field is immutable; \
             [FieldValueInvalid] spec.version: new version less than old version"
        );
        assert!(err.has_field("spec.version"));
        assert!(err.find("spec.network").is_none());
    }
}
