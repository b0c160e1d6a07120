//! Field validation for rule items.
//!
//! Each rule item maps to exactly one outcome code, so validation stops at the
//! first failing rule and reports it as a [`GovernanceError`] carrying the
//! field's code (e.g. `InvalidRuleName` for the `name` field).
//!
//! ```rust,ignore
//! validate_field("name", &rule.meta.name, ApiCode::InvalidRuleName)
//!     .required()
//!     .max_length(limits.max_rule_name_length)
//!     .result()?;
//! ```

use std::fmt;

use crate::config::LimitsConfig;
use crate::error::{ApiCode, GovernanceError, Result};
use crate::model::RuleMeta;

/// The kind of rule a field violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Required,
    MaxLength { max: usize, actual: usize },
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "is required"),
            Self::MaxLength { max, actual } => {
                write!(f, "must be at most {} characters (got {})", max, actual)
            }
        }
    }
}

/// Chains rules over one string field.
#[derive(Debug)]
pub struct FieldValidator<'a> {
    field: &'a str,
    value: &'a str,
    code: ApiCode,
    failure: Option<ValidationErrorKind>,
}

/// Start validating `value`, reporting failures under `code`.
pub fn validate_field<'a>(field: &'a str, value: &'a str, code: ApiCode) -> FieldValidator<'a> {
    FieldValidator {
        field,
        value,
        code,
        failure: None,
    }
}

impl<'a> FieldValidator<'a> {
    pub fn required(mut self) -> Self {
        if self.failure.is_none() && self.value.trim().is_empty() {
            self.failure = Some(ValidationErrorKind::Required);
        }
        self
    }

    /// Length is counted in Unicode scalar values.
    pub fn max_length(mut self, max: usize) -> Self {
        if self.failure.is_none() {
            let actual = self.value.chars().count();
            if actual > max {
                self.failure = Some(ValidationErrorKind::MaxLength { max, actual });
            }
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    pub fn result(self) -> Result<()> {
        match self.failure {
            None => Ok(()),
            Some(kind) => Err(GovernanceError::new(
                self.code,
                format!("{} {}", self.field, kind),
            )),
        }
    }
}

/// What a write operation requires of the common metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRequirements {
    pub id: bool,
    pub name: bool,
}

impl MetaRequirements {
    pub const CREATE: Self = Self { id: false, name: true };
    pub const UPDATE: Self = Self { id: true, name: true };
    pub const ID_ONLY: Self = Self { id: true, name: false };
}

/// Validate the metadata block shared by every rule kind.
pub fn check_rule_meta(
    meta: &RuleMeta,
    limits: &LimitsConfig,
    requirements: MetaRequirements,
) -> Result<()> {
    if requirements.id {
        validate_field("id", &meta.id, ApiCode::InvalidRuleId)
            .required()
            .result()?;
    }
    if !requirements.name {
        return Ok(());
    }

    validate_field("name", &meta.name, ApiCode::InvalidRuleName)
        .required()
        .max_length(limits.max_rule_name_length)
        .result()?;
    validate_field("namespace", &meta.namespace, ApiCode::InvalidNamespaceName)
        .max_length(limits.max_namespace_length)
        .result()?;
    validate_field("description", &meta.description, ApiCode::InvalidComment)
        .max_length(limits.max_description_length)
        .result()
}

/// Length checks for a service reference (service name plus its namespace).
pub fn check_service_ref(
    field: &str,
    service: &str,
    namespace: &str,
    limits: &LimitsConfig,
) -> Result<()> {
    validate_field(field, service, ApiCode::InvalidServiceName)
        .max_length(limits.max_service_name_length)
        .result()?;
    validate_field(field, namespace, ApiCode::InvalidNamespaceName)
        .max_length(limits.max_namespace_length)
        .result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank() {
        let err = validate_field("name", "  ", ApiCode::InvalidRuleName)
            .required()
            .result()
            .unwrap_err();
        assert_eq!(err.code(), ApiCode::InvalidRuleName);
        assert_eq!(err.message(), "name is required");
    }

    #[test]
    fn test_max_length_counts_chars() {
        // Eight multi-byte characters fit a limit of eight.
        assert!(validate_field("name", "熔断规则熔断规则", ApiCode::InvalidRuleName)
            .max_length(8)
            .is_valid());

        let err = validate_field("name", "abcdef", ApiCode::InvalidRuleName)
            .max_length(5)
            .result()
            .unwrap_err();
        assert_eq!(err.message(), "name must be at most 5 characters (got 6)");
    }

    #[test]
    fn test_first_failure_wins() {
        let err = validate_field("name", "", ApiCode::InvalidRuleName)
            .required()
            .max_length(0)
            .result()
            .unwrap_err();
        assert_eq!(err.message(), "name is required");
    }

    #[test]
    fn test_meta_requirements() {
        let limits = LimitsConfig::default();
        let mut meta = RuleMeta::new("r1", "default");
        assert!(check_rule_meta(&meta, &limits, MetaRequirements::CREATE).is_ok());

        let err = check_rule_meta(&meta, &limits, MetaRequirements::UPDATE).unwrap_err();
        assert_eq!(err.code(), ApiCode::InvalidRuleId);

        meta.name.clear();
        meta.id = "abc".to_string();
        assert!(check_rule_meta(&meta, &limits, MetaRequirements::ID_ONLY).is_ok());

        meta.name = "r".repeat(65);
        let err = check_rule_meta(&meta, &limits, MetaRequirements::CREATE).unwrap_err();
        assert_eq!(err.code(), ApiCode::InvalidRuleName);

        meta.name = "r1".to_string();
        meta.description = "d".repeat(1025);
        let err = check_rule_meta(&meta, &limits, MetaRequirements::CREATE).unwrap_err();
        assert_eq!(err.code(), ApiCode::InvalidComment);
    }
}
