//! Declarative payload validation.
//!
//! Validates write payloads against a resource schema using a chain of
//! validation rules. The reference backend runs the full chain before
//! accepting a write; form controllers run the required-fields rule alone
//! as the cheap client-side path, so those failures never reach the
//! executor or the remote client.

use crate::core::{Constraint, DataError, FieldMap, Resource, Result, Value};

/// Whether a payload is creating a record or patching an existing one.
/// Required-field checks only apply to inserts; updates may be partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
}

/// A single validation rule in the chain.
pub trait ValidationRule: Send + Sync {
    fn validate(&self, resource: &Resource, payload: &FieldMap, mode: WriteMode) -> Result<()>;
}

/// Every required field must be present and non-empty on insert.
#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn validate(&self, resource: &Resource, payload: &FieldMap, mode: WriteMode) -> Result<()> {
        if mode == WriteMode::Update {
            return Ok(());
        }
        for spec in resource.required_fields() {
            let missing = payload.get(&spec.name).is_none_or(Value::is_empty);
            if missing {
                return Err(DataError::validation(
                    &spec.name,
                    format!("'{}' is required", spec.name),
                ));
            }
        }
        Ok(())
    }
}

/// Every supplied field must exist in the schema with a compatible type.
#[derive(Debug, Clone, Default)]
pub struct SchemaTypeRule;

impl ValidationRule for SchemaTypeRule {
    fn validate(&self, resource: &Resource, payload: &FieldMap, _mode: WriteMode) -> Result<()> {
        for (name, value) in payload {
            let Some(spec) = resource.field_spec(name) else {
                return Err(DataError::validation(
                    name,
                    format!("'{}' is not a field of '{}'", name, resource.name()),
                ));
            };
            if !spec.field_type.is_compatible(value) {
                return Err(DataError::validation(
                    name,
                    format!(
                        "expected {}, got {}",
                        spec.field_type,
                        value.type_name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Per-field declarative constraints: numeric bounds, text length, email.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRule;

impl ValidationRule for ConstraintRule {
    fn validate(&self, resource: &Resource, payload: &FieldMap, _mode: WriteMode) -> Result<()> {
        for (name, value) in payload {
            let Some(spec) = resource.field_spec(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            for constraint in &spec.constraints {
                check_constraint(name, value, constraint)?;
            }
        }
        Ok(())
    }
}

fn check_constraint(field: &str, value: &Value, constraint: &Constraint) -> Result<()> {
    match constraint {
        Constraint::MinNumber(min) => {
            if let Some(n) = value.as_f64()
                && n < *min
            {
                return Err(DataError::validation(
                    field,
                    format!("must be at least {min}"),
                ));
            }
        }
        Constraint::MaxNumber(max) => {
            if let Some(n) = value.as_f64()
                && n > *max
            {
                return Err(DataError::validation(
                    field,
                    format!("must be at most {max}"),
                ));
            }
        }
        Constraint::MinLength(min) => {
            if let Some(s) = value.as_str()
                && s.trim().len() < *min
            {
                return Err(DataError::validation(
                    field,
                    format!("must be at least {min} characters"),
                ));
            }
        }
        Constraint::MaxLength(max) => {
            if let Some(s) = value.as_str()
                && s.len() > *max
            {
                return Err(DataError::validation(
                    field,
                    format!("must be less than {max} characters"),
                ));
            }
        }
        Constraint::Email => {
            if let Some(s) = value.as_str() {
                let mut parts = s.splitn(2, '@');
                let local = parts.next().unwrap_or_default();
                let domain = parts.next().unwrap_or_default();
                if local.is_empty() || domain.is_empty() || domain.contains('@') {
                    return Err(DataError::validation(
                        field,
                        "must be a valid email address",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Validator running the full rule chain against one payload.
pub struct RecordValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl RecordValidator {
    /// Validator with the default rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(SchemaTypeRule),
                Box::new(ConstraintRule),
            ],
        }
    }

    /// Validator with custom rules.
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, resource: &Resource, payload: &FieldMap, mode: WriteMode) -> Result<()> {
        for rule in &self.rules {
            rule.validate(resource, payload, mode)?;
        }
        Ok(())
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}
