//! Resource descriptors.
//!
//! A resource is a named remote collection with a declared field schema,
//! required-field list, constraints and derivation rules. Definitions are
//! registered once at startup and stay stable for the process lifetime;
//! pages become thin configuration over these descriptors instead of
//! re-implementing fetch/mutate plumbing.

use crate::core::{DataError, FieldMap, FieldType, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A declarative per-field constraint, checked by the validation chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Numeric lower bound, inclusive (e.g. `unit_price >= 0`).
    MinNumber(f64),
    /// Numeric upper bound, inclusive.
    MaxNumber(f64),
    /// Minimum text length after trimming.
    MinLength(usize),
    /// Maximum text length.
    MaxLength(usize),
    /// Rough email shape: one `@` with content on both sides.
    Email,
}

/// Schema entry for a single resource field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Value,
    pub constraints: Vec<Constraint>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: Value::Null,
            constraints: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A field derived from another one while a draft is edited, e.g.
/// `field_name` slugified from `display_name`.
#[derive(Debug, Clone)]
pub struct DeriveRule {
    pub source: String,
    pub target: String,
}

/// Named remote collection plus everything the controllers need to know
/// about it: schema, search fields, derivation rules.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    fields: Vec<FieldSpec>,
    search_fields: Vec<String>,
    derive_rules: Vec<DeriveRule>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            search_fields: Vec::new(),
            derive_rules: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Fields scanned by list-view text search.
    pub fn searchable(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Declare `target` as auto-derived (slugified) from `source`.
    pub fn derive_slug(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.derive_rules.push(DeriveRule {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn search_fields(&self) -> &[String] {
        &self.search_fields
    }

    pub fn derive_rules(&self) -> &[DeriveRule] {
        &self.derive_rules
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_spec(name).is_some()
    }

    /// Creation defaults: every declared field set to its default value.
    pub fn defaults(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default.clone()))
            .collect()
    }
}

/// Lowercase, spaces to underscores, strip anything outside `[a-z0-9_]`.
pub fn slugify(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Process-wide set of resource definitions, populated at startup and
/// injected wherever needed (never a hidden module-level static).
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, resource: Resource) -> Self {
        self.resources
            .insert(resource.name().to_string(), Arc::new(resource));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<Resource>> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::UnknownResource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}
