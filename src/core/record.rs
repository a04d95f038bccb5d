//! Records and drafts.
//!
//! A record is an opaque map of field name -> value with a required unique
//! `id` field. Records are owned by the cache entry that fetched them and
//! are replaced wholesale after a successful write; nothing mutates a
//! cached record in place.

use crate::core::{DataError, Result, Value};
use std::collections::BTreeMap;

/// Field name -> value. BTreeMap keeps field iteration deterministic.
pub type FieldMap = BTreeMap<String, Value>;

pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: FieldMap,
}

impl Record {
    /// Wrap a field map, requiring a non-empty text `id` field. Ids are
    /// opaque strings end to end; a numeric or missing id is rejected here
    /// so `id()` can rely on the invariant.
    pub fn new(fields: FieldMap) -> Result<Self> {
        match fields.get(ID_FIELD) {
            Some(Value::Text(s)) if !s.trim().is_empty() => Ok(Self { fields }),
            _ => Err(DataError::MissingId),
        }
    }

    /// Build a record from (name, value) pairs. Convenience for tests and
    /// reference-backend seeding.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(fields)
    }

    pub fn id(&self) -> &str {
        // Invariant from `new`: id is present, Text and non-empty.
        match self.fields.get(ID_FIELD) {
            Some(Value::Text(s)) => s,
            _ => "",
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Replacement copy with the given fields overlaid. Used by the
    /// optimistic patch path; readers never see a half-updated record.
    pub fn with_fields(&self, patch: &FieldMap) -> Self {
        let mut fields = self.fields.clone();
        for (name, value) in patch {
            if name != ID_FIELD {
                fields.insert(name.clone(), value.clone());
            }
        }
        Self { fields }
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            DataError::TypeMismatch("Expected a JSON object for a record".to_string())
        })?;

        let mut fields = FieldMap::new();
        for (name, value) in object {
            fields.insert(name.clone(), Value::from_json(value)?);
        }
        Self::new(fields)
    }

    pub fn to_json(&self) -> serde_json::Value {
        fields_to_json(&self.fields)
    }
}

pub fn fields_to_json(fields: &FieldMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    serde_json::Value::Object(map)
}

/// A local, uncommitted copy of a record (or creation defaults), owned by
/// exactly one open form controller and discarded on cancel or after a
/// successful submit.
#[derive(Debug, Clone)]
pub struct DraftRecord {
    fields: FieldMap,
    seed_id: Option<String>,
    dirty: bool,
}

impl DraftRecord {
    /// Draft for creating a new record, starting from defaults.
    pub fn create(defaults: FieldMap) -> Self {
        Self {
            fields: defaults,
            seed_id: None,
            dirty: false,
        }
    }

    /// Draft seeded from an existing record, for editing.
    pub fn edit(seed: &Record) -> Self {
        let mut fields = seed.fields().clone();
        fields.remove(ID_FIELD);
        Self {
            fields,
            seed_id: Some(seed.id().to_string()),
            dirty: false,
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
        self.dirty = true;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Id of the record this draft was seeded from; None when creating.
    pub fn seed_id(&self) -> Option<&str> {
        self.seed_id.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Payload for submission: text fields trimmed, field order preserved.
    pub fn to_payload(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Text(s) => Value::Text(s.trim().to_string()),
                    other => other.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}
