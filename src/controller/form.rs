//! Form/dialog controller.
//!
//! Owns one draft record at a time and drives it through a small state
//! machine: closed -> editing -> submitting, then back to closed on
//! success or editing on failure (draft intact). Required-field checks run
//! locally before any mutation is built, so a form with an empty required
//! field never reaches the remote client.

use crate::core::{DataError, DraftRecord, Record, Resource, Result, Value, slugify};
use crate::mutation::{Mutation, MutationExecutor, MutationOutcome};
use crate::query::KeyPredicate;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormState {
    #[default]
    Closed,
    Editing,
    Submitting,
}

pub struct FormController {
    executor: Arc<MutationExecutor>,
    resource: Arc<Resource>,
    invalidates: Vec<KeyPredicate>,
    state: FormState,
    draft: Option<DraftRecord>,
    field_errors: BTreeMap<String, String>,
}

impl FormController {
    pub fn new(executor: Arc<MutationExecutor>, resource: Arc<Resource>) -> Self {
        let invalidates = vec![KeyPredicate::resource(resource.name())];
        Self {
            executor,
            resource,
            invalidates,
            state: FormState::Closed,
            draft: None,
            field_errors: BTreeMap::new(),
        }
    }

    /// Override which cache entries a successful submit invalidates. The
    /// default is every query over the form's resource.
    pub fn invalidating(mut self, predicates: Vec<KeyPredicate>) -> Self {
        self.invalidates = predicates;
        self
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != FormState::Closed
    }

    pub fn draft(&self) -> Option<&DraftRecord> {
        self.draft.as_ref()
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors.get(field).map(String::as_str)
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    /// Open the form: with a seed record it edits that record, without one
    /// it creates a fresh draft from the resource's field defaults.
    pub fn open(&mut self, seed: Option<&Record>) {
        self.draft = Some(match seed {
            Some(record) => DraftRecord::edit(record),
            None => DraftRecord::create(self.resource.defaults()),
        });
        self.field_errors.clear();
        self.state = FormState::Editing;
    }

    /// Set one draft field. Clears any stale error on that field and runs
    /// the resource's derivation rules (a slug target follows its source
    /// until the user has typed into the target themselves).
    pub fn set_field(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        if self.state != FormState::Editing {
            return;
        }
        let field = field.into();
        let value = value.into();
        let Some(draft) = self.draft.as_mut() else {
            return;
        };

        draft.set(field.clone(), value.clone());
        self.field_errors.remove(&field);

        for rule in self.resource.derive_rules() {
            if rule.source != field {
                continue;
            }
            let target_untouched = draft
                .get(&rule.target)
                .is_none_or(Value::is_empty);
            if target_untouched && let Value::Text(text) = &value {
                draft.set(rule.target.clone(), slugify(text));
            }
        }
    }

    /// Validate required fields locally, then submit the draft through the
    /// mutation executor: update when the draft was seeded from an existing
    /// record, insert otherwise. Success closes the form and discards the
    /// draft; failure returns to editing with the draft intact.
    pub async fn submit(&mut self) -> Result<MutationOutcome> {
        if self.state != FormState::Editing {
            return Err(DataError::Conflict("no draft open for submission".into()));
        }
        let Some(draft) = self.draft.as_ref() else {
            return Err(DataError::Conflict("no draft open for submission".into()));
        };

        let payload = draft.to_payload();

        self.field_errors.clear();
        for spec in self.resource.required_fields() {
            let missing = payload.get(&spec.name).is_none_or(Value::is_empty);
            if missing {
                self.field_errors
                    .insert(spec.name.clone(), format!("{} is required", spec.name));
            }
        }
        if let Some((field, message)) = self.field_errors.first_key_value() {
            // Local failure: the executor and remote client are never
            // involved, the user fixes the field and resubmits.
            return Err(DataError::validation(field.as_str(), message.as_str()));
        }

        let mutation = match draft.seed_id() {
            Some(id) => Mutation::update(self.resource.name(), id, payload),
            None => Mutation::insert(self.resource.name(), payload),
        }
        .invalidates(self.invalidates.clone());

        self.state = FormState::Submitting;
        match self.executor.run(mutation).await {
            Ok(outcome) => {
                self.draft = None;
                self.field_errors.clear();
                self.state = FormState::Closed;
                Ok(outcome)
            }
            Err(error) => {
                self.state = FormState::Editing;
                if let DataError::Validation { field, message } = &error {
                    self.field_errors.insert(field.clone(), message.clone());
                }
                Err(error)
            }
        }
    }

    /// Discard the draft and close. Safe to call in any state, including
    /// when the form is already closed; never touches the remote client.
    pub fn cancel(&mut self) {
        self.draft = None;
        self.field_errors.clear();
        self.state = FormState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryDataClient;
    use crate::core::{FieldSpec, FieldType, ResourceRegistry};
    use crate::notify::CollectingSink;
    use crate::query::{CacheConfig, QueryCache};

    fn setup() -> (Arc<MemoryDataClient>, FormController) {
        let registry = Arc::new(
            ResourceRegistry::new().register(
                Resource::new("custom_fields")
                    .field(FieldSpec::new("display_name", FieldType::Text).required())
                    .field(FieldSpec::new("field_name", FieldType::Text))
                    .derive_slug("display_name", "field_name"),
            ),
        );
        let resource = registry.get("custom_fields").unwrap();
        let client = Arc::new(MemoryDataClient::new(registry));
        let cache = QueryCache::new(client.clone(), CacheConfig::default());
        let executor = Arc::new(MutationExecutor::new(
            client.clone(),
            cache,
            Arc::new(CollectingSink::new()),
        ));
        (client, FormController::new(executor, resource))
    }

    #[test]
    fn test_slug_follows_display_name_until_target_is_set() {
        let (_client, mut form) = setup();
        form.open(None);

        form.set_field("display_name", "Customer Name");
        assert_eq!(
            form.draft().unwrap().get("field_name"),
            Some(&Value::from("customer_name"))
        );

        // Explicit target value stops the derivation.
        form.set_field("field_name", "custom_slug");
        form.set_field("display_name", "Other Label");
        assert_eq!(
            form.draft().unwrap().get("field_name"),
            Some(&Value::from("custom_slug"))
        );
    }

    #[tokio::test]
    async fn test_required_field_failure_never_reaches_client() {
        let (client, mut form) = setup();
        form.open(None);

        let result = form.submit().await;
        assert!(matches!(result, Err(DataError::Validation { .. })));
        assert_eq!(form.state(), FormState::Editing);
        assert_eq!(
            form.field_error("display_name"),
            Some("display_name is required")
        );
        assert_eq!(client.reads_for("custom_fields"), 0);
        assert!(client.invocations().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (_client, mut form) = setup();
        form.cancel();
        assert_eq!(form.state(), FormState::Closed);

        form.open(None);
        form.set_field("display_name", "Draft");
        form.cancel();
        assert_eq!(form.state(), FormState::Closed);
        assert!(form.draft().is_none());

        form.cancel();
        assert_eq!(form.state(), FormState::Closed);
    }
}
