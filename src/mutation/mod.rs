//! Mutation executor.
//!
//! Wraps a single write in a pending/success/error lifecycle: exactly one
//! remote call, no implicit retry (writes are not safely idempotent, so a
//! retry is always the caller's explicit choice). On success the declared
//! cache predicates are invalidated; on error the cache is untouched and
//! the error is both pushed to the notification sink and returned to the
//! caller.
//!
//! Optimistic mode is an explicit opt-in: the matching cache entries are
//! patched speculatively before the remote call and restored wholesale if
//! it fails.

use crate::client::RemoteDataClient;
use crate::core::{DataError, FieldMap, ID_FIELD, Record, Result, Value, fields_to_json};
use crate::notify::{NotificationSink, NotifyKind};
use crate::query::{KeyPredicate, QueryCache};
use std::sync::{Arc, Mutex as StdMutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    /// Server-side function call (email, payment, webhook). Opaque here;
    /// invalidation is whatever the caller declares.
    Invoke,
}

/// Lifecycle of one in-flight write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// What a completed mutation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Record(Record),
    Deleted,
    Invoked(serde_json::Value),
}

impl MutationOutcome {
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// One write operation, described declaratively.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub operation: Operation,
    /// Resource name for CRUD operations; function name for invoke.
    pub target: String,
    pub payload: FieldMap,
    pub target_id: Option<String>,
    pub invalidates: Vec<KeyPredicate>,
    pub optimistic: bool,
}

impl Mutation {
    pub fn insert(resource: impl Into<String>, payload: FieldMap) -> Self {
        Self {
            operation: Operation::Insert,
            target: resource.into(),
            payload,
            target_id: None,
            invalidates: Vec::new(),
            optimistic: false,
        }
    }

    pub fn update(resource: impl Into<String>, id: impl Into<String>, payload: FieldMap) -> Self {
        Self {
            operation: Operation::Update,
            target: resource.into(),
            payload,
            target_id: Some(id.into()),
            invalidates: Vec::new(),
            optimistic: false,
        }
    }

    pub fn delete(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Delete,
            target: resource.into(),
            payload: FieldMap::new(),
            target_id: Some(id.into()),
            invalidates: Vec::new(),
            optimistic: false,
        }
    }

    pub fn invoke(function: impl Into<String>, payload: FieldMap) -> Self {
        Self {
            operation: Operation::Invoke,
            target: function.into(),
            payload,
            target_id: None,
            invalidates: Vec::new(),
            optimistic: false,
        }
    }

    /// Cache predicates to invalidate after a successful write. The common
    /// case is the written resource itself.
    pub fn invalidates(mut self, predicates: Vec<KeyPredicate>) -> Self {
        self.invalidates = predicates;
        self
    }

    pub fn invalidates_resource(self) -> Self {
        let predicate = KeyPredicate::resource(self.target.clone());
        self.invalidates(vec![predicate])
    }

    /// Opt in to a speculative local patch before the remote call, rolled
    /// back if the write fails.
    pub fn optimistic(mut self) -> Self {
        self.optimistic = true;
        self
    }
}

/// A prepared mutation with an observable lifecycle.
pub struct PendingMutation {
    mutation: Mutation,
    state: Arc<StdMutex<MutationState>>,
}

impl PendingMutation {
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn state(&self) -> MutationState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(MutationState::Error)
    }

    fn set_state(&self, state: MutationState) {
        if let Ok(mut slot) = self.state.lock() {
            *slot = state;
        }
    }
}

pub struct MutationExecutor {
    client: Arc<dyn RemoteDataClient>,
    cache: Arc<QueryCache>,
    sink: Arc<dyn NotificationSink>,
}

impl MutationExecutor {
    pub fn new(
        client: Arc<dyn RemoteDataClient>,
        cache: Arc<QueryCache>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            client,
            cache,
            sink,
        }
    }

    pub fn prepare(&self, mutation: Mutation) -> PendingMutation {
        PendingMutation {
            mutation,
            state: Arc::new(StdMutex::new(MutationState::Idle)),
        }
    }

    /// Prepare and execute in one step.
    pub async fn run(&self, mutation: Mutation) -> Result<MutationOutcome> {
        let pending = self.prepare(mutation);
        self.execute(&pending).await
    }

    /// Execute a prepared mutation: idle -> pending immediately, then
    /// success or error when the remote client answers.
    pub async fn execute(&self, pending: &PendingMutation) -> Result<MutationOutcome> {
        pending.set_state(MutationState::Pending);
        let mutation = &pending.mutation;

        let speculative = if mutation.optimistic {
            self.apply_speculative(mutation)
        } else {
            None
        };

        match self.remote_call(mutation).await {
            Ok(outcome) => {
                for predicate in &mutation.invalidates {
                    self.cache.invalidate(predicate);
                }
                pending.set_state(MutationState::Success);
                let message = success_message(mutation);
                tracing::info!(target_name = %mutation.target, "{message}");
                self.sink.notify(NotifyKind::Success, &message);
                Ok(outcome)
            }
            Err(error) => {
                if let Some(prior) = speculative {
                    self.cache.restore_rows(prior);
                }
                pending.set_state(MutationState::Error);
                tracing::warn!(target_name = %mutation.target, error = %error, "mutation failed");
                self.sink.notify(NotifyKind::Error, &error.to_string());
                Err(error)
            }
        }
    }

    /// The single remote call for this mutation.
    async fn remote_call(&self, mutation: &Mutation) -> Result<MutationOutcome> {
        match mutation.operation {
            Operation::Insert => self
                .client
                .insert(&mutation.target, mutation.payload.clone())
                .await
                .map(MutationOutcome::Record),
            Operation::Update => {
                let id = mutation.target_id.as_deref().ok_or(DataError::MissingId)?;
                self.client
                    .update(&mutation.target, id, mutation.payload.clone())
                    .await
                    .map(MutationOutcome::Record)
            }
            Operation::Delete => {
                let id = mutation.target_id.as_deref().ok_or(DataError::MissingId)?;
                self.client
                    .delete(&mutation.target, id)
                    .await
                    .map(|()| MutationOutcome::Deleted)
            }
            Operation::Invoke => self
                .client
                .invoke(&mutation.target, fields_to_json(&mutation.payload))
                .await
                .map(MutationOutcome::Invoked),
        }
    }

    fn apply_speculative(
        &self,
        mutation: &Mutation,
    ) -> Option<Vec<(crate::query::QueryKey, Vec<Record>)>> {
        let prior = match mutation.operation {
            Operation::Insert => {
                let mut fields = mutation.payload.clone();
                fields
                    .entry(ID_FIELD.to_string())
                    .or_insert_with(|| Value::Text(format!("optimistic-{}", Uuid::new_v4())));
                let record = Record::new(fields).ok()?;
                self.cache.apply_optimistic(&mutation.target, move |rows| {
                    let mut next = rows.to_vec();
                    next.push(record.clone());
                    next
                })
            }
            Operation::Update => {
                let id = mutation.target_id.clone()?;
                let patch = mutation.payload.clone();
                self.cache.apply_optimistic(&mutation.target, move |rows| {
                    rows.iter()
                        .map(|row| {
                            if row.id() == id {
                                row.with_fields(&patch)
                            } else {
                                row.clone()
                            }
                        })
                        .collect()
                })
            }
            Operation::Delete => {
                let id = mutation.target_id.clone()?;
                self.cache.apply_optimistic(&mutation.target, move |rows| {
                    rows.iter().filter(|row| row.id() != id).cloned().collect()
                })
            }
            // Nothing local to patch for a server-side function.
            Operation::Invoke => return None,
        };
        Some(prior)
    }
}

fn success_message(mutation: &Mutation) -> String {
    match mutation.operation {
        Operation::Insert => format!("{}: record created", mutation.target),
        Operation::Update => format!("{}: record updated", mutation.target),
        Operation::Delete => format!("{}: record deleted", mutation.target),
        Operation::Invoke => format!("{}: function completed", mutation.target),
    }
}
