//! In-memory reference backend.
//!
//! Stand-in for the hosted backend: tables are plain record vectors, ids
//! are uuid v4, declared timestamp columns are stamped on write, and the
//! full validation chain runs before a write is accepted (this is the
//! "server-rejected constraint" path). Carries read counters and a hold
//! gate so tests can observe coalescing and response ordering.

use crate::client::RemoteDataClient;
use crate::core::{
    DataError, FieldMap, FieldType, ID_FIELD, Record, ResourceRegistry, Result, Value,
};
use crate::query::{FilterOp, QueryKey};
use crate::validate::{RecordValidator, WriteMode};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

pub struct MemoryDataClient {
    registry: Arc<ResourceRegistry>,
    validator: RecordValidator,
    tables: RwLock<HashMap<String, Vec<Record>>>,
    /// Every operation acquires this before touching tables. Tests hold it
    /// to keep a call in flight.
    gate: Mutex<()>,
    reads_by_resource: StdMutex<HashMap<String, usize>>,
    total_reads: AtomicUsize,
    injected_failures: StdMutex<VecDeque<DataError>>,
    invocations: StdMutex<Vec<(String, serde_json::Value)>>,
    invoke_responses: StdMutex<HashMap<String, serde_json::Value>>,
}

impl MemoryDataClient {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            validator: RecordValidator::new(),
            tables: RwLock::new(HashMap::new()),
            gate: Mutex::new(()),
            reads_by_resource: StdMutex::new(HashMap::new()),
            total_reads: AtomicUsize::new(0),
            injected_failures: StdMutex::new(VecDeque::new()),
            invocations: StdMutex::new(Vec::new()),
            invoke_responses: StdMutex::new(HashMap::new()),
        }
    }

    /// Seed a table without going through validation. Rows keep the given
    /// order; reads return them in insertion order.
    pub async fn seed(&self, resource: &str, rows: Vec<Record>) {
        let mut tables = self.tables.write().await;
        tables.entry(resource.to_string()).or_default().extend(rows);
    }

    /// Number of `read` calls served so far, across all resources.
    pub fn total_reads(&self) -> usize {
        self.total_reads.load(AtomicOrdering::SeqCst)
    }

    /// Number of `read` calls served for one resource.
    pub fn reads_for(&self, resource: &str) -> usize {
        self.reads_by_resource
            .lock()
            .map(|counts| counts.get(resource).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Hold the backend gate; reads and writes block until the guard is
    /// dropped.
    pub async fn hold(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Queue an error; the next operation fails with it instead of running.
    pub fn inject_failure(&self, error: DataError) {
        if let Ok(mut failures) = self.injected_failures.lock() {
            failures.push_back(error);
        }
    }

    /// Canned response for a named server-side function.
    pub fn set_invoke_response(&self, function: &str, response: serde_json::Value) {
        if let Ok(mut responses) = self.invoke_responses.lock() {
            responses.insert(function.to_string(), response);
        }
    }

    /// Every `invoke` call observed so far.
    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.invocations
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> Option<DataError> {
        self.injected_failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.pop_front())
    }

    fn count_read(&self, resource: &str) {
        self.total_reads.fetch_add(1, AtomicOrdering::SeqCst);
        if let Ok(mut counts) = self.reads_by_resource.lock() {
            *counts.entry(resource.to_string()).or_insert(0) += 1;
        }
    }

    fn stamp(&self, resource: &str, fields: &mut FieldMap, column: &str) {
        let Ok(spec) = self.registry.get(resource) else {
            return;
        };
        let declared = spec
            .field_spec(column)
            .is_some_and(|f| f.field_type == FieldType::Timestamp);
        if declared {
            fields.insert(column.to_string(), Value::Timestamp(Utc::now()));
        }
    }
}

#[async_trait]
impl RemoteDataClient for MemoryDataClient {
    async fn read(&self, query: &QueryKey) -> Result<Vec<Record>> {
        let _gate = self.gate.lock().await;
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        if !self.registry.contains(&query.resource) {
            return Err(DataError::UnknownResource(query.resource.clone()));
        }
        self.count_read(&query.resource);

        let tables = self.tables.read().await;
        let rows = tables.get(&query.resource).cloned().unwrap_or_default();
        drop(tables);

        let mut matched = Vec::with_capacity(rows.len());
        for row in rows {
            if matches_all(&row, query)? {
                matched.push(row);
            }
        }

        if let Some(sort) = &query.sort {
            // Stable sort preserves relative order of ties.
            matched.sort_by(|a, b| {
                let left = a.get(&sort.field).unwrap_or(&Value::Null);
                let right = b.get(&sort.field).unwrap_or(&Value::Null);
                let ordering = left.compare(right).unwrap_or(Ordering::Equal);
                match sort.dir {
                    crate::query::SortDir::Asc => ordering,
                    crate::query::SortDir::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(page) = &query.page {
            matched = matched
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .collect();
        }

        Ok(matched)
    }

    async fn insert(&self, resource: &str, mut payload: FieldMap) -> Result<Record> {
        let _gate = self.gate.lock().await;
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        let spec = self.registry.get(resource)?;
        self.validator
            .validate(&spec, &strip_id(&payload), WriteMode::Insert)?;

        let id = match payload.get(ID_FIELD) {
            Some(Value::Text(s)) if !s.trim().is_empty() => s.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        payload.insert(ID_FIELD.to_string(), Value::Text(id.clone()));
        self.stamp(resource, &mut payload, CREATED_AT);
        self.stamp(resource, &mut payload, UPDATED_AT);

        let record = Record::new(payload)?;

        let mut tables = self.tables.write().await;
        let table = tables.entry(resource.to_string()).or_default();
        if table.iter().any(|row| row.id() == id) {
            return Err(DataError::Conflict(format!(
                "duplicate id '{id}' in '{resource}'"
            )));
        }
        table.push(record.clone());

        tracing::debug!(resource, id = %record.id(), "inserted record");
        Ok(record)
    }

    async fn update(&self, resource: &str, id: &str, payload: FieldMap) -> Result<Record> {
        let _gate = self.gate.lock().await;
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        let spec = self.registry.get(resource)?;
        self.validator
            .validate(&spec, &strip_id(&payload), WriteMode::Update)?;

        let mut patch = payload;
        self.stamp(resource, &mut patch, UPDATED_AT);

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(resource)
            .ok_or_else(|| DataError::not_found(resource, id))?;
        let slot = table
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or_else(|| DataError::not_found(resource, id))?;

        // Wholesale replacement: readers never observe a partial update.
        let replaced = slot.with_fields(&patch);
        *slot = replaced.clone();

        tracing::debug!(resource, id, "updated record");
        Ok(replaced)
    }

    async fn delete(&self, resource: &str, id: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        self.registry.get(resource)?;

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(resource)
            .ok_or_else(|| DataError::not_found(resource, id))?;
        let before = table.len();
        table.retain(|row| row.id() != id);
        if table.len() == before {
            return Err(DataError::not_found(resource, id));
        }

        tracing::debug!(resource, id, "deleted record");
        Ok(())
    }

    async fn invoke(
        &self,
        function: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if let Some(error) = self.take_injected_failure() {
            return Err(error);
        }
        if let Ok(mut log) = self.invocations.lock() {
            log.push((function.to_string(), payload));
        }
        let response = self
            .invoke_responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(function).cloned())
            .unwrap_or_else(|| serde_json::json!({ "ok": true }));
        Ok(response)
    }
}

fn strip_id(payload: &FieldMap) -> FieldMap {
    let mut copy = payload.clone();
    copy.remove(ID_FIELD);
    copy
}

fn matches_all(row: &Record, query: &QueryKey) -> Result<bool> {
    for filter in &query.filters {
        let value = row.get(&filter.field).unwrap_or(&Value::Null);
        if !matches_filter(value, filter.op, &filter.value)? {
            return Ok(false);
        }
    }
    if let Some(search) = &query.search
        && !search.text.trim().is_empty()
    {
        let hit = search
            .fields
            .iter()
            .filter_map(|field| row.get(field))
            .any(|value| value.contains_text(search.text.trim()));
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_filter(value: &Value, op: FilterOp, target: &Value) -> Result<bool> {
    // Eq/Ne coerce across numeric types through compare(), so a Float(2.0)
    // target matches a stored Integer(2). Incomparable types are simply
    // not equal rather than an error.
    let coerced_eq = || {
        value
            .compare(target)
            .map(|ordering| ordering == Ordering::Equal)
            .unwrap_or(false)
    };
    match op {
        FilterOp::Eq => Ok(coerced_eq()),
        FilterOp::Ne => Ok(!coerced_eq()),
        FilterOp::Contains => Ok(value.contains_text(&target.to_string())),
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            if value.is_null() {
                return Ok(false);
            }
            let ordering = value.compare(target)?;
            Ok(match op {
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Lte => ordering != Ordering::Greater,
                _ => unreachable!(),
            })
        }
    }
}
