//! Remote data client boundary.
//!
//! The cache and the executor never talk to a backend directly; they go
//! through this trait. Production code plugs in whatever SDK reaches the
//! hosted backend; tests and demos use [`MemoryDataClient`].

mod memory;

pub use memory::MemoryDataClient;

use crate::core::{FieldMap, Record, Result};
use crate::query::QueryKey;
use async_trait::async_trait;

/// CRUD surface of the hosted backend, plus `invoke` for server-side
/// functions (email, payments, webhooks) that are opaque to this layer.
#[async_trait]
pub trait RemoteDataClient: Send + Sync {
    /// Filtered, sorted, paginated read of one resource.
    async fn read(&self, query: &QueryKey) -> Result<Vec<Record>>;

    /// Insert one record; the backend assigns the id when absent.
    async fn insert(&self, resource: &str, payload: FieldMap) -> Result<Record>;

    /// Partial update of one record by id; returns the replaced record.
    async fn update(&self, resource: &str, id: &str, payload: FieldMap) -> Result<Record>;

    /// Delete one record by id.
    async fn delete(&self, resource: &str, id: &str) -> Result<()>;

    /// Call a named server-side function. No cache contract beyond what
    /// the calling mutation declares.
    async fn invoke(&self, function: &str, payload: serde_json::Value)
    -> Result<serde_json::Value>;
}
