// ============================================================================
// recordcache Library
// ============================================================================

pub mod client;
pub mod controller;
pub mod core;
pub mod mutation;
pub mod notify;
pub mod query;
pub mod validate;

// Re-export main types for convenience
pub use crate::client::{MemoryDataClient, RemoteDataClient};
pub use crate::controller::{FormController, FormState, ListViewController, Paginator};
pub use crate::core::{DataError, DraftRecord, Record, Resource, ResourceRegistry, Result, Value};
pub use crate::mutation::{Mutation, MutationExecutor, MutationOutcome, MutationState};
pub use crate::notify::{NotificationSink, NotifyKind, TracingSink};
pub use crate::query::{CacheConfig, CacheSnapshot, Filter, KeyPredicate, QueryCache, QueryKey};

use std::sync::Arc;

// ============================================================================
// High-level Data Layer API
// ============================================================================

/// The assembled data-access layer: one cache, one mutation executor, one
/// notification sink, wired to a remote client and a resource registry.
///
/// This is the recommended entry point for applications. Pages ask it for
/// list and form controllers instead of wiring cache and executor by hand.
///
/// # Examples
///
/// ```
/// use recordcache::{DataLayer, MemoryDataClient};
/// use recordcache::core::{FieldSpec, FieldType, Resource, ResourceRegistry};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(
///     ResourceRegistry::new().register(
///         Resource::new("activities")
///             .field(FieldSpec::new("subject", FieldType::Text).required())
///             .searchable(&["subject"]),
///     ),
/// );
/// let client = Arc::new(MemoryDataClient::new(Arc::clone(&registry)));
/// let layer = DataLayer::new(client, registry);
///
/// let mut activities = layer.list("activities").unwrap();
/// let snapshot = activities.refresh().await;
/// assert!(snapshot.is_success());
/// # });
/// ```
pub struct DataLayer {
    client: Arc<dyn RemoteDataClient>,
    registry: Arc<ResourceRegistry>,
    cache: Arc<QueryCache>,
    executor: Arc<MutationExecutor>,
    sink: Arc<dyn NotificationSink>,
}

impl DataLayer {
    /// Assemble the layer with the default cache configuration and a
    /// tracing-backed notification sink.
    pub fn new(client: Arc<dyn RemoteDataClient>, registry: Arc<ResourceRegistry>) -> Self {
        Self::with_config(client, registry, CacheConfig::default(), Arc::new(TracingSink))
    }

    /// Assemble the layer with explicit cache tuning and notification sink.
    ///
    /// # Examples
    ///
    /// ```
    /// use recordcache::{CacheConfig, DataLayer, MemoryDataClient, TracingSink};
    /// use recordcache::core::{Resource, ResourceRegistry};
    /// use std::sync::Arc;
    ///
    /// let registry = Arc::new(ResourceRegistry::new().register(Resource::new("contacts")));
    /// let client = Arc::new(MemoryDataClient::new(Arc::clone(&registry)));
    /// let layer = DataLayer::with_config(
    ///     client,
    ///     registry,
    ///     CacheConfig::new().idle_capacity(16),
    ///     Arc::new(TracingSink),
    /// );
    /// assert!(layer.registry().contains("contacts"));
    /// ```
    pub fn with_config(
        client: Arc<dyn RemoteDataClient>,
        registry: Arc<ResourceRegistry>,
        config: CacheConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let cache = QueryCache::new(Arc::clone(&client), config);
        let executor = Arc::new(MutationExecutor::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            Arc::clone(&sink),
        ));
        Self {
            client,
            registry,
            cache,
            executor,
            sink,
        }
    }

    pub fn client(&self) -> &Arc<dyn RemoteDataClient> {
        &self.client
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<MutationExecutor> {
        &self.executor
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    /// Read through the cache.
    pub async fn fetch(&self, key: &QueryKey) -> CacheSnapshot {
        self.cache.get(key).await
    }

    /// Run a mutation through the executor.
    pub async fn run(&self, mutation: Mutation) -> Result<MutationOutcome> {
        self.executor.run(mutation).await
    }

    /// Mark matching cache entries stale; subscribed entries refetch.
    pub fn invalidate(&self, predicate: &KeyPredicate) {
        self.cache.invalidate(predicate);
    }

    /// List view controller over a registered resource.
    pub fn list(&self, resource: &str) -> Result<ListViewController> {
        let resource = self.registry.get(resource)?;
        Ok(ListViewController::new(Arc::clone(&self.cache), resource))
    }

    /// Form controller over a registered resource.
    pub fn form(&self, resource: &str) -> Result<FormController> {
        let resource = self.registry.get(resource)?;
        Ok(FormController::new(Arc::clone(&self.executor), resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldSpec, FieldType};

    fn layer() -> (Arc<MemoryDataClient>, DataLayer) {
        let registry = Arc::new(
            ResourceRegistry::new().register(
                Resource::new("contacts")
                    .field(FieldSpec::new("name", FieldType::Text).required())
                    .searchable(&["name"]),
            ),
        );
        let client = Arc::new(MemoryDataClient::new(Arc::clone(&registry)));
        let layer = DataLayer::new(Arc::clone(&client) as Arc<dyn RemoteDataClient>, registry);
        (client, layer)
    }

    #[tokio::test]
    async fn test_layer_wires_cache_and_executor() {
        let (client, layer) = layer();
        client
            .seed(
                "contacts",
                vec![Record::from_pairs([("id", "c1"), ("name", "Ada")]).unwrap()],
            )
            .await;

        let snapshot = layer.fetch(&QueryKey::resource("contacts")).await;
        assert_eq!(snapshot.rows.len(), 1);

        let mut payload = crate::core::FieldMap::new();
        payload.insert("name".into(), Value::from("Grace"));
        let outcome = layer
            .run(Mutation::insert("contacts", payload).invalidates_resource())
            .await
            .unwrap();
        assert!(outcome.record().is_some());

        // The insert invalidated the resource, so the next fetch re-reads.
        let snapshot = layer.fetch(&QueryKey::resource("contacts")).await;
        assert_eq!(snapshot.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_layer_rejects_unknown_resources() {
        let (_client, layer) = layer();
        assert!(matches!(
            layer.list("unknown"),
            Err(DataError::UnknownResource(_))
        ));
        assert!(matches!(
            layer.form("unknown"),
            Err(DataError::UnknownResource(_))
        ));
    }
}
