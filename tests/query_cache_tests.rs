//! Query cache integration tests: coalescing, invalidation refetch and
//! out-of-order response handling against a scripted backend.

use async_trait::async_trait;
use recordcache::core::{DataError, FieldMap, Record, Result, Value};
use recordcache::query::{CacheConfig, FetchStatus, KeyPredicate, QueryCache, QueryKey};
use recordcache::{MemoryDataClient, RemoteDataClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::oneshot;

mod common;
use common::{activity_registry, activity_row};

/// Backend whose reads resolve only when the test says so, in whatever
/// order the test chooses.
struct ScriptedClient {
    pending: StdMutex<VecDeque<oneshot::Receiver<Result<Vec<Record>>>>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            pending: StdMutex::new(VecDeque::new()),
        }
    }

    /// Queue one read; the returned sender resolves it.
    fn script_read(&self) -> oneshot::Sender<Result<Vec<Record>>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .push_back(rx);
        tx
    }
}

#[async_trait]
impl RemoteDataClient for ScriptedClient {
    async fn read(&self, _query: &QueryKey) -> Result<Vec<Record>> {
        let rx = self
            .pending
            .lock()
            .expect("pending lock")
            .pop_front()
            .expect("read issued without a scripted response");
        rx.await
            .unwrap_or_else(|_| Err(DataError::Network("script dropped".into())))
    }

    async fn insert(&self, _resource: &str, _payload: FieldMap) -> Result<Record> {
        Err(DataError::Network("not scripted".into()))
    }

    async fn update(&self, _resource: &str, _id: &str, _payload: FieldMap) -> Result<Record> {
        Err(DataError::Network("not scripted".into()))
    }

    async fn delete(&self, _resource: &str, _id: &str) -> Result<()> {
        Err(DataError::Network("not scripted".into()))
    }

    async fn invoke(
        &self,
        _function: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Err(DataError::Network("not scripted".into()))
    }
}

#[tokio::test]
async fn test_concurrent_gets_coalesce_into_one_read() {
    let client = Arc::new(MemoryDataClient::new(activity_registry()));
    client
        .seed("activities", vec![activity_row("a1", "Call Acme", "pending")])
        .await;
    let cache = QueryCache::new(client.clone(), CacheConfig::default());
    let key = QueryKey::resource("activities");

    // Keep the backend busy so both gets overlap.
    let gate = client.hold().await;

    let first = tokio::spawn({
        let cache = Arc::clone(&cache);
        let key = key.clone();
        async move { cache.get(&key).await }
    });
    tokio::task::yield_now().await;
    let second = tokio::spawn({
        let cache = Arc::clone(&cache);
        let key = key.clone();
        async move { cache.get(&key).await }
    });
    tokio::task::yield_now().await;

    drop(gate);
    let a = first.await.unwrap();
    let b = second.await.unwrap();

    assert_eq!(a.rows.len(), 1);
    assert_eq!(b.rows.len(), 1);
    assert_eq!(a.version, b.version);
    assert_eq!(
        client.reads_for("activities"),
        1,
        "both gets share one remote read"
    );
}

#[tokio::test]
async fn test_newer_fetch_wins_regardless_of_arrival_order() {
    let client = Arc::new(ScriptedClient::new());
    let cache = QueryCache::new(client.clone(), CacheConfig::default());
    let key = QueryKey::resource("activities");

    // Subscribed, so invalidation schedules an immediate refetch.
    let _sub = cache.subscribe(&key, |_| {});

    let older = client.script_read();
    let first = tokio::spawn({
        let cache = Arc::clone(&cache);
        let key = key.clone();
        async move { cache.get(&key).await }
    });
    tokio::task::yield_now().await;

    cache.invalidate(&KeyPredicate::resource("activities"));
    let newer = client.script_read();
    tokio::task::yield_now().await;

    // The newer fetch answers first...
    newer
        .send(Ok(vec![activity_row("a2", "Email Globex", "completed")]))
        .unwrap();
    tokio::task::yield_now().await;

    // ...and the older response arrives late.
    older
        .send(Ok(vec![activity_row("a1", "Call Acme", "pending")]))
        .unwrap();
    let snapshot = first.await.unwrap();

    assert_eq!(snapshot.rows.len(), 1);
    assert_eq!(
        snapshot.rows[0].id(),
        "a2",
        "late response from the older fetch is discarded"
    );

    let cached = cache.peek(&key).unwrap();
    assert_eq!(cached.rows[0].id(), "a2");
    assert_eq!(cached.status, FetchStatus::Success);
}

#[tokio::test]
async fn test_invalidation_refetches_subscribed_entries_once() {
    let client = Arc::new(MemoryDataClient::new(activity_registry()));
    client
        .seed("activities", vec![activity_row("a1", "Call Acme", "pending")])
        .await;
    let cache = QueryCache::new(client.clone(), CacheConfig::default());
    let key = QueryKey::resource("activities");

    let versions = Arc::new(StdMutex::new(Vec::new()));
    let versions_clone = Arc::clone(&versions);
    let _sub = cache.subscribe(&key, move |snapshot| {
        versions_clone
            .lock()
            .expect("versions lock")
            .push((snapshot.version, snapshot.rows.len()));
    });

    cache.get(&key).await;
    assert_eq!(client.reads_for("activities"), 1);

    client
        .seed("activities", vec![activity_row("a2", "Email Globex", "pending")])
        .await;
    cache.invalidate(&KeyPredicate::resource("activities"));

    // Let the spawned refetch run to completion.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    assert_eq!(client.reads_for("activities"), 2, "exactly one refetch");
    let seen = versions.lock().expect("versions lock").clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].1, 2, "subscriber saw the refetched rows");
    assert!(seen[1].0 > seen[0].0, "versions are monotonic");
}

#[tokio::test]
async fn test_unobserved_invalidated_entry_waits_for_next_get() {
    let client = Arc::new(MemoryDataClient::new(activity_registry()));
    client
        .seed("activities", vec![activity_row("a1", "Call Acme", "pending")])
        .await;
    let cache = QueryCache::new(client.clone(), CacheConfig::default());
    let key = QueryKey::resource("activities");

    cache.get(&key).await;
    cache.invalidate(&KeyPredicate::resource("activities"));
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        client.reads_for("activities"),
        1,
        "nobody watches, so no eager refetch"
    );

    let snapshot = cache.get(&key).await;
    assert_eq!(client.reads_for("activities"), 2);
    assert_eq!(snapshot.status, FetchStatus::Success);
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
    let client = Arc::new(MemoryDataClient::new(activity_registry()));
    client
        .seed(
            "activities",
            vec![
                activity_row("a1", "Call Acme", "pending"),
                activity_row("a2", "Email Globex", "completed"),
            ],
        )
        .await;
    let cache = QueryCache::new(client.clone(), CacheConfig::default());

    let all = QueryKey::resource("activities");
    let completed = QueryKey::resource("activities")
        .filter(recordcache::Filter::eq("status", "completed"));

    let all_rows = cache.get(&all).await;
    let completed_rows = cache.get(&completed).await;

    assert_eq!(all_rows.rows.len(), 2);
    assert_eq!(completed_rows.rows.len(), 1);
    assert_eq!(client.reads_for("activities"), 2);

    // Identical parameters map back to the same entry.
    let again = cache
        .get(&QueryKey::resource("activities").filter(recordcache::Filter::eq(
            "status",
            Value::from("completed"),
        )))
        .await;
    assert_eq!(again.version, completed_rows.version);
    assert_eq!(client.reads_for("activities"), 2);
}
