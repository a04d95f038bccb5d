//! Keyed cache of read results.
//!
//! One entry per `QueryKey`, holding the last fetched rows, fetch status
//! and a monotonic version counter. Concurrent reads of the same key
//! coalesce onto one remote call; out-of-order responses are discarded by
//! sequence check, so the newest issued fetch always wins regardless of
//! arrival order. Entries nobody subscribes to demote to a bounded LRU
//! side-cache and may be evicted.
//!
//! The cache is the only thing that mutates cached rows. Controllers read
//! snapshots and subscribe; mutations go through the executor, which only
//! ever asks the cache to invalidate.

use crate::client::RemoteDataClient;
use crate::core::{DataError, Record, Result};
use crate::query::entry::{CacheSnapshot, FetchStatus};
use crate::query::key::{KeyPredicate, QueryKey};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::oneshot;

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How many unobserved entries to keep around before evicting the
    /// least recently used one.
    pub idle_capacity: NonZeroUsize,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_capacity(mut self, capacity: usize) -> Self {
        self.idle_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // Enough for a screenful of list views plus recent history.
            idle_capacity: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

type SubscriberCallback = Arc<dyn Fn(&CacheSnapshot) + Send + Sync>;

#[derive(Default)]
struct Entry {
    rows: Vec<Record>,
    status: FetchStatus,
    error: Option<DataError>,
    version: u64,
    stale: bool,
    /// Sequence number of the newest issued fetch for this key.
    last_issued: u64,
    /// Sequence number of the newest applied response.
    last_applied: u64,
    inflight: u32,
    waiters: Vec<oneshot::Sender<()>>,
    subscribers: HashMap<u64, SubscriberCallback>,
}

impl Entry {
    fn snapshot(&self, key: &QueryKey) -> CacheSnapshot {
        CacheSnapshot {
            key: key.clone(),
            rows: self.rows.clone(),
            status: self.status,
            version: self.version,
            error: self.error.clone(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.status == FetchStatus::Success && !self.stale && self.inflight == 0
    }

    fn observed(&self) -> bool {
        !self.subscribers.is_empty()
    }
}

struct CacheInner {
    /// Entries that are observed or have work in flight.
    active: HashMap<QueryKey, Entry>,
    /// Unobserved entries, bounded; evicted least-recently-used first.
    idle: LruCache<QueryKey, Entry>,
    next_subscriber_id: u64,
}

impl CacheInner {
    /// Look up an entry, promoting it out of the idle LRU (or creating it)
    /// so the caller can work on it in `active`.
    fn entry_mut(&mut self, key: &QueryKey) -> &mut Entry {
        if !self.active.contains_key(key) {
            let entry = self.idle.pop(key).unwrap_or_default();
            self.active.insert(key.clone(), entry);
        }
        self.active
            .get_mut(key)
            .expect("entry inserted above")
    }

    /// Move an entry back to the idle LRU once nothing references it.
    fn maybe_demote(&mut self, key: &QueryKey) {
        let demote = self
            .active
            .get(key)
            .is_some_and(|entry| !entry.observed() && entry.inflight == 0);
        if demote && let Some(entry) = self.active.remove(key) {
            self.idle.put(key.clone(), entry);
        }
    }
}

enum GetAction {
    Cached(CacheSnapshot),
    Join(oneshot::Receiver<()>),
    Fetch(u64, oneshot::Receiver<()>),
}

/// Process-wide read cache. Constructed once at startup and injected into
/// the executor and controllers; see [`QueryCache::new`].
pub struct QueryCache {
    client: Arc<dyn RemoteDataClient>,
    inner: StdMutex<CacheInner>,
    self_ref: Weak<QueryCache>,
}

impl QueryCache {
    pub fn new(client: Arc<dyn RemoteDataClient>, config: CacheConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            client,
            inner: StdMutex::new(CacheInner {
                active: HashMap::new(),
                idle: LruCache::new(config.idle_capacity),
                next_subscriber_id: 1,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Current snapshot for the key, fetching if the entry is missing,
    /// stale or errored. A `get` while the same key is already being
    /// fetched attaches to that fetch instead of issuing a second read.
    pub async fn get(&self, key: &QueryKey) -> CacheSnapshot {
        let action = {
            let mut inner = self.lock();
            let entry = inner.entry_mut(key);
            if entry.is_fresh() {
                GetAction::Cached(entry.snapshot(key))
            } else if entry.inflight > 0 {
                let (tx, rx) = oneshot::channel();
                entry.waiters.push(tx);
                GetAction::Join(rx)
            } else {
                entry.inflight += 1;
                entry.last_issued += 1;
                entry.status = FetchStatus::Loading;
                let (tx, rx) = oneshot::channel();
                entry.waiters.push(tx);
                GetAction::Fetch(entry.last_issued, rx)
            }
        };

        match action {
            GetAction::Cached(snapshot) => snapshot,
            GetAction::Join(rx) => {
                // Either the fetch completes and wakes us, or its task was
                // dropped; both ways the entry now holds the latest state.
                let _ = rx.await;
                self.snapshot_now(key)
            }
            GetAction::Fetch(fetch_id, rx) => {
                // The read runs on a detached task: a caller that goes away
                // mid-fetch (dropped future, aborted task) cannot strand the
                // entry in loading or leave the other waiters parked.
                tracing::debug!(key = %key, fetch_id, "issuing fetch");
                if let Some(cache) = self.self_ref.upgrade() {
                    let key = key.clone();
                    tokio::spawn(async move {
                        let result = cache.client.read(&key).await;
                        cache.apply(&key, fetch_id, result);
                    });
                }
                let _ = rx.await;
                self.snapshot_now(key)
            }
        }
    }

    /// Non-fetching snapshot read; None when the key was never fetched or
    /// has been evicted.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheSnapshot> {
        let inner = self.lock();
        inner
            .active
            .get(key)
            .or_else(|| inner.idle.peek(key))
            .map(|entry| entry.snapshot(key))
    }

    /// Mark every matching entry stale. Entries somebody subscribes to get
    /// exactly one refetch scheduled immediately (status flips to loading
    /// before this returns); unobserved entries refetch on their next
    /// `get`.
    pub fn invalidate(&self, predicate: &KeyPredicate) {
        let refetches = {
            let mut inner = self.lock();
            let mut refetches = Vec::new();
            for (key, entry) in inner.active.iter_mut() {
                if !predicate.matches(key) {
                    continue;
                }
                entry.stale = true;
                if entry.observed() {
                    entry.status = FetchStatus::Loading;
                    entry.inflight += 1;
                    entry.last_issued += 1;
                    refetches.push((key.clone(), entry.last_issued));
                }
            }
            for (key, entry) in inner.idle.iter_mut() {
                if predicate.matches(key) {
                    entry.stale = true;
                }
            }
            refetches
        };

        if refetches.is_empty() {
            return;
        }
        let Some(cache) = self.self_ref.upgrade() else {
            return;
        };
        for (key, fetch_id) in refetches {
            tracing::debug!(key = %key, fetch_id, "invalidation refetch");
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let result = cache.client.read(&key).await;
                cache.apply(&key, fetch_id, result);
            });
        }
    }

    /// Register a callback fired with a fresh snapshot on every version
    /// change of the key's entry. The returned guard unsubscribes on drop;
    /// hold it for as long as the view is alive.
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe<F>(&self, key: &QueryKey, callback: F) -> Subscription
    where
        F: Fn(&CacheSnapshot) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner
            .entry_mut(key)
            .subscribers
            .insert(id, Arc::new(callback));
        Subscription {
            cache: self.self_ref.clone(),
            key: key.clone(),
            id,
        }
    }

    /// Speculatively patch the rows of every entry for the resource and
    /// return the prior rows so the executor can roll back on error.
    pub(crate) fn apply_optimistic<F>(&self, resource: &str, patch: F) -> Vec<(QueryKey, Vec<Record>)>
    where
        F: Fn(&[Record]) -> Vec<Record>,
    {
        let (prior, notifications) = {
            let mut inner = self.lock();
            let mut prior = Vec::new();
            let mut notifications = Vec::new();
            for (key, entry) in inner.active.iter_mut() {
                if key.resource != resource || entry.status != FetchStatus::Success {
                    continue;
                }
                prior.push((key.clone(), entry.rows.clone()));
                entry.rows = patch(&entry.rows);
                entry.version += 1;
                let snapshot = entry.snapshot(key);
                let callbacks: Vec<SubscriberCallback> =
                    entry.subscribers.values().cloned().collect();
                notifications.push((snapshot, callbacks));
            }
            // Idle entries hold rows too; a peek (or promotion on the next
            // get) must see the same speculative state. No subscribers to
            // notify there by construction.
            for (key, entry) in inner.idle.iter_mut() {
                if key.resource != resource || entry.status != FetchStatus::Success {
                    continue;
                }
                prior.push((key.clone(), entry.rows.clone()));
                entry.rows = patch(&entry.rows);
                entry.version += 1;
            }
            (prior, notifications)
        };
        for (snapshot, callbacks) in notifications {
            for callback in callbacks {
                callback(&snapshot);
            }
        }
        prior
    }

    /// Undo a speculative patch: restore the saved rows wholesale.
    pub(crate) fn restore_rows(&self, prior: Vec<(QueryKey, Vec<Record>)>) {
        let notifications = {
            let mut inner = self.lock();
            let mut notifications = Vec::new();
            for (key, rows) in prior {
                if let Some(entry) = inner.active.get_mut(&key) {
                    entry.rows = rows;
                    entry.version += 1;
                    let snapshot = entry.snapshot(&key);
                    let callbacks: Vec<SubscriberCallback> =
                        entry.subscribers.values().cloned().collect();
                    notifications.push((snapshot, callbacks));
                } else if let Some(entry) = inner.idle.get_mut(&key) {
                    entry.rows = rows;
                    entry.version += 1;
                }
            }
            notifications
        };
        for (snapshot, callbacks) in notifications {
            for callback in callbacks {
                callback(&snapshot);
            }
        }
    }

    /// Record a finished fetch. The response is applied only if it is
    /// newer than the last applied one; a response that lost the race is
    /// dropped on the floor ("last version wins").
    fn apply(&self, key: &QueryKey, fetch_id: u64, result: Result<Vec<Record>>) -> CacheSnapshot {
        let (snapshot, waiters, callbacks) = {
            let mut inner = self.lock();
            let entry = inner.entry_mut(key);
            entry.inflight = entry.inflight.saturating_sub(1);

            let applied = fetch_id > entry.last_applied;
            if applied {
                entry.last_applied = fetch_id;
                match result {
                    Ok(rows) => {
                        entry.rows = rows;
                        entry.status = FetchStatus::Success;
                        entry.error = None;
                        entry.stale = false;
                    }
                    Err(error) => {
                        // Keep previously successful rows; the view shows
                        // them with an error indicator.
                        entry.status = FetchStatus::Error;
                        entry.error = Some(error);
                    }
                }
                entry.version += 1;
            } else {
                tracing::debug!(key = %key, fetch_id, "discarding superseded response");
            }

            let waiters = std::mem::take(&mut entry.waiters);
            let callbacks: Vec<SubscriberCallback> = if applied {
                entry.subscribers.values().cloned().collect()
            } else {
                Vec::new()
            };
            let snapshot = entry.snapshot(key);
            inner.maybe_demote(key);
            (snapshot, waiters, callbacks)
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }
        for callback in callbacks {
            callback(&snapshot);
        }
        snapshot
    }

    fn snapshot_now(&self, key: &QueryKey) -> CacheSnapshot {
        self.peek(key).unwrap_or(CacheSnapshot {
            key: key.clone(),
            rows: Vec::new(),
            status: FetchStatus::Idle,
            version: 0,
            error: None,
        })
    }

    fn unsubscribe(&self, key: &QueryKey, id: u64) {
        let mut inner = self.lock();
        if let Some(entry) = inner.active.get_mut(key) {
            entry.subscribers.remove(&id);
        }
        inner.maybe_demote(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Lock sections are short and never held across an await; on
        // poison, recover the inner state rather than cascading panics.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// RAII handle for one subscription; dropping it releases the callback.
pub struct Subscription {
    cache: Weak<QueryCache>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(&self.key, self.id);
        }
    }
}
