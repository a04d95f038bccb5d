//! List view controller.
//!
//! Combines a cache-backed read with search/filter/pagination state and
//! derives the query key deterministically from that state. Rows come back
//! in server order; client-side quick filters and text search reduce the
//! visible set without reordering it. Aggregates are computed over the
//! currently loaded window only, never server-side.

use crate::core::{Record, Resource, Value};
use crate::query::{
    CacheSnapshot, Filter, Page, QueryCache, QueryKey, SortSpec, Subscription,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Page navigation state: 1-based current page, clamped moves, and the
/// offset window handed to the remote client.
#[derive(Debug, Clone)]
pub struct Paginator {
    current_page: usize,
    page_size: usize,
    total_items: usize,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
            total_items: 0,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }

    /// Jump to a page, clamped into `1..=total_pages`.
    pub fn go_to_page(&mut self, page: usize) {
        let last = self.total_pages().max(1);
        self.current_page = page.clamp(1, last);
    }

    pub fn next_page(&mut self) {
        if self.current_page < self.total_pages() {
            self.current_page += 1;
        }
    }

    pub fn prev_page(&mut self) {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.current_page = 1;
    }

    pub fn set_total_items(&mut self, total: usize) {
        self.total_items = total;
    }

    /// First row index of the current page.
    pub fn range_start(&self) -> usize {
        (self.current_page - 1) * self.page_size
    }

    /// Last row index of the current page, inclusive.
    pub fn range_end(&self) -> usize {
        self.current_page * self.page_size - 1
    }

    /// Grow the known total from an observed window. The total is an
    /// approximation: without a server-side count it only ever reflects
    /// what has been seen.
    pub fn observe_window(&mut self, offset: usize, len: usize) {
        self.total_items = self.total_items.max(offset + len);
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

pub struct ListViewController {
    cache: Arc<QueryCache>,
    resource: Arc<Resource>,
    /// Server-side filters, part of the query key.
    filters: Vec<Filter>,
    /// Client-side filters applied to loaded rows, never sent remotely.
    quick_filters: Vec<Filter>,
    sort: Option<SortSpec>,
    search_text: String,
    pager: Paginator,
    shared: Arc<StdMutex<Option<CacheSnapshot>>>,
    subscription: Option<Subscription>,
}

impl ListViewController {
    pub fn new(cache: Arc<QueryCache>, resource: Arc<Resource>) -> Self {
        Self {
            cache,
            resource,
            filters: Vec::new(),
            quick_filters: Vec::new(),
            sort: None,
            search_text: String::new(),
            pager: Paginator::default(),
            shared: Arc::new(StdMutex::new(None)),
            subscription: None,
        }
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.pager = Paginator::new(size);
        self
    }

    /// The key this controller currently reads through, derived from
    /// resource + filters + search + sort + page.
    pub fn query_key(&self) -> QueryKey {
        let mut key = QueryKey::resource(self.resource.name());
        for filter in &self.filters {
            key = key.filter(filter.clone());
        }
        if !self.search_text.trim().is_empty() && !self.resource.search_fields().is_empty() {
            key = key.search(self.resource.search_fields().to_vec(), self.search_text.trim());
        }
        if let Some(sort) = &self.sort {
            key = key.sort(sort.clone());
        }
        key.page(Page::new(self.pager.range_start(), self.pager.page_size()))
    }

    /// Recompute the key, read through the cache and resubscribe so
    /// invalidation refetches keep this view current.
    pub async fn refresh(&mut self) -> CacheSnapshot {
        let key = self.query_key();

        let key_changed = self
            .subscription
            .as_ref()
            .is_none_or(|sub| sub.key() != &key);
        if key_changed {
            let shared = Arc::clone(&self.shared);
            // Replacing the guard drops the old subscription.
            self.subscription = Some(self.cache.subscribe(&key, move |snapshot| {
                if let Ok(mut slot) = shared.lock() {
                    *slot = Some(snapshot.clone());
                }
            }));
        }

        let snapshot = self.cache.get(&key).await;
        self.pager
            .observe_window(self.pager.range_start(), snapshot.rows.len());
        if let Ok(mut slot) = self.shared.lock() {
            *slot = Some(snapshot.clone());
        }
        snapshot
    }

    pub async fn set_filters(&mut self, filters: Vec<Filter>) -> CacheSnapshot {
        self.filters = filters;
        // A changed filter set invalidates the observed total; it regrows
        // from the windows the new key actually returns.
        self.pager.set_total_items(0);
        self.pager.go_to_page(1);
        self.refresh().await
    }

    pub async fn set_sort(&mut self, sort: Option<SortSpec>) -> CacheSnapshot {
        self.sort = sort;
        self.refresh().await
    }

    pub async fn set_search(&mut self, text: impl Into<String>) -> CacheSnapshot {
        self.search_text = text.into();
        self.pager.set_total_items(0);
        self.pager.go_to_page(1);
        self.refresh().await
    }

    pub async fn go_to_page(&mut self, page: usize) -> CacheSnapshot {
        self.pager.go_to_page(page);
        self.refresh().await
    }

    pub async fn next_page(&mut self) -> CacheSnapshot {
        self.pager.next_page();
        self.refresh().await
    }

    /// Client-side equality filter over the loaded rows. Does not change
    /// the query key and never reorders rows.
    pub fn set_quick_filter(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.quick_filters = vec![Filter::eq(field, value)];
    }

    pub fn clear_quick_filters(&mut self) {
        self.quick_filters.clear();
    }

    pub fn pager(&self) -> &Paginator {
        &self.pager
    }

    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.shared.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot().is_some_and(|s| s.is_loading())
    }

    pub fn error(&self) -> Option<String> {
        self.snapshot().and_then(|s| s.error_message())
    }

    /// Loaded rows after client-side quick filters and search, in server
    /// response order.
    pub fn rows(&self) -> Vec<Record> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        let needle = self.search_text.trim().to_string();
        snapshot
            .rows
            .into_iter()
            .filter(|row| self.matches_quick_filters(row))
            .filter(|row| self.matches_search(row, &needle))
            .collect()
    }

    /// Number of rows visible after client-side filtering.
    pub fn count(&self) -> usize {
        self.rows().len()
    }

    /// Counts of visible rows grouped by a field's display value.
    /// Reflects only the currently loaded window, not the full resource.
    pub fn count_by(&self, field: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in self.rows() {
            let label = row
                .get(field)
                .map(ToString::to_string)
                .unwrap_or_else(|| "NULL".to_string());
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    fn matches_quick_filters(&self, row: &Record) -> bool {
        self.quick_filters.iter().all(|filter| {
            row.get(&filter.field)
                .is_some_and(|value| *value == filter.value)
        })
    }

    fn matches_search(&self, row: &Record, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let fields = self.resource.search_fields();
        if fields.is_empty() {
            // No declared search fields: scan every field.
            return row.fields().values().any(|v| v.contains_text(needle));
        }
        fields
            .iter()
            .filter_map(|field| row.get(field))
            .any(|value| value.contains_text(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginator_clamps_navigation() {
        let mut pager = Paginator::new(10);
        pager.set_total_items(35);

        assert_eq!(pager.total_pages(), 4);

        pager.go_to_page(99);
        assert_eq!(pager.current_page(), 4);

        pager.go_to_page(0);
        assert_eq!(pager.current_page(), 1);

        pager.next_page();
        assert_eq!(pager.current_page(), 2);
        assert_eq!(pager.range_start(), 10);
        assert_eq!(pager.range_end(), 19);

        pager.prev_page();
        pager.prev_page();
        assert_eq!(pager.current_page(), 1, "prev stops at the first page");
    }

    #[test]
    fn test_paginator_page_size_resets_to_first_page() {
        let mut pager = Paginator::new(10);
        pager.set_total_items(100);
        pager.go_to_page(5);

        pager.set_page_size(25);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.total_pages(), 4);
    }

    #[test]
    fn test_paginator_observes_windows() {
        let mut pager = Paginator::new(10);
        pager.observe_window(0, 10);
        assert_eq!(pager.total_items(), 10);

        pager.observe_window(10, 4);
        assert_eq!(pager.total_items(), 14);

        // A smaller window never shrinks the known total.
        pager.observe_window(0, 3);
        assert_eq!(pager.total_items(), 14);
    }
}
