//! Cache entry state and the snapshots handed to callers.

use crate::core::{DataError, Record};
use crate::query::QueryKey;

/// Fetch lifecycle of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Immutable view of one cache entry at a point in time.
///
/// A failed refetch keeps the previously successful rows, so a snapshot can
/// carry rows and an error at once; the view shows stale data with an
/// error indicator.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub key: QueryKey,
    pub rows: Vec<Record>,
    pub status: FetchStatus,
    pub version: u64,
    pub error: Option<DataError>,
}

impl CacheSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
