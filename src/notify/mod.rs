//! Notification sink.
//!
//! Outcome surface for mutations and form submissions. The sink has no
//! retry or queuing semantics; it is fire-and-forget from this layer's
//! point of view.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Routes notifications into structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Error => tracing::warn!(kind = %kind, "{message}"),
            _ => tracing::info!(kind = %kind, "{message}"),
        }
    }
}

/// Records notifications for later inspection. Test helper.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<(NotifyKind, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(NotifyKind, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn count_of(&self, kind: NotifyKind) -> usize {
        self.entries()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, kind: NotifyKind, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((kind, message.to_string()));
        }
    }
}
