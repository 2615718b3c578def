// A single cached page.
// Pages are immutable once built and carry the time they were created locally.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Opaque record returned by the remote API.
pub type Item = serde_json::Value;

/// A run of items fetched together, replaced wholesale on merge.
#[derive(Debug, Clone)]
pub struct Page {
    /// The page items, shared with any result that handed them out.
    pub items: Arc<[Item]>,
    /// When the page was created locally.
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(items: impl Into<Arc<[Item]>>, created_at: DateTime<Utc>) -> Self {
        Self {
            items: items.into(),
            created_at,
        }
    }

    /// Check if this page is older than `timeout` at `now`.
    pub fn is_expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        let elapsed = now
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        elapsed > timeout
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
