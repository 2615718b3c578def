// Remote request and response types.
// Describes what the store asks of a transport and what it expects back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Item;

/// Property group always sent with catalog requests.
pub const DEFAULT_PROPERTY_GROUP: &str = "default";

/// Accept-Language value used when no language is configured.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "*";

/// Item offsets of a ranged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRange {
    /// Offset of the first item (`page * page_size`).
    pub start: usize,
    /// Maximum number of items (`pages * page_size`).
    pub max: usize,
}

/// Kind-specific part of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTarget {
    Catalog {
        /// Sorted, de-duplicated, always containing [`DEFAULT_PROPERTY_GROUP`].
        properties: Vec<String>,
    },
    Search {
        query: String,
        category: Option<String>,
        subcategory: Option<String>,
        gtin: bool,
    },
}

/// Out-of-band values sent as request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub accept_language: String,
    pub session: Option<String>,
    /// Server-issued store id, or the client placeholder before one is issued.
    pub store_id: Option<String>,
    pub geo: Option<String>,
}

/// Fully formed request handed to a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub entry_point: String,
    pub command: String,
    pub target: RequestTarget,
    pub node: Option<String>,
    pub lang: Option<String>,
    pub portal: Option<String>,
    pub space: Option<String>,
    pub order_by: Option<String>,
    /// Omitted for full fetches.
    pub range: Option<ItemRange>,
    pub metadata: RequestMetadata,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn is_search(&self) -> bool {
        matches!(self.target, RequestTarget::Search { .. })
    }
}

/// Body of a listing or search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingBody {
    #[serde(default)]
    pub elements: Vec<Item>,
    /// Total size of the remote data set.
    #[serde(default)]
    pub size: Option<usize>,
    /// Search hit count.
    #[serde(default)]
    pub hits: Option<usize>,
}

impl ListingBody {
    pub fn new(elements: Vec<Item>) -> Self {
        Self {
            elements,
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_hits(mut self, hits: usize) -> Self {
        self.hits = Some(hits);
        self
    }

    /// Reported size, or the number of returned elements.
    pub fn total(&self) -> usize {
        self.size.unwrap_or(self.elements.len())
    }

    /// Reported hits, or the total size.
    pub fn hit_count(&self) -> usize {
        self.hits.unwrap_or_else(|| self.total())
    }
}

/// A parsed transport response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    pub body: ListingBody,
    /// Store id echoed by the server.
    pub store_id: Option<String>,
}

impl FetchResponse {
    pub fn new(body: ListingBody) -> Self {
        Self {
            body,
            store_id: None,
        }
    }

    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }
}
