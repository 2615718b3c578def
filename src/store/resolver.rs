// Result resolution.
// Turns the cached window into the caller-visible page result, or a failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Item;
use crate::error::{Result, StoreError, TransportError};

use super::state::StoreState;

/// Pages handed back by `get_page`.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    /// Absolute index of the first returned page.
    pub first_page: usize,
    /// Total pages of the remote data set.
    pub page_count: usize,
    pub page_size: usize,
    /// Total items of the remote data set.
    pub item_count: usize,
    pub hit_count: usize,
    /// Consecutive pages from `first_page`; may be shorter than requested.
    pub pages: Vec<Arc<[Item]>>,
}

impl PageResult {
    /// All returned items in order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.pages.iter().flat_map(|page| page.iter())
    }

    pub fn item_len(&self) -> usize {
        self.pages.iter().map(|page| page.len()).sum()
    }
}

/// Build the result for `max_pages` pages from `start`.
///
/// With `fallback` set, stale pages are acceptable when `use_old_on_error` is
/// enabled, and a missing head page is a failure reported as `failure` when
/// given. Outside fallback, only a start beyond the known page count fails.
pub(crate) fn resolve(
    state: &StoreState,
    now: DateTime<Utc>,
    start: usize,
    max_pages: usize,
    fallback: bool,
    failure: Option<TransportError>,
) -> Result<PageResult> {
    let allow_old = fallback && state.config.use_old_on_error;
    let beyond_end = !state.first_fetch && start >= state.remote.page_count.max(1);

    if (beyond_end || fallback) && !state.is_loaded(start, 1, allow_old, now) {
        return Err(match failure {
            Some(err) => StoreError::Fetch(err),
            None => StoreError::OutOfRange {
                first_page: start,
                page_count: state.remote.page_count,
            },
        });
    }

    let pages = (start..start.saturating_add(max_pages.max(1)))
        .take_while(|&page_id| state.is_loaded(page_id, 1, allow_old, now))
        .filter_map(|page_id| state.window.page(page_id))
        .map(|page| Arc::clone(&page.items))
        .collect();

    Ok(PageResult {
        first_page: start,
        page_count: state.remote.page_count,
        page_size: state.config.page_size,
        item_count: state.remote.item_count,
        hit_count: state.remote.hit_count,
        pages,
    })
}
