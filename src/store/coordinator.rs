// Request coordination.
// Validates configuration, plans the real fetch range, builds descriptors and applies responses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::remote::{
    DEFAULT_ACCEPT_LANGUAGE, DEFAULT_PROPERTY_GROUP, FetchRequest, FetchResponse, ItemRange,
    RequestMetadata, RequestTarget,
};

use super::state::{RemoteState, StoreState};

/// What a dispatched request needs to remember until its response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub generation: u64,
    /// Whether a caller awaits this request.
    pub blocking: bool,
    /// Page range the caller asked for.
    pub start: usize,
    pub max_pages: usize,
    /// First page of the range actually requested.
    pub fetch_start: usize,
    pub full_fetch: bool,
}

impl InFlight {
    /// Page range to resolve once the outcome is known.
    pub fn result_range(&self) -> (usize, usize) {
        if self.full_fetch {
            (0, 1)
        } else {
            (self.start, self.max_pages)
        }
    }
}

/// Check that every field the request needs is configured.
pub(crate) fn validate(command: &str, config: &StoreConfig) -> Result<()> {
    let mut missing = Vec::new();

    if command.is_empty() {
        missing.push("command");
    }
    if config.is_search() {
        if config.search_entry_point.is_none() {
            missing.push("search_entry_point");
        }
    } else if config.entry_point.is_none() {
        missing.push("entry_point");
    }

    let required = [
        (config.require_node, config.node.is_none(), "node"),
        (config.require_portal, config.portal.is_none(), "portal"),
        (config.require_space, config.space.is_none(), "space"),
        (config.require_language, config.language.is_none(), "language"),
    ];
    for (required, absent, field) in required {
        if required && absent {
            missing.push(field);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::ArgumentMissing(missing))
    }
}

/// Widen a requested page range into the range actually fetched.
pub(crate) fn plan_range(
    state: &StoreState,
    now: DateTime<Utc>,
    start: usize,
    max_pages: usize,
) -> (usize, usize) {
    let (mut start, mut count) = (start, max_pages.max(1));
    let fetch_pages = state.config.fetch_pages;

    let bulk = state.first_fetch || (state.window.is_empty() && state.remote.item_count > 0);
    if bulk && start.saturating_add(count) <= fetch_pages {
        start = 0;
        count = fetch_pages;
    }

    if state.config.prefetch {
        if start > 0 && !state.is_loaded(start - 1, 1, false, now) {
            start -= 1;
            count = count.saturating_add(1);
        }
        let after = start.saturating_add(count);
        if after < state.remote.page_count && !state.is_loaded(after, 1, false, now) {
            count += 1;
        }
    }

    (start, count)
}

/// Pick the neighbour of a cache hit worth preloading, next page first.
pub(crate) fn prefetch_neighbour(
    state: &StoreState,
    now: DateTime<Utc>,
    start: usize,
    max_pages: usize,
) -> Option<usize> {
    if state.config.full_fetch {
        return None;
    }
    let next = start.saturating_add(max_pages);
    if next < state.remote.page_count && !state.is_loaded(next, 1, false, now) {
        return Some(next);
    }
    if start > 0 && !state.is_loaded(start - 1, 1, false, now) {
        return Some(start - 1);
    }
    None
}

/// Catalog property groups: sorted, de-duplicated, default group included.
fn property_list(properties: &BTreeSet<String>) -> Vec<String> {
    let mut groups: BTreeSet<&str> = properties.iter().map(String::as_str).collect();
    groups.insert(DEFAULT_PROPERTY_GROUP);
    groups.into_iter().map(str::to_string).collect()
}

/// Item range for `pages` (none for full fetches).
///
/// A first item index that does not fit in `usize` is out of range for `requested`.
pub(crate) fn item_range(
    state: &StoreState,
    requested: usize,
    pages: Option<(usize, usize)>,
) -> Result<Option<ItemRange>> {
    let Some((start, count)) = pages else {
        return Ok(None);
    };
    let page_size = state.config.page_size;
    let first = start
        .checked_mul(page_size)
        .ok_or(StoreError::OutOfRange {
            first_page: requested,
            page_count: state.remote.page_count,
        })?;
    Ok(Some(ItemRange {
        start: first,
        max: count.saturating_mul(page_size),
    }))
}

/// Build the descriptor for a request covering `range`.
pub(crate) fn build_request(
    command: &str,
    state: &StoreState,
    range: Option<ItemRange>,
) -> FetchRequest {
    let config = &state.config;

    let (entry_point, target) = match &config.query {
        Some(query) => (
            config.search_entry_point.clone(),
            RequestTarget::Search {
                query: query.clone(),
                category: config.category.clone(),
                subcategory: config.subcategory.clone(),
                gtin: config.gtin,
            },
        ),
        None => (
            config.entry_point.clone(),
            RequestTarget::Catalog {
                properties: property_list(&config.properties),
            },
        ),
    };

    FetchRequest {
        entry_point: entry_point.unwrap_or_default(),
        command: command.to_string(),
        target,
        node: config.node.clone(),
        lang: config.language.clone(),
        portal: config.portal.clone(),
        space: config.space.clone(),
        order_by: config.order_by.clone(),
        range,
        metadata: RequestMetadata {
            accept_language: config
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string()),
            session: config.session.clone(),
            store_id: state.store_id.clone().or_else(|| state.placeholder_id.clone()),
            geo: state.geo.clone(),
        },
        timeout: config.timeout,
    }
}

/// Fold a successful response for the expected generation into the state.
///
/// Returns whether a full fetch collapsed the data set into a single page.
pub(crate) fn apply_response(
    state: &mut StoreState,
    in_flight: &InFlight,
    response: FetchResponse,
    now: DateTime<Utc>,
) -> bool {
    if let Some(store_id) = response.store_id {
        if state.store_id.as_ref().is_some_and(|held| *held != store_id) {
            warn!(
                held = state.store_id.as_deref().unwrap_or_default(),
                received = %store_id,
                "Server store id changed, discarding cached pages"
            );
            state.window.clear();
        }
        state.store_id = Some(store_id);
    }

    let body = response.body;
    let total = body.total();
    // Hits only mean something for search results.
    let hits = if state.config.is_search() {
        body.hit_count()
    } else {
        0
    };
    state.first_fetch = false;

    let count = body.elements.len();
    if in_flight.full_fetch && count == total {
        state.window.replace_with_single(body.elements, now);
        state.remote = RemoteState {
            item_count: count,
            page_count: usize::from(count > 0),
            hit_count: hits,
        };
        if count > 0 {
            state.config.page_size = count;
        }
        return true;
    }

    let merge_start = if in_flight.full_fetch {
        warn!(count, total, "Full fetch returned a partial data set, paging it");
        0
    } else {
        in_flight.fetch_start
    };

    if total != state.remote.item_count {
        if !state.window.is_empty() {
            debug!(
                old = state.remote.item_count,
                new = total,
                "Remote size changed, discarding cached pages"
            );
        }
        state.window.clear();
    }

    let page_size = state.config.page_size;
    state.remote = RemoteState {
        item_count: total,
        page_count: total.div_ceil(page_size),
        hit_count: hits,
    };
    state.window.merge(merge_start, &body.elements, page_size, now);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Item;
    use crate::remote::ListingBody;
    use serde_json::json;

    fn catalog_config() -> StoreConfig {
        let mut config = StoreConfig::default();
        config.entry_point = Some("https://api.example.com/".to_string());
        config.page_size = 4;
        config
    }

    fn items(range: std::ops::Range<i64>) -> Vec<Item> {
        range.map(|i| json!(i)).collect()
    }

    fn in_flight(fetch_start: usize) -> InFlight {
        InFlight {
            generation: 0,
            blocking: true,
            start: fetch_start,
            max_pages: 1,
            fetch_start,
            full_fetch: false,
        }
    }

    #[test]
    fn test_validate_catalog_requirements() {
        let config = StoreConfig::default();
        let err = validate("", &config).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ArgumentMissing(ref fields) if *fields == vec!["command", "entry_point"]
        ));

        assert!(validate("listItems", &catalog_config()).is_ok());
    }

    #[test]
    fn test_validate_search_needs_search_entry_point() {
        let mut config = catalog_config();
        config.query = Some("shoes".to_string());
        let err = validate("search", &config).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ArgumentMissing(ref fields) if *fields == vec!["search_entry_point"]
        ));

        config.entry_point = None;
        config.search_entry_point = Some("https://search.example.com/".to_string());
        assert!(validate("search", &config).is_ok());
    }

    #[test]
    fn test_validate_required_flags() {
        let mut config = catalog_config();
        config.require_node = true;
        config.require_space = true;
        config.space = Some("A".to_string());
        let err = validate("listItems", &config).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ArgumentMissing(ref fields) if *fields == vec!["node"]
        ));
    }

    #[test]
    fn test_first_fetch_bulk_window() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.config.prefetch = false;
        assert_eq!(plan_range(&state, now, 2, 1), (0, 5));
        // Too large for the bulk window.
        assert_eq!(plan_range(&state, now, 4, 2), (4, 2));
    }

    #[test]
    fn test_bulk_window_when_emptied_with_known_count() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.config.prefetch = false;
        state.first_fetch = false;
        state.remote.item_count = 100;
        assert_eq!(plan_range(&state, now, 1, 1), (0, 5));

        state.window.merge(0, &items(0..4), 4, now);
        assert_eq!(plan_range(&state, now, 1, 1), (1, 1));
    }

    #[test]
    fn test_prefetch_expansion() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.first_fetch = false;
        state.remote.item_count = 80;
        state.remote.page_count = 20;
        state.window.merge(0, &items(0..28), 4, now);

        // Pages 0..=6 are loaded: no earlier page needed, extend one after.
        assert_eq!(plan_range(&state, now, 7, 1), (7, 2));
        // Page 9 is not loaded: extend one before and one after.
        assert_eq!(plan_range(&state, now, 10, 2), (9, 4));
        // Last page: nothing after it.
        assert_eq!(plan_range(&state, now, 19, 1), (18, 2));
    }

    #[test]
    fn test_prefetch_neighbour_prefers_next() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.first_fetch = false;
        state.remote.page_count = 10;
        state.window.merge(2, &items(0..8), 4, now);

        assert_eq!(prefetch_neighbour(&state, now, 2, 2), Some(4));
        assert_eq!(prefetch_neighbour(&state, now, 2, 1), Some(1));

        state.window.merge(0, &items(0..40), 4, now);
        assert_eq!(prefetch_neighbour(&state, now, 2, 2), None);
    }

    #[test]
    fn test_build_catalog_request() {
        let mut state = StoreState::new(catalog_config());
        state.config.properties = ["price", "stock", "price"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        state.config.space = Some("A".to_string());
        state.placeholder_id = Some("tmp-id".to_string());
        state.geo = Some("u6sce".to_string());

        let range = item_range(&state, 2, Some((2, 3))).unwrap();
        let request = build_request("listItems", &state, range);
        assert_eq!(request.entry_point, "https://api.example.com/");
        assert_eq!(request.command, "listItems");
        assert_eq!(
            request.target,
            RequestTarget::Catalog {
                properties: vec![
                    "default".to_string(),
                    "price".to_string(),
                    "stock".to_string()
                ]
            }
        );
        assert_eq!(request.range, Some(ItemRange { start: 8, max: 12 }));
        assert_eq!(request.space.as_deref(), Some("A"));
        assert_eq!(request.metadata.accept_language, "*");
        assert_eq!(request.metadata.store_id.as_deref(), Some("tmp-id"));
        assert_eq!(request.metadata.geo.as_deref(), Some("u6sce"));
    }

    #[test]
    fn test_build_search_request_without_range() {
        let mut state = StoreState::new(catalog_config());
        state.config.query = Some("shoes".to_string());
        state.config.search_entry_point = Some("https://search.example.com/".to_string());
        state.config.language = Some("sv".to_string());
        state.config.category = Some("apparel".to_string());
        state.store_id = Some("server-id".to_string());
        state.placeholder_id = Some("tmp-id".to_string());

        let request = build_request("search", &state, None);
        assert!(request.is_search());
        assert_eq!(request.entry_point, "https://search.example.com/");
        assert_eq!(request.range, None);
        assert_eq!(request.lang.as_deref(), Some("sv"));
        assert_eq!(request.metadata.accept_language, "sv");
        assert_eq!(request.metadata.store_id.as_deref(), Some("server-id"));
    }

    #[test]
    fn test_apply_response_merges_and_counts() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        let response = FetchResponse::new(ListingBody::new(items(0..20)).with_size(42));
        apply_response(&mut state, &in_flight(0), response, now);

        assert!(!state.first_fetch);
        assert_eq!(state.remote.item_count, 42);
        assert_eq!(state.remote.page_count, 11);
        // Catalog listings carry no hits.
        assert_eq!(state.remote.hit_count, 0);
        assert_eq!(state.window.len(), 5);
    }

    #[test]
    fn test_apply_response_size_change_resets_window() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        let response = FetchResponse::new(ListingBody::new(items(0..8)).with_size(40));
        apply_response(&mut state, &in_flight(0), response, now);

        let response = FetchResponse::new(ListingBody::new(items(0..4)).with_size(44));
        apply_response(&mut state, &in_flight(2), response, now);

        assert_eq!(state.window.first(), 2);
        assert_eq!(state.window.len(), 1);
        assert_eq!(state.remote.item_count, 44);
    }

    #[test]
    fn test_apply_response_store_id_change_resets_window() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        let response =
            FetchResponse::new(ListingBody::new(items(0..8)).with_size(40)).with_store_id("s1");
        apply_response(&mut state, &in_flight(0), response, now);
        assert_eq!(state.store_id.as_deref(), Some("s1"));

        let response =
            FetchResponse::new(ListingBody::new(items(0..4)).with_size(40)).with_store_id("s2");
        apply_response(&mut state, &in_flight(3), response, now);

        assert_eq!(state.store_id.as_deref(), Some("s2"));
        assert_eq!(state.window.first(), 3);
        assert_eq!(state.window.len(), 1);
    }

    #[test]
    fn test_apply_full_fetch_collapses_to_one_page() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.config.full_fetch = true;
        let flight = InFlight {
            full_fetch: true,
            ..in_flight(0)
        };

        let response = FetchResponse::new(ListingBody::new(items(0..13)).with_size(13));
        apply_response(&mut state, &flight, response, now);
        assert_eq!(state.remote.page_count, 1);
        assert_eq!(state.remote.item_count, 13);
        assert_eq!(state.config.page_size, 13);
        assert_eq!(state.window.len(), 1);

        let response = FetchResponse::new(ListingBody::default());
        apply_response(&mut state, &flight, response, now);
        assert_eq!(state.remote.page_count, 0);
        assert_eq!(state.remote.item_count, 0);
        assert!(state.window.is_empty());
    }

    #[test]
    fn test_apply_partial_full_fetch_keeps_paging() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.config.full_fetch = true;
        let flight = InFlight {
            full_fetch: true,
            fetch_start: 3,
            ..in_flight(3)
        };

        let response = FetchResponse::new(ListingBody::new(items(0..10)).with_size(30));
        let collapsed = apply_response(&mut state, &flight, response, now);

        assert!(!collapsed);
        assert_eq!(state.remote.item_count, 30);
        assert_eq!(state.remote.page_count, 8);
        assert_eq!(state.config.page_size, 4);
        assert_eq!(state.window.first(), 0);
        assert_eq!(state.window.len(), 3);
    }

    #[test]
    fn test_apply_search_response_keeps_hits() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.config.query = Some("shoes".to_string());
        let response =
            FetchResponse::new(ListingBody::new(items(0..4)).with_size(12).with_hits(40));
        apply_response(&mut state, &in_flight(0), response, now);

        assert_eq!(state.remote.item_count, 12);
        assert_eq!(state.remote.hit_count, 40);
    }

    #[test]
    fn test_plan_range_saturates_huge_requests() {
        let now = Utc::now();
        let mut state = StoreState::new(catalog_config());
        state.first_fetch = false;
        state.remote.page_count = 10;

        assert_eq!(plan_range(&state, now, usize::MAX, 1), (usize::MAX - 1, 2));
        assert_eq!(plan_range(&state, now, 1, usize::MAX), (0, usize::MAX));
        assert_eq!(prefetch_neighbour(&state, now, 2, usize::MAX), Some(1));
    }

    #[test]
    fn test_item_range_overflow_is_out_of_range() {
        let mut state = StoreState::new(catalog_config());
        state.remote.page_count = 3;

        let err = item_range(&state, usize::MAX / 2, Some((usize::MAX / 2, 1))).unwrap_err();
        assert!(matches!(
            err,
            StoreError::OutOfRange {
                first_page,
                page_count: 3
            } if first_page == usize::MAX / 2
        ));

        let range = item_range(&state, 1, Some((1, usize::MAX))).unwrap();
        assert_eq!(
            range,
            Some(ItemRange {
                start: 4,
                max: usize::MAX
            })
        );
        assert_eq!(item_range(&state, 0, None).unwrap(), None);
    }
}
