// Store configuration.
// Holds the per-store options and detects which changes invalidate cached pages.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Callback invoked after a store discards its cached pages.
#[derive(Clone)]
pub struct ResetHook(Arc<dyn Fn() + Send + Sync>);

impl ResetHook {
    pub fn new(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ResetHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetHook")
    }
}

/// Options for a single store instance.
///
/// `StoreConfig::default()` seeds new stores; every store keeps its own copy
/// and replaces it wholesale on `set_options`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Items per page (at least 1).
    pub page_size: usize,
    /// Pages requested by the first fetch when the request fits inside it.
    pub fetch_pages: usize,
    /// Age after which a cached page is no longer fresh.
    #[serde(with = "millis")]
    pub cache_timeout: Duration,
    /// Serve stale pages when a fetch fails.
    pub use_old_on_error: bool,
    /// Fetch the whole data set as a single page.
    pub full_fetch: bool,
    /// Extend fetches by one neighbouring page on each side.
    pub prefetch: bool,
    /// Transport timeout, passed through unchanged.
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub order_by: Option<String>,
    /// Search query; a store with a query issues search requests.
    pub query: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    /// Treat the query as a GTIN lookup.
    pub gtin: bool,
    /// Property groups requested by catalog stores.
    pub properties: BTreeSet<String>,
    pub session: Option<String>,
    pub entry_point: Option<String>,
    pub search_entry_point: Option<String>,
    pub portal: Option<String>,
    pub space: Option<String>,
    pub node: Option<String>,
    pub language: Option<String>,
    pub require_node: bool,
    pub require_portal: bool,
    pub require_space: bool,
    pub require_language: bool,
    #[serde(skip)]
    pub on_reset: Option<ResetHook>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 8,
            fetch_pages: 5,
            cache_timeout: Duration::from_secs(20 * 60),
            use_old_on_error: true,
            full_fetch: false,
            prefetch: true,
            timeout: Duration::from_secs(10),
            order_by: None,
            query: None,
            category: None,
            subcategory: None,
            gtin: false,
            properties: BTreeSet::new(),
            session: None,
            entry_point: None,
            search_entry_point: None,
            portal: None,
            space: None,
            node: None,
            language: None,
            require_node: false,
            require_portal: false,
            require_space: false,
            require_language: false,
            on_reset: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a JSON file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: StoreConfig = serde_json::from_str(&data)?;
            Ok(config.normalized())
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(StoreConfig::default())
        }
    }

    /// Coerce sizes to their minimum of one.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.fetch_pages = self.fetch_pages.max(1);
        self
    }

    /// Whether this is a search store rather than a catalog store.
    pub fn is_search(&self) -> bool {
        self.query.is_some()
    }

    /// True when switching from `self` to `other` must discard cached pages.
    pub fn identity_changed(&self, other: &StoreConfig) -> bool {
        self.page_size != other.page_size
            || self.entry_point != other.entry_point
            || self.portal != other.portal
            || self.space != other.space
            || self.language != other.language
            || self.order_by != other.order_by
            || self.full_fetch != other.full_fetch
            || self.session != other.session
            || self.query != other.query
            || self.properties != other.properties
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.page_size, 8);
        assert_eq!(cfg.fetch_pages, 5);
        assert_eq!(cfg.cache_timeout, Duration::from_secs(1200));
        assert!(cfg.use_old_on_error);
        assert!(cfg.prefetch);
        assert!(!cfg.full_fetch);
        assert!(!cfg.is_search());
    }

    #[test]
    fn test_identity_fields_trigger_change() {
        let base = StoreConfig::default();

        let mut other = base.clone();
        other.space = Some("B".to_string());
        assert!(base.identity_changed(&other));

        let mut other = base.clone();
        other.query = Some("shoes".to_string());
        assert!(base.identity_changed(&other));

        let mut other = base.clone();
        other.page_size = 16;
        assert!(base.identity_changed(&other));
    }

    #[test]
    fn test_non_identity_fields_do_not_trigger_change() {
        let base = StoreConfig::default();
        let mut other = base.clone();
        other.prefetch = false;
        other.use_old_on_error = false;
        other.node = Some("n1".to_string());
        other.cache_timeout = Duration::from_secs(1);
        assert!(!base.identity_changed(&other));
    }

    #[test]
    fn test_properties_compare_order_insensitive() {
        let mut a = StoreConfig::default();
        a.properties = ["price", "name"].iter().map(|s| s.to_string()).collect();
        let mut b = StoreConfig::default();
        b.properties = ["name", "price", "name"].iter().map(|s| s.to_string()).collect();
        assert!(!a.identity_changed(&b));

        b.properties.insert("stock".to_string());
        assert!(a.identity_changed(&b));
    }

    #[test]
    fn test_normalized_coerces_sizes() {
        let mut cfg = StoreConfig::default();
        cfg.page_size = 0;
        cfg.fetch_pages = 0;
        let cfg = cfg.normalized();
        assert_eq!(cfg.page_size, 1);
        assert_eq!(cfg.fetch_pages, 1);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"page_size": 0, "cache_timeout": 5000, "space": "A", "properties": ["b", "a"]}"#,
        )
        .unwrap();

        let cfg = StoreConfig::load(&path).unwrap();
        assert_eq!(cfg.page_size, 1);
        assert_eq!(cfg.cache_timeout, Duration::from_secs(5));
        assert_eq!(cfg.space.as_deref(), Some("A"));
        assert_eq!(
            cfg.properties.iter().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(cfg.fetch_pages, 5);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = StoreConfig::load(&temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(cfg.page_size, 8);
    }
}
