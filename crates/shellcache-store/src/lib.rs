//! # ShellCache Store
//!
//! Named, on-demand cache stores for the shellcache offline worker.
//!
//! ## Architecture
//!
//! ```text
//! Stores (registry)
//!     ├── Store "shellcache-content"    key → CachedResponse
//!     ├── Store "shellcache-staging"    key → CachedResponse
//!     └── Store "shellcache-manifest"   key → CachedResponse
//! ```
//!
//! A `Store` is a flat map of request key to cached response. The registry
//! owns the name→store binding: deleting a name drops the whole store, and
//! any outstanding handle to it becomes detached (its contents are no longer
//! reachable by name). Puts are last-writer-wins.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

// ==================== Cached Response ====================

/// A cached response: the value side of a store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// URL the response was fetched from.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ==================== Store ====================

/// A single named store of request key → cached response.
#[derive(Debug)]
pub struct Store {
    name: String,
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl Store {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a key, returning a copy of the cached response.
    pub async fn match_key(&self, key: &str) -> Option<CachedResponse> {
        self.entries.read().await.get(key).cloned()
    }

    /// Insert an entry, replacing any previous value for the key.
    pub async fn put(&self, key: impl Into<String>, entry: CachedResponse) {
        let key = key.into();
        trace!(store = %self.name, key = %key, bytes = entry.body.len(), "Put entry");
        self.entries.write().await.insert(key, entry);
    }

    /// Delete an entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// All keys currently present.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ==================== Stores ====================

/// Registry of named stores, opened or created on demand.
#[derive(Debug, Default)]
pub struct Stores {
    stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl Stores {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store, creating it if it does not exist.
    pub async fn open(&self, name: &str) -> Arc<Store> {
        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(name) {
            return Arc::clone(store);
        }
        debug!(store = %name, "Created store");
        let store = Arc::new(Store::new(name));
        stores.insert(name.to_string(), Arc::clone(&store));
        store
    }

    /// Check if a store exists.
    pub async fn has(&self, name: &str) -> bool {
        self.stores.read().await.contains_key(name)
    }

    /// Delete a store wholesale. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        let existed = self.stores.write().await.remove(name).is_some();
        if existed {
            debug!(store = %name, "Deleted store");
        }
        existed
    }

    /// Names of all stores currently open.
    pub async fn names(&self) -> Vec<String> {
        self.stores.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse {
            url: url.to_string(),
            status: 200,
            headers: HashMap::new(),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_store_put_and_match() {
        let stores = Stores::new();
        let store = stores.open("content").await;

        store
            .put("https://example.com/app.js", entry("https://example.com/app.js", b"js"))
            .await;

        let found = store.match_key("https://example.com/app.js").await;
        assert_eq!(found.map(|e| e.body), Some(b"js".to_vec()));
        assert!(store.match_key("https://example.com/other.js").await.is_none());
    }

    #[tokio::test]
    async fn test_store_put_overwrites() {
        let stores = Stores::new();
        let store = stores.open("content").await;

        store.put("k", entry("k", b"old")).await;
        store.put("k", entry("k", b"new")).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.match_key("k").await.map(|e| e.body), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_store_delete() {
        let stores = Stores::new();
        let store = stores.open("content").await;

        store.put("k", entry("k", b"v")).await;
        assert!(store.delete("k").await);
        assert!(!store.delete("k").await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_keys() {
        let stores = Stores::new();
        let store = stores.open("content").await;

        store.put("a", entry("a", b"1")).await;
        store.put("b", entry("b", b"2")).await;

        let mut keys = store.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_registry_open_is_idempotent() {
        let stores = Stores::new();
        let first = stores.open("content").await;
        first.put("k", entry("k", b"v")).await;

        let second = stores.open("content").await;
        assert!(second.match_key("k").await.is_some());
        assert_eq!(stores.names().await.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_delete_drops_contents() {
        let stores = Stores::new();
        let store = stores.open("content").await;
        store.put("k", entry("k", b"v")).await;

        assert!(stores.delete("content").await);
        assert!(!stores.has("content").await);
        assert!(!stores.delete("content").await);

        // Reopening yields a fresh, empty store.
        let fresh = stores.open("content").await;
        assert!(fresh.is_empty().await);
    }

    #[test]
    fn test_cached_response_ok() {
        assert!(entry("k", b"").ok());
        let mut not_found = entry("k", b"");
        not_found.status = 404;
        assert!(!not_found.ok());
    }
}
