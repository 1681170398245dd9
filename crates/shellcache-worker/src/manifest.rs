//! Resource manifest: the path → fingerprint table defining one deployable
//! version of the application bundle.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Logical key of the navigation entry point.
pub const ROOT_KEY: &str = "/";

/// Key of the single metadata-store entry holding the last activated manifest.
pub const MANIFEST_ENTRY_KEY: &str = "manifest";

/// Query marker used for cache-busting; stripped before key lookup.
const CACHE_BUST_MARKER: &str = "?v=";

/// Immutable mapping of resource path to content fingerprint.
///
/// Keys are origin-relative paths without a leading slash, plus the
/// distinguished root key `"/"`. Fingerprints are opaque content hashes;
/// equal fingerprints imply byte-identical content. A new deployment is a
/// wholly new manifest, never a mutation of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    resources: HashMap<String, String>,
}

impl Manifest {
    /// Create a manifest from a path → fingerprint map.
    pub fn new(resources: HashMap<String, String>) -> Self {
        Self { resources }
    }

    /// Parse a manifest from its serialized JSON object form.
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Check if a path is part of this deployment.
    pub fn contains(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// Fingerprint for a path, if the path is part of this deployment.
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.resources.get(key).map(|s| s.as_str())
    }

    /// All resource paths in this deployment.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(|s| s.as_str())
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Ordered list of the application-shell resources that must be cached
/// before the worker is usable offline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreSet {
    paths: Vec<String>,
}

impl CoreSet {
    /// Create a core set from an ordered path list.
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    /// The shell paths, in install order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Number of shell resources.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the core set is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Derive the logical resource key for a same-origin request URL.
///
/// Cross-origin URLs have no key. The `?v=` cache-bust suffix is stripped;
/// the origin itself, in-page anchors directly under it, and the empty
/// remainder all normalize to [`ROOT_KEY`].
pub fn derive_key(origin: &Url, url: &Url) -> Option<String> {
    if url.origin() != origin.origin() {
        return None;
    }
    let origin_ser = origin.origin().ascii_serialization();
    let rest = url.as_str().strip_prefix(origin_ser.as_str())?;
    if rest.is_empty() || rest == "/" || rest.starts_with("/#") {
        return Some(ROOT_KEY.to_string());
    }
    let mut key = rest.strip_prefix('/').unwrap_or(rest).to_string();
    if let Some(idx) = key.find(CACHE_BUST_MARKER) {
        key.truncate(idx);
    }
    if key.is_empty() {
        return Some(ROOT_KEY.to_string());
    }
    Some(key)
}

/// Absolute URL for a manifest key under the worker's origin.
pub fn resource_url(origin: &Url, key: &str) -> Result<Url, url::ParseError> {
    origin.join(key)
}
