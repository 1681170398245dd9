//! Out-of-band maintenance commands delivered as message payloads.

use hashbrown::HashSet;
use shellcache_net::{Fetcher, Request};
use shellcache_store::Store;
use tracing::info;
use url::Url;

use crate::manifest::{derive_key, resource_url, Manifest};
use crate::{cache_entry, WorkerError};

/// Recognized maintenance commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Supersede the active worker without waiting for clients to close.
    SkipWaiting,
    /// Fetch and store every manifest resource not already cached.
    DownloadOffline,
}

impl Command {
    /// Parse a message payload. Unrecognized payloads are not commands.
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::DownloadOffline),
            _ => None,
        }
    }
}

/// Fetch and store exactly the manifest resources missing from the content
/// store. Idempotent: already-cached paths cost no network calls.
///
/// Returns the number of resources fetched.
pub(crate) async fn download_offline(
    origin: &Url,
    manifest: &Manifest,
    content: &Store,
    fetcher: &dyn Fetcher,
) -> Result<usize, WorkerError> {
    let mut present = HashSet::new();
    for key in content.keys().await {
        if let Some(logical) = Url::parse(&key).ok().and_then(|url| derive_key(origin, &url)) {
            present.insert(logical);
        }
    }

    let mut fetched = 0usize;
    for path in manifest.paths() {
        if present.contains(path) {
            continue;
        }
        let url = resource_url(origin, path)?;
        let response = fetcher.fetch(Request::get(url.clone())).await?;
        if !response.ok() {
            return Err(WorkerError::BadStatus {
                path: path.to_string(),
                status: response.status.as_u16(),
            });
        }
        content.put(url.as_str(), cache_entry(&response)).await;
        fetched += 1;
    }
    info!(fetched, total = manifest.len(), "Offline download complete");
    Ok(fetched)
}
