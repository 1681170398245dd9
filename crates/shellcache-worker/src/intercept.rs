//! Steady-state request dispatch: cache-first for bundle resources,
//! online-first for the navigation entry point.

use std::sync::Arc;

use shellcache_net::{Fetcher, Request};
use shellcache_store::{CachedResponse, Stores};
use tracing::{trace, warn};

use crate::manifest::{derive_key, resource_url, Manifest, ROOT_KEY};
use crate::{cache_entry, WorkerError};

/// How to answer one intercepted request.
#[derive(Debug, Clone)]
pub enum FetchDecision {
    /// Not a bundle resource; default networking takes over.
    Bypass,
    /// Serve this response.
    Serve(CachedResponse),
}

/// Steady-state request handler over the durable content store.
pub struct RequestInterceptor {
    origin: url::Url,
    manifest: Manifest,
    content_store: String,
    stores: Arc<Stores>,
    fetcher: Arc<dyn Fetcher>,
}

impl RequestInterceptor {
    /// Create an interceptor over injected stores and transport.
    pub fn new(
        origin: url::Url,
        manifest: Manifest,
        content_store: String,
        stores: Arc<Stores>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            origin,
            manifest,
            content_store,
            stores,
            fetcher,
        }
    }

    /// Decide how to answer one request.
    pub async fn handle(&self, request: &Request) -> Result<FetchDecision, WorkerError> {
        if !request.is_retrieval() {
            return Ok(FetchDecision::Bypass);
        }
        let Some(key) = derive_key(&self.origin, &request.url) else {
            return Ok(FetchDecision::Bypass);
        };
        if !self.manifest.contains(&key) {
            trace!(key = %key, "Not a bundle resource");
            return Ok(FetchDecision::Bypass);
        }

        // Cache entries are keyed by the canonical resource URL, so anchor
        // and cache-busted forms of the same resource share one entry.
        let mut outbound = request.clone();
        outbound.url = resource_url(&self.origin, &key)?;

        if key == ROOT_KEY {
            self.online_first(outbound).await
        } else {
            self.cache_first(outbound).await
        }
    }

    /// Serve from the content store, fetching and lazily populating on miss.
    async fn cache_first(&self, request: Request) -> Result<FetchDecision, WorkerError> {
        let content = self.stores.open(&self.content_store).await;
        if let Some(entry) = content.match_key(request.url.as_str()).await {
            trace!(url = %request.url, "Cache hit");
            return Ok(FetchDecision::Serve(entry));
        }

        let key = request.url.to_string();
        let response = self.fetcher.fetch(request).await?;
        let entry = cache_entry(&response);
        if response.ok() {
            // Lazy population: schedule the write, do not hold the response
            // on it completing.
            let store = Arc::clone(&content);
            let copy = entry.clone();
            tokio::spawn(async move {
                store.put(key, copy).await;
            });
        }
        Ok(FetchDecision::Serve(entry))
    }

    /// Fetch the entry point fresh, falling back to the content store only
    /// when the network is unavailable.
    async fn online_first(&self, request: Request) -> Result<FetchDecision, WorkerError> {
        let content = self.stores.open(&self.content_store).await;
        let key = request.url.to_string();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let entry = cache_entry(&response);
                content.put(key, entry.clone()).await;
                Ok(FetchDecision::Serve(entry))
            }
            Err(err) => {
                warn!(url = %key, error = %err, "Entry point fetch failed, falling back to cache");
                match content.match_key(&key).await {
                    Some(entry) => Ok(FetchDecision::Serve(entry)),
                    None => Err(err.into()),
                }
            }
        }
    }
}
