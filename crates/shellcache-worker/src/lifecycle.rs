//! Lifecycle controller: install-time staging and activate-time
//! reconciliation of the durable content store against the manifest.

use std::sync::Arc;

use shellcache_net::{Fetcher, Request};
use shellcache_store::{Store, Stores};
use tracing::{debug, error, info};

use crate::manifest::{derive_key, resource_url, Manifest, MANIFEST_ENTRY_KEY};
use crate::{cache_entry, WorkerConfig, WorkerError};

/// Drives the install → activate sequence and owns reconciliation.
pub struct LifecycleController {
    config: WorkerConfig,
    stores: Arc<Stores>,
    fetcher: Arc<dyn Fetcher>,
}

impl LifecycleController {
    /// Create a controller over injected stores and transport.
    pub fn new(config: WorkerConfig, stores: Arc<Stores>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            stores,
            fetcher,
        }
    }

    /// Populate the staging store with every core resource, bypassing
    /// intermediary HTTP caches so the shell is guaranteed fresh.
    ///
    /// Any failed shell fetch (transport error or non-2xx) fails the install
    /// and the worker version never becomes installed.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let staging = self.stores.open(&self.config.stores.staging).await;
        for path in self.config.core.paths() {
            let url = resource_url(&self.config.origin, path)?;
            let response = self.fetcher.fetch(Request::get(url.clone()).reload()).await?;
            if !response.ok() {
                return Err(WorkerError::BadStatus {
                    path: path.clone(),
                    status: response.status.as_u16(),
                });
            }
            staging.put(url.as_str(), cache_entry(&response)).await;
            debug!(path = %path, "Staged shell resource");
        }
        info!(count = self.config.core.len(), "Install complete");
        Ok(())
    }

    /// Reconcile the content store with the new manifest and commit it.
    ///
    /// Any error leaves no partial state behind: the content, staging, and
    /// metadata stores are all dropped, so the next activation takes the
    /// first-install path.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        match self.reconcile().await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = %err, "Reconciliation failed, dropping cache generation");
                let names = &self.config.stores;
                self.stores.delete(&names.content).await;
                self.stores.delete(&names.staging).await;
                self.stores.delete(&names.meta).await;
                Err(err)
            }
        }
    }

    async fn reconcile(&self) -> Result<(), WorkerError> {
        let names = &self.config.stores;
        let mut content = self.stores.open(&names.content).await;
        let staging = self.stores.open(&names.staging).await;
        let meta = self.stores.open(&names.meta).await;

        let Some(stored) = meta.match_key(MANIFEST_ENTRY_KEY).await else {
            // First-ever install: no prior manifest, start from a clean
            // content store populated wholesale from staging.
            self.stores.delete(&names.content).await;
            content = self.stores.open(&names.content).await;
            copy_all(&staging, &content).await;
            self.stores.delete(&names.staging).await;
            self.commit_manifest(&meta).await?;
            info!(entries = content.len().await, "Activated first install");
            return Ok(());
        };

        let old_manifest =
            Manifest::from_json(&stored.body).map_err(WorkerError::CorruptStoredManifest)?;

        // Evict entries whose path left the manifest or whose fingerprint
        // changed; unchanged entries are reused without a refetch.
        for key in content.keys().await {
            let logical = url::Url::parse(&key)
                .ok()
                .and_then(|url| derive_key(&self.config.origin, &url));
            let Some(logical) = logical else {
                content.delete(&key).await;
                continue;
            };
            let fresh = self.config.manifest.fingerprint(&logical);
            if fresh.is_none() || fresh != old_manifest.fingerprint(&logical) {
                content.delete(&key).await;
                debug!(key = %logical, "Evicted stale entry");
            }
        }

        // Shell files are always refreshed from staging, never reused.
        copy_all(&staging, &content).await;
        self.stores.delete(&names.staging).await;
        self.commit_manifest(&meta).await?;
        info!(entries = content.len().await, "Activated upgrade");
        Ok(())
    }

    async fn commit_manifest(&self, meta: &Store) -> Result<(), WorkerError> {
        let body =
            serde_json::to_vec(&self.config.manifest).map_err(WorkerError::ManifestEncode)?;
        meta.put(
            MANIFEST_ENTRY_KEY,
            shellcache_store::CachedResponse {
                url: MANIFEST_ENTRY_KEY.to_string(),
                status: 200,
                headers: hashbrown::HashMap::new(),
                body,
            },
        )
        .await;
        Ok(())
    }
}

async fn copy_all(from: &Store, to: &Store) {
    for key in from.keys().await {
        if let Some(entry) = from.match_key(&key).await {
            to.put(key, entry).await;
        }
    }
}
