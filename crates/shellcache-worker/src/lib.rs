//! # ShellCache Worker
//!
//! Offline application-bundle cache worker: keeps a durable cache of a
//! statically-versioned resource set synchronized with a path → fingerprint
//! manifest across deployments, and serves intercepted requests from it.
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker
//!     ├── LifecycleController   install staging, activate reconciliation
//!     ├── RequestInterceptor    cache-first / online-first dispatch
//!     ├── Command channel       skipWaiting, downloadOffline
//!     └── Clients               pages claimed on activation
//!
//! Stores (named)
//!     ├── content    durable, serves steady-state requests
//!     ├── staging    install-time shell downloads, merged then dropped
//!     └── manifest   single entry: the last activated manifest
//! ```
//!
//! The host owns the event loop and calls one entry point per event kind
//! (`handle_install`, `handle_activate`, `handle_fetch`, `handle_message`);
//! each returns only once its side effects are durable.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shellcache_net::{FetchError, Fetcher, Request, Response};
use shellcache_store::{CachedResponse, Stores};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

pub mod channel;
pub mod clients;
pub mod intercept;
pub mod lifecycle;
pub mod manifest;

#[cfg(test)]
pub(crate) mod testutil;

pub use channel::Command;
pub use clients::{Client, Clients};
pub use intercept::{FetchDecision, RequestInterceptor};
pub use lifecycle::LifecycleController;
pub use manifest::{derive_key, resource_url, CoreSet, Manifest, MANIFEST_ENTRY_KEY, ROOT_KEY};

// ==================== Errors ====================

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid worker state: expected {expected}, was {actual}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },

    #[error("Stored manifest is corrupt: {0}")]
    CorruptStoredManifest(#[source] serde_json::Error),

    #[error("Manifest serialization failed: {0}")]
    ManifestEncode(#[source] serde_json::Error),

    #[error("Resource fetch rejected: {path} ({status})")]
    BadStatus { path: String, status: u16 },

    #[error("Invalid resource path: {0}")]
    InvalidPath(#[from] url::ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

// ==================== State ====================

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Created, no event processed yet.
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed, waiting to become the controller.
    Installed,
    /// Activate reconciliation in progress.
    Activating,
    /// Controlling clients and serving requests.
    Active,
    /// Unrecoverable reconciliation or install error.
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Active => write!(f, "active"),
            WorkerState::Failed => write!(f, "failed"),
        }
    }
}

// ==================== Configuration ====================

/// Names of the three persistent stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreNames {
    /// Durable content store serving steady-state requests.
    pub content: String,
    /// Ephemeral staging store populated at install time.
    pub staging: String,
    /// Metadata store holding the last activated manifest.
    pub meta: String,
}

impl Default for StoreNames {
    fn default() -> Self {
        Self {
            content: "shellcache-content".to_string(),
            staging: "shellcache-staging".to_string(),
            meta: "shellcache-manifest".to_string(),
        }
    }
}

/// Worker configuration, embedded at build/packaging time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin the bundle is served from.
    pub origin: Url,
    /// Resource table for this deployment.
    pub manifest: Manifest,
    /// Application-shell resources fetched at install time.
    pub core: CoreSet,
    /// Store names.
    #[serde(default)]
    pub stores: StoreNames,
}

// ==================== Worker ====================

/// The worker instance: one per deployed bundle version.
pub struct OfflineWorker {
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    lifecycle: LifecycleController,
    interceptor: RequestInterceptor,
    clients: RwLock<Clients>,
    stores: Arc<Stores>,
    fetcher: Arc<dyn Fetcher>,
}

impl OfflineWorker {
    /// Create a worker over injected stores and transport.
    pub fn new(config: WorkerConfig, stores: Arc<Stores>, fetcher: Arc<dyn Fetcher>) -> Self {
        let lifecycle =
            LifecycleController::new(config.clone(), Arc::clone(&stores), Arc::clone(&fetcher));
        let interceptor = RequestInterceptor::new(
            config.origin.clone(),
            config.manifest.clone(),
            config.stores.content.clone(),
            Arc::clone(&stores),
            Arc::clone(&fetcher),
        );
        Self {
            config,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            lifecycle,
            interceptor,
            clients: RwLock::new(Clients::new()),
            stores,
            fetcher,
        }
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether this worker has asked to supersede the active one without
    /// waiting for clients to close.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    /// Register an open page. Returns its client ID.
    pub async fn add_client(&self, url: Url) -> String {
        self.clients.write().await.add(url)
    }

    /// Number of pages this worker controls.
    pub async fn controlled_clients(&self) -> usize {
        self.clients.read().await.controlled_count()
    }

    /// Host entry point for the install event: stage the application shell.
    ///
    /// A freshly staged shell supersedes any waiting worker immediately, so
    /// the skip-waiting signal is raised before the downloads start.
    pub async fn handle_install(&self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)
            .await?;
        self.skip_waiting.store(true, Ordering::Relaxed);
        match self.lifecycle.install().await {
            Ok(()) => {
                *self.state.write().await = WorkerState::Installed;
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Failed;
                Err(err)
            }
        }
    }

    /// Host entry point for the activate event: reconcile the content store
    /// against the new manifest, then claim all open pages.
    pub async fn handle_activate(&self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Installed, WorkerState::Activating)
            .await?;
        match self.lifecycle.activate().await {
            Ok(()) => {
                let claimed = self.clients.write().await.claim();
                debug!(claimed, "Claimed open clients");
                *self.state.write().await = WorkerState::Active;
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = WorkerState::Failed;
                Err(err)
            }
        }
    }

    /// Host entry point for one intercepted request.
    ///
    /// Requests arriving before this worker controls its clients are not
    /// intercepted.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchDecision, WorkerError> {
        if self.state().await != WorkerState::Active {
            trace!(url = %request.url, "Not controlling requests yet");
            return Ok(FetchDecision::Bypass);
        }
        self.interceptor.handle(request).await
    }

    /// Host entry point for a maintenance message. Unrecognized payloads are
    /// ignored.
    pub async fn handle_message(&self, payload: &str) -> Result<(), WorkerError> {
        match Command::parse(payload) {
            Some(Command::SkipWaiting) => {
                self.skip_waiting.store(true, Ordering::Relaxed);
                debug!("Skip waiting requested");
                Ok(())
            }
            Some(Command::DownloadOffline) => self.download_offline().await.map(|_| ()),
            None => {
                trace!(payload, "Ignoring unrecognized message");
                Ok(())
            }
        }
    }

    /// Fetch and store every manifest resource not already cached.
    ///
    /// Requires the worker to be active; invoking it earlier is a
    /// precondition violation.
    pub async fn download_offline(&self) -> Result<usize, WorkerError> {
        let state = self.state().await;
        if state != WorkerState::Active {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Active,
                actual: state,
            });
        }
        let content = self.stores.open(&self.config.stores.content).await;
        channel::download_offline(
            &self.config.origin,
            &self.config.manifest,
            &content,
            self.fetcher.as_ref(),
        )
        .await
    }

    async fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), WorkerError> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(WorkerError::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }
}

/// Convert a network response into its stored form.
pub(crate) fn cache_entry(response: &Response) -> CachedResponse {
    CachedResponse {
        url: response.url.to_string(),
        status: response.status.as_u16(),
        headers: response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body: response.body.to_vec(),
    }
}
