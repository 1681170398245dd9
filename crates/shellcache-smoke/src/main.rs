//! ShellCache smoke harness.
//!
//! Drives a full worker lifecycle against a real origin: install the
//! application shell, activate, replay the shell requests through the
//! interceptor, then pre-download the rest of the bundle. Prints a JSON
//! summary line on success.
//!
//! Usage: `shellcache-smoke <config.json>`
//!
//! The config file is a serialized `WorkerConfig`:
//!
//! ```json
//! {
//!   "origin": "https://app.example",
//!   "manifest": { "index.html": "9a1661a6", "/": "9a1661a6" },
//!   "core": ["index.html"]
//! }
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use shellcache_common::{init_logging, LogConfig};
use shellcache_net::{Fetcher, FetcherConfig, HttpFetcher, Request};
use shellcache_store::Stores;
use shellcache_worker::{resource_url, FetchDecision, OfflineWorker, WorkerConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogConfig::default());

    let path = std::env::args()
        .nth(1)
        .context("usage: shellcache-smoke <config.json>")?;
    let raw = std::fs::read(&path).with_context(|| format!("reading {path}"))?;
    let config: WorkerConfig = serde_json::from_slice(&raw).context("parsing worker config")?;

    let stores = Arc::new(Stores::new());
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(FetcherConfig::default()).context("building fetcher")?);
    let worker = OfflineWorker::new(config.clone(), Arc::clone(&stores), fetcher);
    worker.add_client(config.origin.clone()).await;

    info!(origin = %config.origin, resources = config.manifest.len(), "Installing");
    worker.handle_install().await.context("install failed")?;

    info!("Activating");
    worker.handle_activate().await.context("activate failed")?;

    // Replay the shell through the interceptor; these should all be hits.
    let mut served = 0usize;
    let mut served_bytes = 0usize;
    for path in config.core.paths() {
        let url = resource_url(&config.origin, path)?;
        match worker.handle_fetch(&Request::get(url)).await {
            Ok(FetchDecision::Serve(entry)) => {
                served += 1;
                served_bytes += entry.body.len();
            }
            Ok(FetchDecision::Bypass) => warn!(path = %path, "Shell resource not intercepted"),
            Err(err) => warn!(path = %path, error = %err, "Shell replay failed"),
        }
    }

    let fetched = worker
        .download_offline()
        .await
        .context("offline download failed")?;

    let content = stores.open(&config.stores.content).await;
    let summary = json!({
        "resources": config.manifest.len(),
        "cached": content.len().await,
        "shell_served": served,
        "shell_bytes": served_bytes,
        "offline_fetched": fetched,
    });
    println!("{summary}");
    Ok(())
}
