//! Shared fixtures for the worker tests: a canned origin, config builders,
//! and a deterministic call-counting fetcher.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};
use shellcache_net::{FetchError, Fetcher, Request, Response};
use url::Url;

use crate::manifest::{CoreSet, Manifest};
use crate::{StoreNames, WorkerConfig};

pub(crate) fn origin() -> Url {
    Url::parse("https://app.example").unwrap()
}

pub(crate) fn abs(path: &str) -> Url {
    origin().join(path).unwrap()
}

pub(crate) fn config(resources: &[(&str, &str)], core: &[&str]) -> WorkerConfig {
    WorkerConfig {
        origin: origin(),
        manifest: Manifest::new(
            resources
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        core: CoreSet::new(core.iter().map(|s| s.to_string()).collect()),
        stores: StoreNames::default(),
    }
}

/// In-memory fetcher serving canned bodies, with call counting and an
/// offline switch. Unknown URLs answer 404.
pub(crate) struct MockFetcher {
    responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub(crate) fn serve(&self, url: &Url, status: u16, body: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_vec()));
    }

    pub(crate) fn serve_path(&self, path: &str, body: &[u8]) {
        self.serve(&abs(path), 200, body);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::RequestFailed("offline".to_string()));
        }
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or((404, Vec::new()));
        Ok(Response {
            url: request.url,
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: Bytes::from(body),
        })
    }
}
