// Allow dead code: Infrastructure methods for future use
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::cache::{CacheStorage, StoreError};
use super::fetch::{FetchError, Fetcher, Method, Request, Response};
use super::{ASSETS, CACHE_NAME, OFFLINE_URL};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the worker event channel.
/// 32 is sufficient for a burst of shell requests with headroom.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum concurrent asset fetches during install.
/// The asset list is small; 4 keeps install fast without hammering the host.
const MAX_CONCURRENT_PRECACHE: usize = 4;

// ============================================================================
// Types
// ============================================================================

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Worker is not running")]
    Terminated,
}

/// Lifecycle of one cache generation's controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Active,
    Superseded,
}

/// External control signals accepted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Force the new generation to take over without waiting for clients of
    /// the old one to finish.
    SkipWaiting,
}

/// Events dispatched to the worker by the host loop. Replaces the
/// original's listener registration with an explicit dispatch table.
#[derive(Debug)]
pub enum WorkerEvent {
    Install {
        ack: oneshot::Sender<Result<(), WorkerError>>,
    },
    Activate {
        ack: oneshot::Sender<Result<(), WorkerError>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response, WorkerError>>,
    },
    Message(ControlMessage),
}

// ============================================================================
// Controller
// ============================================================================

/// Owns one cache generation: populates it at install, garbage-collects
/// superseded generations at activate, and answers intercepted requests
/// cache-first in steady state.
pub struct CacheController<C, F> {
    storage: C,
    fetcher: F,
    origin: String,
    generation: String,
    assets: Vec<String>,
    offline_url: String,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl<C: CacheStorage, F: Fetcher> CacheController<C, F> {
    pub fn new(storage: C, fetcher: F, origin: impl Into<String>) -> Self {
        Self {
            storage,
            fetcher,
            origin: origin.into(),
            generation: CACHE_NAME.to_string(),
            assets: ASSETS.iter().map(|s| s.to_string()).collect(),
            offline_url: OFFLINE_URL.to_string(),
            state: Mutex::new(WorkerState::Installing),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn with_generation(mut self, name: impl Into<String>) -> Self {
        self.generation = name.into();
        self
    }

    pub fn with_assets(mut self, assets: &[&str]) -> Self {
        self.assets = assets.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    /// Resolve a shell-relative asset path against the configured origin.
    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.origin.trim_end_matches('/'), path)
        }
    }

    /// Populate the current generation with the shell assets.
    ///
    /// A store that cannot open aborts the install and the previous
    /// generation stays current. Individual asset failures are logged and
    /// tolerated: a missing optional asset must not keep the whole
    /// generation from activating.
    pub async fn install(&self) -> Result<(), WorkerError> {
        // Take over as soon as activation runs; old clients are not waited on.
        self.skip_waiting.store(true, Ordering::Relaxed);

        self.storage.open(&self.generation).await?;

        let cached = stream::iter(self.assets.clone())
            .map(|path| self.precache(path))
            .buffer_unordered(MAX_CONCURRENT_PRECACHE)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        info!(
            generation = %self.generation,
            cached,
            total = self.assets.len(),
            "Cache generation installed"
        );
        Ok(())
    }

    async fn precache(&self, path: String) -> bool {
        let request = Request::get(self.resolve(&path));
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                match self.storage.put(&self.generation, &request, &response).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(asset = %path, error = %e, "Failed to store precached asset");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(asset = %path, error = %e, "Failed to fetch asset for precache");
                false
            }
        }
    }

    /// Take control: delete every generation other than the current one and
    /// claim all open clients. After this returns, exactly one generation
    /// exists and all lookups address it.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        let names = self.storage.generations().await?;
        for name in names.iter().filter(|n| n.as_str() != self.generation) {
            if let Err(e) = self.storage.delete(name).await {
                warn!(generation = %name, error = %e, "Failed to delete superseded generation");
            }
        }

        *self.state.lock().unwrap() = WorkerState::Active;
        info!(generation = %self.generation, "Cache generation active, claiming all clients");
        Ok(())
    }

    /// Mark this controller as replaced by a newer generation.
    pub fn supersede(&self) {
        *self.state.lock().unwrap() = WorkerState::Superseded;
        debug!(generation = %self.generation, "Cache generation superseded");
    }

    /// Lookup that never fails the request path: store errors are treated
    /// as a miss so a flaky cache degrades to the network.
    async fn cached(&self, request: &Request) -> Option<Response> {
        match self.storage.lookup(&self.generation, request).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Intercept one outgoing request.
    ///
    /// GET: cache-first, then network with write-through, then the offline
    /// document for navigations. Non-GET passes through to the network
    /// unconditionally and is never cached.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, WorkerError> {
        if request.method != Method::Get {
            return Ok(self.fetcher.fetch(request).await?);
        }

        if let Some(cached) = self.cached(request).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if let Err(e) = self.storage.put(&self.generation, request, &response).await {
                    warn!(url = %request.url, error = %e, "Failed to cache fetched response");
                }
                Ok(response)
            }
            Err(e) => {
                if request.is_navigation() {
                    let offline = Request::get(self.resolve(&self.offline_url));
                    if let Some(fallback) = self.cached(&offline).await {
                        info!(url = %request.url, "Network failed, serving offline document");
                        return Ok(fallback);
                    }
                }
                Err(WorkerError::Network(e))
            }
        }
    }

    /// React to an external control signal. `SkipWaiting` makes a
    /// generation that is still installing take over immediately instead of
    /// waiting for the old generation's clients to finish.
    pub async fn handle_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Relaxed);
                info!(generation = %self.generation, "Skip-waiting requested");
                if self.state() == WorkerState::Installing {
                    if let Err(e) = self.activate().await {
                        warn!(generation = %self.generation, error = %e, "Forced activation failed");
                    }
                }
            }
        }
    }
}

// ============================================================================
// Host loop
// ============================================================================

/// Dispatch worker events until the channel closes. Lifecycle events run to
/// completion before the next event; fetches are handled concurrently.
pub async fn run<C, F>(
    controller: Arc<CacheController<C, F>>,
    mut events: mpsc::Receiver<WorkerEvent>,
) where
    C: CacheStorage + 'static,
    F: Fetcher + 'static,
{
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Install { ack } => {
                let _ = ack.send(controller.install().await);
            }
            WorkerEvent::Activate { ack } => {
                let _ = ack.send(controller.activate().await);
            }
            WorkerEvent::Fetch { request, reply } => {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    let _ = reply.send(controller.handle_fetch(&request).await);
                });
            }
            WorkerEvent::Message(message) => controller.handle_message(message).await,
        }
    }
    debug!("Worker event loop terminated");
}

/// Start the host loop on the runtime and return a handle for sending it
/// events.
pub fn spawn<C, F>(controller: CacheController<C, F>) -> WorkerHandle
where
    C: CacheStorage + 'static,
    F: Fetcher + 'static,
{
    let (events, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(run(Arc::new(controller), receiver));
    WorkerHandle { events }
}

/// Client side of the worker event channel.
#[derive(Clone)]
pub struct WorkerHandle {
    events: mpsc::Sender<WorkerEvent>,
}

impl WorkerHandle {
    async fn lifecycle(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), WorkerError>>) -> WorkerEvent,
    ) -> Result<(), WorkerError> {
        let (ack, done) = oneshot::channel();
        self.events
            .send(make(ack))
            .await
            .map_err(|_| WorkerError::Terminated)?;
        done.await.map_err(|_| WorkerError::Terminated)?
    }

    pub async fn install(&self) -> Result<(), WorkerError> {
        self.lifecycle(|ack| WorkerEvent::Install { ack }).await
    }

    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.lifecycle(|ack| WorkerEvent::Activate { ack }).await
    }

    pub async fn fetch(&self, request: Request) -> Result<Response, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(WorkerEvent::Fetch { request, reply })
            .await
            .map_err(|_| WorkerError::Terminated)?;
        response.await.map_err(|_| WorkerError::Terminated)?
    }

    pub async fn skip_waiting(&self) -> Result<(), WorkerError> {
        self.events
            .send(WorkerEvent::Message(ControlMessage::SkipWaiting))
            .await
            .map_err(|_| WorkerError::Terminated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::super::cache::MemoryCache;
    use super::*;

    const ORIGIN: &str = "http://localhost";

    /// Scripted network: URLs with a canned body respond 200; every other
    /// URL fails like an unreachable host. Records every fetched URL.
    struct MockFetcher {
        responses: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn respond(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), body.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.lock().unwrap().push(request.url.clone());
            match self.responses.get(&request.url) {
                Some(body) => Ok(Response {
                    status: 200,
                    content_type: Some("text/plain".to_string()),
                    body: body.as_bytes().to_vec(),
                }),
                None => Err(FetchError::Unreachable(request.url.clone())),
            }
        }
    }

    /// Store whose open always fails, for install-abort coverage.
    struct BrokenStore;

    #[async_trait]
    impl CacheStorage for BrokenStore {
        async fn open(&self, _generation: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("store unavailable")))
        }

        async fn lookup(
            &self,
            _generation: &str,
            _request: &Request,
        ) -> Result<Option<Response>, StoreError> {
            Ok(None)
        }

        async fn put(
            &self,
            _generation: &str,
            _request: &Request,
            _response: &Response,
        ) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("store unavailable")))
        }

        async fn delete(&self, _generation: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn generations(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn controller(
        storage: Arc<MemoryCache>,
        fetcher: MockFetcher,
    ) -> CacheController<Arc<MemoryCache>, MockFetcher> {
        CacheController::new(storage, fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/index.html", "/styles.css"])
    }

    #[tokio::test]
    async fn test_install_tolerates_individual_asset_failure() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new()
            .respond("http://localhost/a", "aaa")
            .respond("http://localhost/c", "ccc");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/a", "/b", "/c"]);

        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Active);

        let a = Request::get("http://localhost/a");
        let b = Request::get("http://localhost/b");
        let c = Request::get("http://localhost/c");
        assert!(storage.lookup("gen-test", &a).await.unwrap().is_some());
        assert!(storage.lookup("gen-test", &b).await.unwrap().is_none());
        assert!(storage.lookup("gen-test", &c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_signals_skip_waiting() {
        let storage = Arc::new(MemoryCache::new());
        let worker = controller(storage, MockFetcher::new());
        assert!(!worker.skip_waiting_requested());

        worker.install().await.unwrap();
        assert!(worker.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_install_fails_when_store_cannot_open() {
        let worker = CacheController::new(BrokenStore, MockFetcher::new(), ORIGIN);

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::Store(_)));
        assert_eq!(worker.state(), WorkerState::Installing);
    }

    #[tokio::test]
    async fn test_activate_deletes_superseded_generations() {
        let storage = Arc::new(MemoryCache::new());
        storage.open("gen-1").await.unwrap();
        storage.open("gen-2").await.unwrap();

        let worker = CacheController::new(Arc::clone(&storage), MockFetcher::new(), ORIGIN)
            .with_generation("gen-2");
        worker.activate().await.unwrap();

        assert_eq!(storage.generations().await.unwrap(), vec!["gen-2".to_string()]);
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_cached_get_never_touches_network() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/index.html", "shell");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/index.html"]);

        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        let installed_calls = worker.fetcher.calls().len();

        let response = worker
            .handle_fetch(&Request::get("http://localhost/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body_text(), "shell");
        assert_eq!(worker.fetcher.calls().len(), installed_calls);
    }

    #[tokio::test]
    async fn test_miss_populates_cache_write_through() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/fresh.js", "fresh");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&[]);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let request = Request::get("http://localhost/fresh.js");
        let first = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(first.body_text(), "fresh");
        assert_eq!(worker.fetcher.calls().len(), 1);

        // Second request is served from the generation, not the network.
        let second = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(second.body_text(), "fresh");
        assert_eq!(worker.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_offline_document() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/index.html", "offline shell");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/index.html"]);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let response = worker
            .handle_fetch(&Request::navigate("http://localhost/some/page"))
            .await
            .unwrap();
        assert_eq!(response.body_text(), "offline shell");
    }

    #[tokio::test]
    async fn test_offline_html_accept_header_falls_back() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/index.html", "offline shell");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/index.html"]);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let request =
            Request::get("http://localhost/other").with_accept("text/html,application/xhtml+xml");
        let response = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(response.body_text(), "offline shell");
    }

    #[tokio::test]
    async fn test_offline_asset_fetch_stays_failed() {
        let storage = Arc::new(MemoryCache::new());
        let worker = controller(storage, MockFetcher::new()).with_assets(&[]);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let err = worker
            .handle_fetch(&Request::get("http://localhost/logo.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Network(_)));
    }

    #[tokio::test]
    async fn test_navigation_without_cached_offline_document_fails() {
        let storage = Arc::new(MemoryCache::new());
        let worker = controller(storage, MockFetcher::new()).with_assets(&[]);
        worker.install().await.unwrap();

        let err = worker
            .handle_fetch(&Request::navigate("http://localhost/page"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Network(_)));
    }

    #[tokio::test]
    async fn test_non_get_passes_through_uncached() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/api/sync", "ok");
        let worker = CacheController::new(Arc::clone(&storage), fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&[]);
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let request = Request::post("http://localhost/api/sync", b"data".to_vec());
        let response = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(response.body_text(), "ok");

        // Nothing was written through; a repeat POST goes to the network.
        worker.handle_fetch(&request).await.unwrap();
        assert_eq!(worker.fetcher.calls().len(), 2);
        assert!(storage
            .lookup("gen-test", &request)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_state_transitions_to_superseded() {
        let storage = Arc::new(MemoryCache::new());
        let worker = controller(storage, MockFetcher::new());
        assert_eq!(worker.state(), WorkerState::Installing);

        worker.activate().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Active);

        worker.supersede();
        assert_eq!(worker.state(), WorkerState::Superseded);
    }

    #[tokio::test]
    async fn test_skip_waiting_forces_immediate_takeover() {
        let storage = Arc::new(MemoryCache::new());
        storage.open("gen-old").await.unwrap();
        let worker = CacheController::new(Arc::clone(&storage), MockFetcher::new(), ORIGIN)
            .with_generation("gen-test")
            .with_assets(&[]);
        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installing);

        worker.handle_message(ControlMessage::SkipWaiting).await;
        assert!(worker.skip_waiting_requested());
        assert_eq!(worker.state(), WorkerState::Active);

        // Takeover ran the full activation: old generations are gone.
        assert_eq!(
            storage.generations().await.unwrap(),
            vec!["gen-test".to_string()]
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_after_activation_is_a_no_op() {
        let storage = Arc::new(MemoryCache::new());
        let worker = controller(Arc::clone(&storage), MockFetcher::new());
        storage.open("gen-test").await.unwrap();
        worker.activate().await.unwrap();
        storage.open("gen-extra").await.unwrap();

        // Already active: the message must not rerun activation cleanup.
        worker.handle_message(ControlMessage::SkipWaiting).await;
        assert_eq!(worker.state(), WorkerState::Active);
        assert_eq!(storage.generations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_loop_end_to_end() {
        let storage = Arc::new(MemoryCache::new());
        let fetcher = MockFetcher::new().respond("http://localhost/index.html", "shell");
        let worker = CacheController::new(storage, fetcher, ORIGIN)
            .with_generation("gen-test")
            .with_assets(&["/index.html"]);

        let handle = spawn(worker);
        handle.install().await.unwrap();
        handle.activate().await.unwrap();
        handle.skip_waiting().await.unwrap();

        let response = handle
            .fetch(Request::get("http://localhost/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body_text(), "shell");

        let err = handle
            .fetch(Request::get("http://localhost/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Network(_)));
    }
}
