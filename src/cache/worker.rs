//! The background cache worker: install/activate lifecycle, fetch handling and
//! the foreground control channel.

use super::fetch::{Fetcher, Request, Response};
use super::partition::{CacheStorage, PartitionId, PartitionKind, PARTITION_PREFIX};
use super::{route, Route, Strategy, ICON_ASSETS, SHELL_PATH, STATIC_ASSETS};
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

const EVENT_CAPACITY: usize = 16;
const CONTROL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed, but not yet controlling requests.
    Waiting,
    Active,
}

/// Published to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Installed { assets: usize },
    Activated { deleted: Vec<String> },
    /// A new version has taken control; pages should offer a reload.
    Updated { version: String },
    RoutesCached { stored: usize },
    CacheCleared { removed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteRef {
    #[serde(default)]
    pub url: Option<String>,
}

/// Foreground -> worker messages, e.g. `{"type":"CACHE_ROUTES","routes":[{"url":"..."}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
    CacheRoutes {
        #[serde(default)]
        routes: Vec<RouteRef>,
    },
    ClearCache,
}

pub struct CacheWorker {
    origin: Url,
    version: String,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
    events: broadcast::Sender<WorkerEvent>,
}

impl std::fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("origin", &self.origin.as_str())
            .field("version", &self.version)
            .field("state", &self.state())
            .finish()
    }
}

impl CacheWorker {
    pub fn new(
        origin: Url,
        version: impl Into<String>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            origin,
            version: version.into(),
            storage,
            fetcher,
            state: RwLock::new(WorkerState::Installing),
            events,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(WorkerState::Installing)
    }

    fn set_state(&self, next: WorkerState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn partition(&self, kind: PartitionKind) -> String {
        PartitionId::new(kind, self.version.as_str()).name()
    }

    fn resolve(&self, path: &str) -> Result<Url, CacheError> {
        self.origin
            .join(path)
            .map_err(|e| CacheError::Network(format!("{}: {}", path, e)))
    }

    // ===== LIFECYCLE =====

    /// Pre-caches the application shell. Either every asset is stored or none is.
    pub async fn install(&self) -> Result<usize, CacheError> {
        info!("Installing cache worker {}", self.version);
        self.set_state(WorkerState::Installing);

        let mut entries = Vec::new();
        for asset in STATIC_ASSETS.iter().filter(|a| !ICON_ASSETS.contains(*a)) {
            let url = self.resolve(asset)?;
            let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
            if !response.is_ok() {
                return Err(CacheError::Network(format!(
                    "{} returned HTTP {}",
                    url, response.status
                )));
            }
            entries.push((url.to_string(), response));
        }

        let partition = self.partition(PartitionKind::Static);
        self.storage.put_all(&partition, &entries)?;
        info!("Cached {} static asset(s) in {}", entries.len(), partition);

        self.set_state(WorkerState::Waiting);
        self.emit(WorkerEvent::Installed {
            assets: entries.len(),
        });
        Ok(entries.len())
    }

    /// Deletes partitions left by other versions and takes control.
    pub fn activate(&self) -> Result<Vec<String>, CacheError> {
        info!("Activating cache worker {}", self.version);
        let whitelist = PartitionId::whitelist(&self.version);

        let mut deleted = Vec::new();
        for name in self.storage.partitions()? {
            if name.starts_with(PARTITION_PREFIX) && !whitelist.contains(&name) {
                info!("Deleting old cache partition {}", name);
                self.storage.delete_partition(&name)?;
                deleted.push(name);
            }
        }

        self.set_state(WorkerState::Active);
        self.emit(WorkerEvent::Activated {
            deleted: deleted.clone(),
        });
        self.emit(WorkerEvent::Updated {
            version: self.version.clone(),
        });
        Ok(deleted)
    }

    // ===== FETCH =====

    /// Serves one request. Until the worker is active every request goes
    /// straight to the network, as do non-GET requests.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, CacheError> {
        if self.state() != WorkerState::Active {
            return self.fetcher.fetch(request).await;
        }
        match route(request) {
            Route::PassThrough => self.fetcher.fetch(request).await,
            Route::Cached(Strategy::CacheFirst, kind) => self.cache_first(request, kind).await,
            Route::Cached(Strategy::NetworkFirst, kind) => self.network_first(request, kind).await,
        }
    }

    async fn cache_first(
        &self,
        request: &Request,
        kind: PartitionKind,
    ) -> Result<Response, CacheError> {
        let partition = self.partition(kind);
        if let Some(cached) = self.storage.match_in(&partition, request.url.as_str())? {
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(kind, request, &response);
                Ok(response)
            }
            Err(e) => {
                error!("Fetch failed for {}: {}", request.url, e);
                self.shell_fallback(request)?
                    .ok_or_else(|| CacheError::NoFallback {
                        url: request.url.to_string(),
                    })
            }
        }
    }

    async fn network_first(
        &self,
        request: &Request,
        kind: PartitionKind,
    ) -> Result<Response, CacheError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(kind, request, &response);
                Ok(response)
            }
            Err(e) => {
                warn!("Network request failed for {}, trying cache: {}", request.url, e);
                if let Some(cached) = self.storage.match_any(request.url.as_str())? {
                    return Ok(cached);
                }
                self.shell_fallback(request)?
                    .ok_or_else(|| CacheError::NoFallback {
                        url: request.url.to_string(),
                    })
            }
        }
    }

    /// Stores an ok response and trims the partition. Storage failures never
    /// fail the fetch itself.
    fn store(&self, kind: PartitionKind, request: &Request, response: &Response) {
        if !response.is_ok() {
            return;
        }
        let partition = self.partition(kind);
        let result = self
            .storage
            .put(&partition, request.url.as_str(), response)
            .and_then(|_| self.storage.trim(&partition, kind.cap()));
        if let Err(e) = result {
            warn!("Could not cache {} in {}: {}", request.url, partition, e);
        }
    }

    fn shell_fallback(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        if !request.navigate {
            return Ok(None);
        }
        let shell = self.resolve(SHELL_PATH)?;
        debug!("Serving application shell for {}", request.url);
        self.storage.match_any(shell.as_str())
    }

    // ===== CONTROL =====

    pub async fn handle_message(&self, message: ControlMessage) -> Result<(), CacheError> {
        match message {
            ControlMessage::SkipWaiting => {
                if self.state() != WorkerState::Active {
                    self.activate()?;
                }
            }
            ControlMessage::CacheRoutes { routes } => {
                self.cache_routes(&routes).await?;
            }
            ControlMessage::ClearCache => {
                self.clear_all()?;
            }
        }
        Ok(())
    }

    /// Fetches each route URL into the routes partition. Entries without a URL,
    /// failed fetches and non-ok responses are skipped.
    pub async fn cache_routes(&self, routes: &[RouteRef]) -> Result<usize, CacheError> {
        let partition = self.partition(PartitionKind::Routes);
        let mut stored = 0;
        for url in routes.iter().filter_map(|r| r.url.as_deref()) {
            let target = match self.resolve(url) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Skipping route {}: {}", url, e);
                    continue;
                }
            };
            match self.fetcher.fetch(&Request::get(target.clone())).await {
                Ok(response) if response.is_ok() => {
                    self.storage.put(&partition, target.as_str(), &response)?;
                    stored += 1;
                }
                Ok(response) => warn!("Route {} returned HTTP {}", target, response.status),
                Err(e) => error!("Failed to cache route {}: {}", target, e),
            }
        }
        info!("Cached {} route package(s)", stored);
        self.emit(WorkerEvent::RoutesCached { stored });
        Ok(stored)
    }

    /// Deletes every partition, whatever its version.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let removed = self.storage.clear_all()?;
        info!("Cleared all caches ({} entries)", removed);
        self.emit(WorkerEvent::CacheCleared { removed });
        Ok(removed)
    }
}

/// Runs a [`CacheWorker`] on its own task and accepts control messages.
#[derive(Debug)]
pub struct WorkerHandle {
    worker: Arc<CacheWorker>,
    tx: mpsc::Sender<ControlMessage>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Installs, then activates without waiting, then serves control messages
    /// until every handle is dropped. A failed install is logged and the
    /// worker still activates.
    pub fn spawn(worker: Arc<CacheWorker>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ControlMessage>(CONTROL_CAPACITY);
        let background = Arc::clone(&worker);

        let task = tokio::spawn(async move {
            if let Err(e) = background.install().await {
                error!("Failed to cache static assets: {}", e);
            }
            if let Err(e) = background.activate() {
                error!("Failed to activate cache worker: {}", e);
            }
            while let Some(message) = rx.recv().await {
                debug!("Control message: {:?}", message);
                if let Err(e) = background.handle_message(message).await {
                    error!("Control message failed: {}", e);
                }
            }
        });

        Self { worker, tx, task }
    }

    pub fn worker(&self) -> &Arc<CacheWorker> {
        &self.worker
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.worker.subscribe()
    }

    pub async fn post_message(&self, message: ControlMessage) -> Result<(), CacheError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CacheError::WorkerStopped)
    }

    /// Accepts the JSON form used across contexts.
    pub async fn post_json(&self, json: &str) -> Result<(), CacheError> {
        let message: ControlMessage = serde_json::from_str(json)?;
        self.post_message(message).await
    }

    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, CacheError> {
        self.worker.handle_fetch(request).await
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        let message: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(message, ControlMessage::SkipWaiting);

        let message: ControlMessage = serde_json::from_str(
            r#"{"type":"CACHE_ROUTES","routes":[{"url":"/routes/a.json"},{}]}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ControlMessage::CacheRoutes {
                routes: vec![
                    RouteRef {
                        url: Some("/routes/a.json".to_string())
                    },
                    RouteRef { url: None },
                ]
            }
        );

        let json = serde_json::to_string(&ControlMessage::ClearCache).unwrap();
        assert_eq!(json, r#"{"type":"CLEAR_CACHE"}"#);
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"PUSH"}"#).is_err());
    }
}
