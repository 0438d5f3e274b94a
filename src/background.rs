//! Deferred, tag-coalesced sync requests.
//!
//! A registrar accepts a [`SyncTag`] and promises to run the matching drain
//! later, once. Tags already waiting are not queued again. Where no registrar
//! is available the request falls back to an immediate full sync.

use crate::error::{BackgroundSyncError, SyncError};
use crate::store::Collection;
use crate::sync::{DrainReport, SyncManager};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
    Messages,
    Location,
    Reports,
}

impl SyncTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTag::Messages => "sync-messages",
            SyncTag::Location => "sync-location",
            SyncTag::Reports => "sync-reports",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            SyncTag::Messages => Collection::PendingMessages,
            SyncTag::Location => Collection::PendingLocations,
            SyncTag::Reports => Collection::RoadConditionReports,
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync-messages" => Ok(SyncTag::Messages),
            "sync-location" => Ok(SyncTag::Location),
            "sync-reports" => Ok(SyncTag::Reports),
            other => Err(format!("Unknown sync tag: {}", other)),
        }
    }
}

/// Platform hook for deferred sync registration.
#[async_trait]
pub trait BackgroundRegistrar: Send + Sync {
    async fn register(&self, tag: SyncTag) -> Result<(), BackgroundSyncError>;
}

impl SyncManager {
    /// Builds a shared manager wired to an in-process [`TokioBackgroundSync`].
    /// Must be called from within a tokio runtime.
    pub fn with_tokio_background(
        store: Arc<crate::store::OfflineStore>,
        remote: Arc<dyn crate::db_client::RemoteStore>,
        connectivity: crate::connectivity::Connectivity,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let registrar = TokioBackgroundSync::spawn(weak.clone());
            SyncManager::new(store, remote, connectivity).with_background(Arc::new(registrar))
        })
    }

    /// Asks the registrar to run `tag` later. Without a registrar, or when
    /// registration fails, runs a full sync right away instead.
    pub async fn request_background_sync(&self, tag: SyncTag) {
        if let Some(registrar) = &self.background {
            match registrar.register(tag).await {
                Ok(()) => {
                    debug!("Registered background sync {}", tag);
                    return;
                }
                Err(e) => warn!("Background sync registration failed for {}: {}", tag, e),
            }
        }
        self.sync_all().await;
    }

    /// Runs the drain that belongs to `tag`.
    pub async fn handle_background_sync(
        &self,
        tag: SyncTag,
    ) -> Result<DrainReport, SyncError> {
        info!("Background sync fired: {}", tag);
        match tag {
            SyncTag::Messages => self.sync_messages().await,
            SyncTag::Location => self.sync_locations().await,
            SyncTag::Reports => self.sync_road_reports().await,
        }
    }
}

/// In-process registrar: a worker task that dispatches each tag to the
/// manager, coalescing tags that are still waiting. Tags registered while
/// offline are held until connectivity returns.
pub struct TokioBackgroundSync {
    tx: mpsc::UnboundedSender<SyncTag>,
    queued: Arc<Mutex<HashSet<SyncTag>>>,
    worker: JoinHandle<()>,
}

impl fmt::Debug for TokioBackgroundSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioBackgroundSync")
            .field("queued", &self.queued_tags())
            .finish()
    }
}

impl TokioBackgroundSync {
    /// Spawns the worker. It holds only a weak reference, so it exits once the
    /// manager is dropped.
    pub fn spawn(manager: Weak<SyncManager>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncTag>();
        let queued: Arc<Mutex<HashSet<SyncTag>>> = Arc::new(Mutex::new(HashSet::new()));
        let worker_queued = Arc::clone(&queued);

        let worker = tokio::spawn(async move {
            while let Some(tag) = rx.recv().await {
                let Some(manager) = wait_until_online(&manager, tag).await else {
                    break;
                };
                if let Ok(mut set) = worker_queued.lock() {
                    set.remove(&tag);
                }
                match manager.handle_background_sync(tag).await {
                    Ok(report) => debug!("Background sync {} finished: {:?}", tag, report),
                    Err(e) => warn!("Background sync {} failed: {}", tag, e),
                }
            }
        });

        Self { tx, queued, worker }
    }

    pub fn queued_tags(&self) -> Vec<SyncTag> {
        self.queued
            .lock()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Resolves once the manager is online. `None` when the manager is gone.
async fn wait_until_online(manager: &Weak<SyncManager>, tag: SyncTag) -> Option<Arc<SyncManager>> {
    let mut online = {
        let strong = manager.upgrade()?;
        if strong.connectivity().is_online() {
            return Some(strong);
        }
        strong.connectivity().subscribe()
    };
    debug!("Offline, holding background sync {} until reconnect", tag);
    online.wait_for(|up| *up).await.ok()?;
    manager.upgrade()
}

impl Drop for TokioBackgroundSync {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
impl BackgroundRegistrar for TokioBackgroundSync {
    async fn register(&self, tag: SyncTag) -> Result<(), BackgroundSyncError> {
        {
            let mut set = self
                .queued
                .lock()
                .map_err(|e| BackgroundSyncError::Rejected(e.to_string()))?;
            if !set.insert(tag) {
                return Ok(());
            }
        }
        self.tx
            .send(tag)
            .map_err(|_| BackgroundSyncError::Unsupported)
    }
}
