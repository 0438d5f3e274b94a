//! Reconciles the pending local collections against the remote service.

use crate::background::{BackgroundRegistrar, SyncTag};
use crate::connectivity::Connectivity;
use crate::db_client::{RemoteStore, LOCATIONS_TABLE, MESSAGES_TABLE, ROAD_CONDITIONS_TABLE};
use crate::error::{RemoteError, StoreError, SyncError};
use crate::models::{
    EvacueeLocationRow, MessageRow, PendingLocation, PendingMessage, RoadConditionReport,
    RoadConditionRow, SyncStatus,
};
use crate::store::{Index, OfflineStore, Record};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one drain over a single collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Left untouched, e.g. no identity or already claimed by another pass.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// `None` when that sub-drain aborted.
    pub messages: Option<DrainReport>,
    pub locations: Option<DrainReport>,
    pub road_reports: Option<DrainReport>,
}

impl SyncReport {
    pub fn total_synced(&self) -> usize {
        [self.messages, self.locations, self.road_reports]
            .iter()
            .flatten()
            .map(|r| r.synced)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Paused,
    Syncing,
    Synced,
}

/// Passive indicator counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusReport {
    pub online: bool,
    pub state: SyncState,
    pub pending_messages: usize,
    pub failed_messages: usize,
    pub pending_locations: usize,
    pub emergency_locations: usize,
    pub pending_reports: usize,
    pub failed_reports: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Sent,
    Queued,
}

/// Resets the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncManager {
    store: Arc<OfflineStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    pub(crate) background: Option<Arc<dyn BackgroundRegistrar>>,
    in_progress: AtomicBool,
    /// Locations carry no sync status to claim, so their drains take turns.
    location_drain: tokio::sync::Mutex<()>,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("store", &self.store)
            .field("online", &self.connectivity.is_online())
            .field("syncing", &self.is_syncing())
            .field("background", &self.background.is_some())
            .finish()
    }
}

impl SyncManager {
    pub fn new(
        store: Arc<OfflineStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            background: None,
            in_progress: AtomicBool::new(false),
            location_drain: tokio::sync::Mutex::new(()),
            auto_sync: Mutex::new(None),
        }
    }

    pub fn with_background(mut self, registrar: Arc<dyn BackgroundRegistrar>) -> Self {
        self.background = Some(registrar);
        self
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Drains messages, then locations, then road reports. Overlapping calls
    /// collapse: if a pass is already running this returns `None` immediately.
    pub async fn sync_all(&self) -> Option<SyncReport> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, skipping");
            return None;
        }
        let _guard = InFlight(&self.in_progress);

        let report = SyncReport {
            messages: Self::logged("messages", self.sync_messages().await),
            locations: Self::logged("locations", self.sync_locations().await),
            road_reports: Self::logged("road reports", self.sync_road_reports().await),
        };
        info!("Sync pass complete: {} record(s) synced", report.total_synced());
        Some(report)
    }

    fn logged(category: &str, result: Result<DrainReport, SyncError>) -> Option<DrainReport> {
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Failed to sync {}: {}", category, e);
                None
            }
        }
    }

    /// Resolved once per drain, so a failing lookup is not repeated per record.
    async fn identity(&self) -> Result<Option<String>, SyncError> {
        self.remote
            .current_user_id()
            .await
            .map_err(SyncError::Identity)
    }

    pub async fn sync_messages(&self) -> Result<DrainReport, SyncError> {
        let mut messages: Vec<PendingMessage> = self.drainable().await?;
        messages.sort_by_key(|m| m.timestamp);

        let mut report = DrainReport::default();
        if messages.is_empty() {
            return Ok(report);
        }
        let sender_id = self.identity().await?;

        for message in messages {
            report.attempted += 1;
            let Some(message) = self.store.claim::<PendingMessage>(&message.id).await? else {
                report.skipped += 1;
                continue;
            };

            let row = MessageRow::from_pending(&message, sender_id.clone());
            match self.insert_row(MESSAGES_TABLE, &row).await {
                Ok(()) => {
                    self.store.remove::<PendingMessage>(&message.id).await?;
                    report.synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync message {}: {}", message.id, e);
                    self.mark::<PendingMessage>(&message.id, SyncStatus::Failed)
                        .await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn sync_locations(&self) -> Result<DrainReport, SyncError> {
        let _turn = self.location_drain.lock().await;
        let mut locations: Vec<PendingLocation> = self.store.get_all().await?;
        // Emergency pings first, then oldest first.
        locations.sort_by_key(|l| (!l.is_emergency, l.timestamp));

        let mut report = DrainReport::default();
        if locations.is_empty() {
            return Ok(report);
        }

        let Some(user_id) = self.identity().await? else {
            debug!("No identity; leaving {} location(s) pending", locations.len());
            report.skipped = locations.len();
            return Ok(report);
        };

        for location in locations {
            report.attempted += 1;
            // Removed since the snapshot, e.g. by a purge.
            if self.store.get::<PendingLocation>(&location.id).await?.is_none() {
                report.skipped += 1;
                continue;
            }

            let row = EvacueeLocationRow::from_pending(&location, user_id.clone());
            match self.insert_row(LOCATIONS_TABLE, &row).await {
                Ok(()) => {
                    self.store.remove::<PendingLocation>(&location.id).await?;
                    report.synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync location {}: {}", location.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn sync_road_reports(&self) -> Result<DrainReport, SyncError> {
        let mut reports: Vec<RoadConditionReport> = self.drainable().await?;
        reports.sort_by_key(|r| r.timestamp);

        let mut report = DrainReport::default();
        if reports.is_empty() {
            return Ok(report);
        }

        let Some(user_id) = self.identity().await? else {
            debug!("No identity; leaving {} road report(s) pending", reports.len());
            report.skipped = reports.len();
            return Ok(report);
        };

        for pending in reports {
            report.attempted += 1;
            let Some(road) = self.store.claim::<RoadConditionReport>(&pending.id).await? else {
                report.skipped += 1;
                continue;
            };

            let row = RoadConditionRow::from_report(&road, user_id.clone());
            match self.insert_row(ROAD_CONDITIONS_TABLE, &row).await {
                Ok(()) => {
                    self.store.remove::<RoadConditionReport>(&road.id).await?;
                    report.synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync road report {}: {}", road.id, e);
                    self.mark::<RoadConditionReport>(&road.id, SyncStatus::Failed)
                        .await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Pending and failed records of a status-tracked collection.
    async fn drainable<T>(&self) -> Result<Vec<T>, StoreError>
    where
        T: Record,
    {
        let mut records: Vec<T> = self
            .store
            .get_all_by_index(Index::SyncStatus(SyncStatus::Pending))
            .await?;
        records.extend(
            self.store
                .get_all_by_index::<T>(Index::SyncStatus(SyncStatus::Failed))
                .await?,
        );
        Ok(records)
    }

    async fn mark<T>(&self, id: &str, status: SyncStatus) -> Result<(), StoreError>
    where
        T: Record + crate::models::Syncable,
    {
        self.store
            .update::<T, _>(id, |record| record.set_sync_status(status))
            .await?;
        Ok(())
    }

    async fn insert_row<R: Serialize>(&self, table: &str, row: &R) -> Result<(), RemoteError> {
        let value = serde_json::to_value(row)?;
        self.remote.insert(table, value).await
    }

    /// Returns records left in `syncing` by an interrupted pass to `pending`.
    pub async fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;
        let messages: Vec<PendingMessage> = self
            .store
            .get_all_by_index(Index::SyncStatus(SyncStatus::Syncing))
            .await?;
        for message in messages {
            self.mark::<PendingMessage>(&message.id, SyncStatus::Pending)
                .await?;
            recovered += 1;
        }
        let reports: Vec<RoadConditionReport> = self
            .store
            .get_all_by_index(Index::SyncStatus(SyncStatus::Syncing))
            .await?;
        for report in reports {
            self.mark::<RoadConditionReport>(&report.id, SyncStatus::Pending)
                .await?;
            recovered += 1;
        }
        if recovered > 0 {
            info!("Recovered {} interrupted record(s)", recovered);
        }
        Ok(recovered)
    }

    // ===== AUTO SYNC =====

    /// Starts (or restarts) the recurring sync. Each tick, and each transition
    /// to online, runs `sync_all` when online and idle. Runs one pass
    /// immediately if already online.
    pub async fn start_auto_sync(self: &Arc<Self>, interval: Duration) {
        self.stop_auto_sync();

        if let Err(e) = self.recover_interrupted().await {
            warn!("Could not recover interrupted records: {}", e);
        }

        let weak = Arc::downgrade(self);
        let connectivity = self.connectivity.subscribe();
        let handle = tokio::spawn(auto_sync_loop(weak, connectivity, interval));
        if let Ok(mut slot) = self.auto_sync.lock() {
            *slot = Some(handle);
        }
        info!("Auto sync started every {:?}", interval);

        if self.connectivity.is_online() {
            self.sync_all().await;
        }
    }

    /// Cancels the recurring timer. A pass already running is not interrupted.
    pub fn stop_auto_sync(&self) {
        let handle = match self.auto_sync.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.abort();
            info!("Auto sync stopped");
        }
    }

    pub fn is_auto_syncing(&self) -> bool {
        self.auto_sync
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    // ===== STATUS =====

    pub async fn status(&self) -> Result<SyncStatusReport, StoreError> {
        let pending_messages = self
            .store
            .get_all_by_index::<PendingMessage>(Index::SyncStatus(SyncStatus::Pending))
            .await?
            .len();
        let failed_messages = self
            .store
            .get_all_by_index::<PendingMessage>(Index::SyncStatus(SyncStatus::Failed))
            .await?
            .len();
        let pending_locations = self.store.count::<PendingLocation>().await?;
        let emergency_locations = self
            .store
            .get_all_by_index::<PendingLocation>(Index::IsEmergency(true))
            .await?
            .len();
        let pending_reports = self
            .store
            .get_all_by_index::<RoadConditionReport>(Index::SyncStatus(SyncStatus::Pending))
            .await?
            .len();
        let failed_reports = self
            .store
            .get_all_by_index::<RoadConditionReport>(Index::SyncStatus(SyncStatus::Failed))
            .await?
            .len();

        let online = self.connectivity.is_online();
        let state = if !online {
            SyncState::Paused
        } else if self.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Synced
        };

        Ok(SyncStatusReport {
            online,
            state,
            pending_messages,
            failed_messages,
            pending_locations,
            emergency_locations,
            pending_reports,
            failed_reports,
        })
    }

    // ===== OUTBOX =====

    /// Sends directly when online; otherwise, or if the send fails, queues the
    /// message and asks for a background sync.
    pub async fn send_message(&self, message: PendingMessage) -> Result<Delivery, StoreError> {
        if self.connectivity.is_online() {
            match self.send_direct(&message).await {
                Ok(()) => return Ok(Delivery::Sent),
                Err(e) => warn!("Direct send failed, queueing message {}: {}", message.id, e),
            }
        }
        self.store.add(message).await?;
        self.request_background_sync(SyncTag::Messages).await;
        Ok(Delivery::Queued)
    }

    async fn send_direct(&self, message: &PendingMessage) -> Result<(), RemoteError> {
        let sender_id = self.remote.current_user_id().await?;
        let row = MessageRow::from_pending(message, sender_id);
        self.insert_row(MESSAGES_TABLE, &row).await
    }

    /// Queues a location ping for the next pass.
    pub async fn share_location(&self, location: PendingLocation) -> Result<Delivery, StoreError> {
        self.store.add(location).await?;
        self.request_background_sync(SyncTag::Location).await;
        Ok(Delivery::Queued)
    }

    pub async fn report_road_condition(
        &self,
        report: RoadConditionReport,
    ) -> Result<Delivery, StoreError> {
        self.store.add(report).await?;
        self.request_background_sync(SyncTag::Reports).await;
        Ok(Delivery::Queued)
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop_auto_sync();
    }
}

async fn auto_sync_loop(
    manager: Weak<SyncManager>,
    mut connectivity: tokio::sync::watch::Receiver<bool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; the initial pass is run by the caller.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*connectivity.borrow_and_update() {
                    continue;
                }
                debug!("Back online, syncing");
            }
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };
        if manager.connectivity.is_online() && !manager.is_syncing() {
            manager.sync_all().await;
        }
    }
}
