//! Durable local store for records created while offline.
//!
//! Six collections live in one versioned `native_db` database. Every mutation
//! is a single read-write transaction scoped to one collection; nothing here
//! touches the network.

use crate::error::StoreError;
use crate::models::v1::{
    CachedRouteKey, DownloadedPackageKey, MapTileKey, PendingLocationKey, PendingMessageKey,
    RoadConditionReportKey,
};
use crate::models::{
    now_millis, CachedRoute, DownloadedPackage, MapTile, PendingLocation, PendingMessage,
    RoadConditionReport, SyncStatus, Syncable,
};
use native_db::transaction::RTransaction;
use native_db::{Builder, Database, Models, ToInput};
use once_cell::sync::OnceCell;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DB_NAME: &str = "agos-db";
pub const DB_VERSION: u32 = 1;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

static MODELS: OnceCell<Models> = OnceCell::new();

fn models() -> Result<&'static Models, StoreError> {
    MODELS.get_or_try_init(|| {
        let mut models = Models::new();
        models.define::<PendingMessage>()?;
        models.define::<CachedRoute>()?;
        models.define::<PendingLocation>()?;
        models.define::<RoadConditionReport>()?;
        models.define::<DownloadedPackage>()?;
        models.define::<MapTile>()?;
        Ok::<_, StoreError>(models)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    PendingMessages,
    CachedRoutes,
    PendingLocations,
    RoadConditionReports,
    DownloadedPackages,
    MapTiles,
}

impl Collection {
    /// Collections drained by the sync manager and reclaimed by `clear_old_data`.
    pub const PENDING: [Collection; 3] = [
        Collection::PendingMessages,
        Collection::PendingLocations,
        Collection::RoadConditionReports,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::PendingMessages => "pendingMessages",
            Collection::CachedRoutes => "cachedRoutes",
            Collection::PendingLocations => "pendingLocations",
            Collection::RoadConditionReports => "roadConditionReports",
            Collection::DownloadedPackages => "downloadedPackages",
            Collection::MapTiles => "mapTiles",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Secondary index lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Index {
    SyncStatus(SyncStatus),
    /// Every record whose timestamp (or `downloaded_at`) is `<=` the cutoff.
    TimestampUpTo(i64),
    IsEmergency(bool),
}

impl Index {
    fn name(&self) -> &'static str {
        match self {
            Index::SyncStatus(_) => "syncStatus",
            Index::TimestampUpTo(_) => "timestamp",
            Index::IsEmergency(_) => "isEmergency",
        }
    }
}

/// Binds a model to its collection and its secondary indexes.
pub trait Record: ToInput + Clone + fmt::Debug + Send + 'static {
    const COLLECTION: Collection;
    /// Append-only collections reject an existing id; the others upsert.
    const APPEND_ONLY: bool;

    fn record_id(&self) -> String;

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError>;
}

fn unknown_index<T: Record>(index: &Index) -> StoreError {
    StoreError::UnknownIndex {
        collection: T::COLLECTION.name().to_string(),
        index: index.name().to_string(),
    }
}

/// Key range for `timestamp <= cutoff`. `i64` keys are stored big-endian, so
/// only non-negative timestamps sort in order, and native_db reads `..=end` as
/// an exclusive bound. Negative cutoffs match nothing.
fn timestamp_range(cutoff: i64) -> Option<Range<i64>> {
    (cutoff >= 0).then(|| 0..cutoff.saturating_add(1))
}

fn scan_all<T: Record>(r: &RTransaction) -> Result<Vec<T>, StoreError> {
    let items: Vec<T> = r
        .scan()
        .primary::<T>()?
        .all()?
        .collect::<Result<Vec<T>, _>>()?;
    Ok(items)
}

impl Record for PendingMessage {
    const COLLECTION: Collection = Collection::PendingMessages;
    const APPEND_ONLY: bool = true;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::SyncStatus(status) => r
                .scan()
                .secondary(PendingMessageKey::sync_status)?
                .range(*status..=*status)?
                .collect::<Result<Vec<Self>, _>>()?,
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(PendingMessageKey::timestamp)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

impl Record for PendingLocation {
    const COLLECTION: Collection = Collection::PendingLocations;
    const APPEND_ONLY: bool = true;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(PendingLocationKey::timestamp)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            Index::IsEmergency(flag) => {
                let key = u8::from(*flag);
                r.scan()
                    .secondary(PendingLocationKey::emergency_key)?
                    .range(key..=key)?
                    .collect::<Result<Vec<Self>, _>>()?
            }
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

impl Record for RoadConditionReport {
    const COLLECTION: Collection = Collection::RoadConditionReports;
    const APPEND_ONLY: bool = true;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::SyncStatus(status) => r
                .scan()
                .secondary(RoadConditionReportKey::sync_status)?
                .range(*status..=*status)?
                .collect::<Result<Vec<Self>, _>>()?,
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(RoadConditionReportKey::timestamp)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

impl Record for CachedRoute {
    const COLLECTION: Collection = Collection::CachedRoutes;
    const APPEND_ONLY: bool = false;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(CachedRouteKey::timestamp)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

impl Record for DownloadedPackage {
    const COLLECTION: Collection = Collection::DownloadedPackages;
    const APPEND_ONLY: bool = false;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(DownloadedPackageKey::downloaded_at)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

impl Record for MapTile {
    const COLLECTION: Collection = Collection::MapTiles;
    const APPEND_ONLY: bool = false;

    fn record_id(&self) -> String {
        self.url.clone()
    }

    fn query_index(r: &RTransaction, index: &Index) -> Result<Vec<Self>, StoreError> {
        let items: Vec<Self> = match index {
            Index::TimestampUpTo(cutoff) => match timestamp_range(*cutoff) {
                Some(range) => r
                    .scan()
                    .secondary(MapTileKey::timestamp)?
                    .range(range)?
                    .collect::<Result<Vec<Self>, _>>()?,
                None => Vec::new(),
            },
            other => return Err(unknown_index::<Self>(other)),
        };
        Ok(items)
    }
}

enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Long-lived handle to the local database. Construct once and share it
/// (usually behind an `Arc`) with the sync manager and UI.
pub struct OfflineStore {
    location: StoreLocation,
    db: OnceCell<Database<'static>>,
}

impl fmt::Debug for OfflineStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match &self.location {
            StoreLocation::File(path) => path.display().to_string(),
            StoreLocation::Memory => "memory".to_string(),
        };
        f.debug_struct("OfflineStore")
            .field("location", &location)
            .field(
                "db",
                if self.db.get().is_some() {
                    &"Open"
                } else {
                    &"Closed"
                },
            )
            .finish()
    }
}

impl OfflineStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            db: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            db: OnceCell::new(),
        }
    }

    /// Opens the database, creating the schema on first use. Idempotent.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.db.get_or_try_init(|| self.open())?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.db.get().is_some()
    }

    fn open(&self) -> Result<Database<'static>, StoreError> {
        let models = models()?;
        let db = match &self.location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::StorageUnavailable(format!("{}: {}", parent.display(), e))
                    })?;
                }
                Builder::new().create(models, path).map_err(|e| {
                    StoreError::StorageUnavailable(format!("{}: {}", path.display(), e))
                })?
            }
            StoreLocation::Memory => Builder::new()
                .create_in_memory(models)
                .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?,
        };
        info!("Opened local database {} (schema v{})", DB_NAME, DB_VERSION);
        Ok(db)
    }

    fn db(&self) -> Result<&Database<'static>, StoreError> {
        self.db.get().ok_or(StoreError::NotInitialized)
    }

    /// Inserts a record. Append-only collections fail with `DuplicateKey` on an
    /// existing id; cached routes, packages and tiles are overwritten.
    pub async fn add<T: Record>(&self, record: T) -> Result<(), StoreError> {
        let db = self.db()?;
        let id = record.record_id();
        let rw = db.rw_transaction()?;
        if let Some(existing) = rw.get().primary::<T>(id.clone())? {
            if T::APPEND_ONLY {
                return Err(StoreError::DuplicateKey {
                    collection: T::COLLECTION.name().to_string(),
                    id,
                });
            }
            rw.remove(existing)?;
        }
        rw.insert(record)?;
        rw.commit()?;
        debug!("Stored {} in {}", id, T::COLLECTION);
        Ok(())
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let db = self.db()?;
        let r = db.r_transaction()?;
        let item: Option<T> = r.get().primary(id.to_string())?;
        Ok(item)
    }

    pub async fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let db = self.db()?;
        let r = db.r_transaction()?;
        scan_all::<T>(&r)
    }

    pub async fn get_all_by_index<T: Record>(&self, index: Index) -> Result<Vec<T>, StoreError> {
        let db = self.db()?;
        let r = db.r_transaction()?;
        T::query_index(&r, &index)
    }

    pub async fn count<T: Record>(&self) -> Result<usize, StoreError> {
        Ok(self.get_all::<T>().await?.len())
    }

    /// Read-modify-write of one record. Returns the updated record, or `None`
    /// (and writes nothing) when the id is absent.
    pub async fn update<T, F>(&self, id: &str, mutator: F) -> Result<Option<T>, StoreError>
    where
        T: Record,
        F: FnOnce(&mut T),
    {
        let db = self.db()?;
        let rw = db.rw_transaction()?;
        let Some(current) = rw.get().primary::<T>(id.to_string())? else {
            return Ok(None);
        };
        let mut updated = current.clone();
        mutator(&mut updated);
        rw.update(current, updated.clone())?;
        rw.commit()?;
        Ok(Some(updated))
    }

    /// Atomically moves a `pending`/`failed` record to `syncing`. Returns `None`
    /// if the record is gone or another pass already holds it.
    pub async fn claim<T>(&self, id: &str) -> Result<Option<T>, StoreError>
    where
        T: Record + Syncable,
    {
        let db = self.db()?;
        let rw = db.rw_transaction()?;
        let Some(current) = rw.get().primary::<T>(id.to_string())? else {
            return Ok(None);
        };
        if !current.is_drainable() {
            return Ok(None);
        }
        let mut claimed = current.clone();
        claimed.set_sync_status(SyncStatus::Syncing);
        rw.update(current, claimed.clone())?;
        rw.commit()?;
        Ok(Some(claimed))
    }

    /// Deletes a record by id. Deleting an absent id is a no-op and returns `false`.
    pub async fn remove<T: Record>(&self, id: &str) -> Result<bool, StoreError> {
        let db = self.db()?;
        let rw = db.rw_transaction()?;
        let Some(current) = rw.get().primary::<T>(id.to_string())? else {
            return Ok(false);
        };
        rw.remove(current)?;
        rw.commit()?;
        Ok(true)
    }

    /// Deletes every record with `timestamp <= cutoff` from each named collection.
    /// Returns the number of records removed.
    pub async fn purge_older_than(
        &self,
        collections: &[Collection],
        cutoff: i64,
    ) -> Result<usize, StoreError> {
        let mut removed = 0;
        for collection in collections {
            let count = match collection {
                Collection::PendingMessages => self.purge::<PendingMessage>(cutoff)?,
                Collection::CachedRoutes => self.purge::<CachedRoute>(cutoff)?,
                Collection::PendingLocations => self.purge::<PendingLocation>(cutoff)?,
                Collection::RoadConditionReports => self.purge::<RoadConditionReport>(cutoff)?,
                Collection::DownloadedPackages => self.purge::<DownloadedPackage>(cutoff)?,
                Collection::MapTiles => self.purge::<MapTile>(cutoff)?,
            };
            if count > 0 {
                info!("Purged {} record(s) from {}", count, collection);
            }
            removed += count;
        }
        Ok(removed)
    }

    /// Reclaims pending records older than `days_old` days. An age reaching
    /// past the representable range purges nothing.
    pub async fn clear_old_data(&self, days_old: i64) -> Result<usize, StoreError> {
        if days_old < 0 {
            return Err(StoreError::InvalidAge(days_old));
        }
        let cutoff = days_old
            .checked_mul(MILLIS_PER_DAY)
            .map_or(i64::MIN, |age| now_millis().saturating_sub(age));
        self.purge_older_than(&Collection::PENDING, cutoff).await
    }

    fn purge<T: Record>(&self, cutoff: i64) -> Result<usize, StoreError> {
        let db = self.db()?;
        let stale = {
            let r = db.r_transaction()?;
            T::query_index(&r, &Index::TimestampUpTo(cutoff))?
        };
        if stale.is_empty() {
            return Ok(0);
        }

        let rw = db.rw_transaction()?;
        let mut removed = 0;
        for record in stale {
            if let Some(current) = rw.get().primary::<T>(record.record_id())? {
                rw.remove(current)?;
                removed += 1;
            }
        }
        rw.commit()?;
        Ok(removed)
    }

    // ===== TYPED CONVENIENCE ACCESSORS =====

    pub async fn cached_route(&self, id: &str) -> Result<Option<CachedRoute>, StoreError> {
        self.get(id).await
    }

    pub async fn downloaded_packages(&self) -> Result<Vec<DownloadedPackage>, StoreError> {
        self.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatLng, MessageType, RoadStatus};

    async fn open_store() -> OfflineStore {
        let store = OfflineStore::in_memory();
        store.initialize().await.unwrap();
        store
    }

    fn message(id: &str) -> PendingMessage {
        PendingMessage::new("help".to_string(), MessageType::Alert, 3).with_id(id)
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let store = OfflineStore::in_memory();
        let result = store.get_all::<PendingMessage>().await;
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.count::<PendingMessage>().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_only_rejects_duplicate_id() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();

        let result = store.add(message("m1")).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(store.count::<PendingMessage>().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cached_route_upserts() {
        let store = open_store().await;
        let data = serde_json::json!({"distance": 1200});
        let geometry = serde_json::json!({"type": "LineString"});
        store
            .add(CachedRoute::new("r1", &data, &geometry, 1))
            .await
            .unwrap();
        store
            .add(CachedRoute::new("r1", &data, &geometry, 2))
            .await
            .unwrap();

        assert_eq!(store.count::<CachedRoute>().await.unwrap(), 1);
        let route = store.cached_route("r1").await.unwrap().unwrap();
        assert_eq!(route.version, 2);
        assert_eq!(route.route_data_json().unwrap(), data);
    }

    #[tokio::test]
    async fn test_update_and_remove_of_absent_id_are_noops() {
        let store = open_store().await;
        let updated = store
            .update::<PendingMessage, _>("missing", |m| m.sync_status = SyncStatus::Failed)
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(!store.remove::<PendingMessage>("missing").await.unwrap());
        assert_eq!(store.count::<PendingMessage>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_by_sync_status() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();
        store.add(message("m2")).await.unwrap();
        store
            .update::<PendingMessage, _>("m2", |m| m.sync_status = SyncStatus::Failed)
            .await
            .unwrap();

        let pending: Vec<PendingMessage> = store
            .get_all_by_index(Index::SyncStatus(SyncStatus::Pending))
            .await
            .unwrap();
        let failed: Vec<PendingMessage> = store
            .get_all_by_index(Index::SyncStatus(SyncStatus::Failed))
            .await
            .unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "m1");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "m2");
    }

    #[tokio::test]
    async fn test_claim_skips_records_already_syncing() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();

        let first = store.claim::<PendingMessage>("m1").await.unwrap();
        assert_eq!(first.unwrap().sync_status, SyncStatus::Syncing);

        let second = store.claim::<PendingMessage>("m1").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_records_at_or_before_cutoff() {
        let store = open_store().await;
        let mut old = message("old");
        old.timestamp = 1_000;
        let mut edge = message("edge");
        edge.timestamp = 2_000;
        let mut fresh = message("fresh");
        fresh.timestamp = 3_000;
        store.add(old).await.unwrap();
        store.add(edge).await.unwrap();
        store.add(fresh).await.unwrap();

        let mut report = RoadConditionReport::new(
            "Maharlika Highway".to_string(),
            vec![LatLng::new(17.61, 121.72)],
            RoadStatus::Flooded,
            4,
        );
        report.timestamp = 500;
        store.add(report).await.unwrap();

        let removed = store
            .purge_older_than(&Collection::PENDING, 2_000)
            .await
            .unwrap();

        assert_eq!(removed, 3);
        let left = store.get_all::<PendingMessage>().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "fresh");
        assert_eq!(store.count::<RoadConditionReport>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timestamp_index_includes_the_cutoff() {
        let store = open_store().await;
        for (id, ts) in [("a", 1_000), ("b", 2_000), ("c", 3_000)] {
            let mut m = message(id);
            m.timestamp = ts;
            store.add(m).await.unwrap();
        }

        let mut ids: Vec<String> = store
            .get_all_by_index::<PendingMessage>(Index::TimestampUpTo(2_000))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_negative_cutoff_purges_nothing() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();
        store
            .add(PendingLocation::new(17.6, 121.7, true).with_id("sos"))
            .await
            .unwrap();

        let removed = store
            .purge_older_than(&Collection::PENDING, -1)
            .await
            .unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.count::<PendingMessage>().await.unwrap(), 1);
        assert_eq!(store.count::<PendingLocation>().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_old_data_handles_extreme_ages() {
        let store = open_store().await;
        store.add(message("m1")).await.unwrap();

        assert_eq!(store.clear_old_data(i64::MAX / 1000).await.unwrap(), 0);
        assert_eq!(store.clear_old_data(30_000).await.unwrap(), 0);
        assert!(matches!(
            store.clear_old_data(-1).await,
            Err(StoreError::InvalidAge(-1))
        ));
        assert_eq!(store.count::<PendingMessage>().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tile_timestamp_index() {
        let store = open_store().await;
        for (url, ts) in [("https://tiles.example/1.png", 10), ("https://tiles.example/2.png", 20)] {
            store
                .add(MapTile {
                    url: url.to_string(),
                    data: vec![1, 2, 3],
                    timestamp: ts,
                })
                .await
                .unwrap();
        }

        let stale: Vec<MapTile> = store
            .get_all_by_index(Index::TimestampUpTo(10))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].url, "https://tiles.example/1.png");
    }

    #[tokio::test]
    async fn test_emergency_index_on_locations() {
        let store = open_store().await;
        store
            .add(PendingLocation::new(17.6, 121.7, true).with_id("sos"))
            .await
            .unwrap();
        store
            .add(PendingLocation::new(17.6, 121.7, false).with_id("ping"))
            .await
            .unwrap();

        let emergencies: Vec<PendingLocation> = store
            .get_all_by_index(Index::IsEmergency(true))
            .await
            .unwrap();
        assert_eq!(emergencies.len(), 1);
        assert_eq!(emergencies[0].id, "sos");

        let ordinary: Vec<PendingLocation> = store
            .get_all_by_index(Index::IsEmergency(false))
            .await
            .unwrap();
        assert_eq!(ordinary.len(), 1);
        assert_eq!(ordinary[0].id, "ping");
    }

    #[tokio::test]
    async fn test_unknown_index_is_an_error() {
        let store = open_store().await;
        let result = store
            .get_all_by_index::<CachedRoute>(Index::SyncStatus(SyncStatus::Pending))
            .await;
        assert!(matches!(result, Err(StoreError::UnknownIndex { .. })));
    }
}
