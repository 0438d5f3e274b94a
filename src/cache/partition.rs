//! Versioned cache partitions persisted in their own `native_db` database.

use super::fetch::Response;
use crate::error::{CacheError, StoreError};
use crate::models::v1::CachedResponseKey;
use crate::models::{now_millis, CachedResponse};
use native_db::{Builder, Database, Models};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Every physical partition name starts with this.
pub const PARTITION_PREFIX: &str = "agos-";

pub const DEFAULT_CAP: usize = 50;
pub const TILES_CAP: usize = 100;

static CACHE_MODELS: OnceCell<Models> = OnceCell::new();

fn cache_models() -> Result<&'static Models, StoreError> {
    CACHE_MODELS.get_or_try_init(|| {
        let mut models = Models::new();
        models.define::<CachedResponse>()?;
        Ok::<_, StoreError>(models)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Static,
    Dynamic,
    Tiles,
    Routes,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 4] = [
        PartitionKind::Static,
        PartitionKind::Dynamic,
        PartitionKind::Tiles,
        PartitionKind::Routes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Static => "static",
            PartitionKind::Dynamic => "dynamic",
            PartitionKind::Tiles => "maps",
            PartitionKind::Routes => "routes",
        }
    }

    pub fn cap(&self) -> usize {
        match self {
            PartitionKind::Tiles => TILES_CAP,
            _ => DEFAULT_CAP,
        }
    }
}

/// A logical partition at a given version, e.g. `agos-v1-maps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionId {
    pub kind: PartitionKind,
    pub version: String,
}

impl PartitionId {
    pub fn new(kind: PartitionKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}{}-{}", PARTITION_PREFIX, self.version, self.kind.as_str())
    }

    /// The four physical names that survive activation at `version`.
    pub fn whitelist(version: &str) -> Vec<String> {
        PartitionKind::ALL
            .iter()
            .map(|kind| PartitionId::new(*kind, version).name())
            .collect()
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Request -> response store, partitioned by name and ordered by insertion.
pub struct CacheStorage {
    db: Database<'static>,
    next_seq: AtomicU64,
}

impl fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage")
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl CacheStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::StorageUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }
        let db = Builder::new()
            .create(cache_models()?, path)
            .map_err(|e| StoreError::StorageUnavailable(format!("{}: {}", path.display(), e)))?;
        Self::with_db(db)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        let db = Builder::new()
            .create_in_memory(cache_models()?)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        Self::with_db(db)
    }

    fn with_db(db: Database<'static>) -> Result<Self, CacheError> {
        let storage = Self {
            db,
            next_seq: AtomicU64::new(0),
        };
        let last = storage.all()?.iter().map(|e| e.seq).max();
        storage
            .next_seq
            .store(last.map_or(0, |seq| seq + 1), Ordering::SeqCst);
        Ok(storage)
    }

    fn all(&self) -> Result<Vec<CachedResponse>, CacheError> {
        let r = self.db.r_transaction()?;
        let entries: Vec<CachedResponse> = r
            .scan()
            .primary::<CachedResponse>()?
            .all()?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries of one partition, oldest first.
    fn entries(&self, partition: &str) -> Result<Vec<CachedResponse>, CacheError> {
        let r = self.db.r_transaction()?;
        let mut entries: Vec<CachedResponse> = r
            .scan()
            .secondary(CachedResponseKey::partition)?
            .range(partition.to_string()..=partition.to_string())?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    fn to_response(entry: CachedResponse) -> Response {
        Response {
            url: entry.url,
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
        }
    }

    pub fn match_in(&self, partition: &str, url: &str) -> Result<Option<Response>, CacheError> {
        let r = self.db.r_transaction()?;
        let entry: Option<CachedResponse> = r
            .get()
            .primary(CachedResponse::entry_key(partition, url))?;
        Ok(entry.map(Self::to_response))
    }

    /// Looks `url` up across every partition; the most recently stored copy wins.
    pub fn match_any(&self, url: &str) -> Result<Option<Response>, CacheError> {
        let found = self
            .all()?
            .into_iter()
            .filter(|e| e.url == url)
            .max_by_key(|e| e.seq);
        Ok(found.map(Self::to_response))
    }

    /// Stores `response` under `url`. An existing entry for the same URL is
    /// replaced and becomes the newest.
    pub fn put(&self, partition: &str, url: &str, response: &Response) -> Result<(), CacheError> {
        self.put_all(partition, &[(url.to_string(), response.clone())])
    }

    /// Stores every entry in one transaction: all or nothing.
    pub fn put_all(
        &self,
        partition: &str,
        entries: &[(String, Response)],
    ) -> Result<(), CacheError> {
        let rw = self.db.rw_transaction()?;
        for (url, response) in entries {
            let key = CachedResponse::entry_key(partition, url);
            if let Some(existing) = rw.get().primary::<CachedResponse>(key.clone())? {
                rw.remove(existing)?;
            }
            rw.insert(CachedResponse {
                key,
                partition: partition.to_string(),
                url: url.clone(),
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                status: response.status,
                headers: response.headers.clone(),
                body: response.body.clone(),
                stored_at: now_millis(),
            })?;
        }
        rw.commit()?;
        Ok(())
    }

    /// URLs in insertion order.
    pub fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .entries(partition)?
            .into_iter()
            .map(|e| e.url)
            .collect())
    }

    pub fn len(&self, partition: &str) -> Result<usize, CacheError> {
        Ok(self.entries(partition)?.len())
    }

    pub fn delete(&self, partition: &str, url: &str) -> Result<bool, CacheError> {
        let rw = self.db.rw_transaction()?;
        let Some(entry) = rw
            .get()
            .primary::<CachedResponse>(CachedResponse::entry_key(partition, url))?
        else {
            return Ok(false);
        };
        rw.remove(entry)?;
        rw.commit()?;
        Ok(true)
    }

    /// Evicts the oldest entry while the partition holds more than `cap`.
    /// Returns how many were evicted.
    pub fn trim(&self, partition: &str, cap: usize) -> Result<usize, CacheError> {
        let mut evicted = 0;
        loop {
            let entries = self.entries(partition)?;
            if entries.len() <= cap {
                break;
            }
            if let Some(oldest) = entries.into_iter().next() {
                let rw = self.db.rw_transaction()?;
                rw.remove(oldest)?;
                rw.commit()?;
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Evicted {} entr(ies) from {}", evicted, partition);
        }
        Ok(evicted)
    }

    pub fn partitions(&self) -> Result<BTreeSet<String>, CacheError> {
        Ok(self.all()?.into_iter().map(|e| e.partition).collect())
    }

    pub fn delete_partition(&self, partition: &str) -> Result<usize, CacheError> {
        let entries = self.entries(partition)?;
        let removed = entries.len();
        if removed == 0 {
            return Ok(0);
        }
        let rw = self.db.rw_transaction()?;
        for entry in entries {
            rw.remove(entry)?;
        }
        rw.commit()?;
        Ok(removed)
    }

    /// Removes every entry of every partition.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for partition in self.partitions()? {
            removed += self.delete_partition(&partition)?;
        }
        Ok(removed)
    }
}
