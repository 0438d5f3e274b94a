pub mod background;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db_client;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use background::{BackgroundRegistrar, SyncTag, TokioBackgroundSync};
pub use cache::worker::{CacheWorker, ControlMessage, WorkerEvent, WorkerHandle};
pub use config::{AgosConfig, RemoteConfig};
pub use connectivity::Connectivity;
pub use db_client::{AgosDbClient, RemoteStore};
pub use error::{BackgroundSyncError, CacheError, RemoteError, StoreError, SyncError};
pub use store::{Collection, Index, OfflineStore, Record};
pub use sync::{Delivery, DrainReport, SyncManager, SyncReport, SyncState, SyncStatusReport};
