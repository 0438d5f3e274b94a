use thiserror::Error;

/// Failures of the durable local store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The local database could not be opened. Offline features are unavailable
    /// and the application should carry on online-only.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Record '{id}' already exists in {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("Local database not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Age must not be negative: {0} days")]
    InvalidAge(i64),

    #[error("Collection {collection} has no index {index}")]
    UnknownIndex { collection: String, index: String },

    #[error("Database error: {0}")]
    Database(#[from] native_db::db_type::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single remote insert. Inside a drain this is always recovered
/// locally by leaving the record in place.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No network connectivity")]
    Offline,

    #[error("Remote rejected insert: HTTP {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// Aborts one sub-drain. The other categories of a pass still run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Could not resolve identity: {0}")]
    Identity(RemoteError),
}

#[derive(Error, Debug)]
pub enum CacheError {
    /// Nothing cached, the network failed and the request was not a navigation.
    #[error("Network request failed and no cached response exists for {url}")]
    NoFallback { url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid control message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Cache worker is not running")]
    WorkerStopped,
}

impl From<native_db::db_type::Error> for CacheError {
    fn from(err: native_db::db_type::Error) -> Self {
        CacheError::Store(StoreError::Database(err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum BackgroundSyncError {
    #[error("Background sync is not supported")]
    Unsupported,

    #[error("Background sync registration rejected: {0}")]
    Rejected(String),
}
