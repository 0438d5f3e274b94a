use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_CACHE_VERSION: &str = "v1";
pub const LOCAL_DB_FILE: &str = "agos-db.redb";
pub const CACHE_DB_FILE: &str = "agos-cache.redb";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgosConfig {
    pub data_dir: PathBuf,
    pub sync_interval_ms: u64,
    pub origin: String,
    pub cache_version: String,
    pub remote: Option<RemoteConfig>,
}

/// Credentials for the PostgREST backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub rest_url: String,
    pub public_api_key: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl AgosConfig {
    /// Creates a config from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let data_dir = std::env::var("AGOS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./agos-data"));

        let sync_interval_ms = match std::env::var("AGOS_SYNC_INTERVAL_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| anyhow!("AGOS_SYNC_INTERVAL_MS must be an integer: {}", e))?,
            Err(_) => DEFAULT_SYNC_INTERVAL_MS,
        };

        let origin = std::env::var("AGOS_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let cache_version =
            std::env::var("AGOS_CACHE_VERSION").unwrap_or_else(|_| DEFAULT_CACHE_VERSION.to_string());

        let remote = match RemoteConfig::from_env() {
            Ok(remote) => Some(remote),
            Err(e) => {
                tracing::warn!("Remote sync disabled: {}", e);
                None
            }
        };

        Ok(Self {
            data_dir,
            sync_interval_ms,
            origin,
            cache_version,
            remote,
        })
    }

    pub fn local_db_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_DB_FILE)
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_DB_FILE)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self> {
        let rest_url = std::env::var("AGOS_DATABASE_REST_URL")
            .map_err(|_| anyhow!("AGOS_DATABASE_REST_URL environment variable is required"))?;

        let public_api_key = std::env::var("AGOS_PUBLIC_API_KEY")
            .map_err(|_| anyhow!("AGOS_PUBLIC_API_KEY environment variable is required"))?;

        Ok(Self {
            rest_url: normalize_rest_url(rest_url),
            public_api_key,
            access_token: std::env::var("AGOS_ACCESS_TOKEN").ok(),
            user_id: std::env::var("AGOS_USER_ID").ok(),
        })
    }
}

/// Ensures the URL has the PostgREST path
pub fn normalize_rest_url(mut rest_url: String) -> String {
    if !rest_url.ends_with("/rest/v1") {
        if rest_url.ends_with('/') {
            rest_url.push_str("rest/v1");
        } else {
            rest_url.push_str("/rest/v1");
        }
    }
    rest_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rest_url() {
        assert_eq!(
            normalize_rest_url("https://x.supabase.co".to_string()),
            "https://x.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://x.supabase.co/".to_string()),
            "https://x.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://x.supabase.co/rest/v1".to_string()),
            "https://x.supabase.co/rest/v1"
        );
    }

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = AgosConfig {
            data_dir: PathBuf::from("/tmp/agos"),
            sync_interval_ms: 1000,
            origin: DEFAULT_ORIGIN.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            remote: None,
        };
        assert_eq!(config.local_db_path(), PathBuf::from("/tmp/agos/agos-db.redb"));
        assert_eq!(config.cache_db_path(), PathBuf::from("/tmp/agos/agos-cache.redb"));
        assert_eq!(config.sync_interval(), Duration::from_millis(1000));
    }
}
