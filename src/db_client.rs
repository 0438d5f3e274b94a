use crate::config::RemoteConfig;
use crate::error::RemoteError;
use async_trait::async_trait;
use postgrest::Postgrest;
use serde::Deserialize;
use tokio::sync::Mutex;

/// The remote service the sync manager drains into.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Identity of the signed-in user. `Ok(None)` means nobody is signed in;
    /// an error means the lookup itself failed.
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError>;

    /// Inserts one row into `table`.
    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), RemoteError>;
}

pub const MESSAGES_TABLE: &str = "messages";
pub const LOCATIONS_TABLE: &str = "evacuee_locations";
pub const ROAD_CONDITIONS_TABLE: &str = "road_conditions";

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// PostgREST-backed remote store (Supabase compatible).
pub struct AgosDbClient {
    config: RemoteConfig,
    client: Postgrest,
    http: reqwest::Client,
    user_id: Mutex<Option<String>>,
}

impl std::fmt::Debug for AgosDbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgosDbClient")
            .field("rest_url", &self.config.rest_url)
            .field("has_access_token", &self.config.access_token.is_some())
            .finish()
    }
}

impl AgosDbClient {
    pub fn new(config: RemoteConfig) -> Self {
        let mut client = Postgrest::new(&config.rest_url)
            .insert_header("apikey", &config.public_api_key);
        if let Some(token) = &config.access_token {
            client = client.insert_header("Authorization", format!("Bearer {}", token));
        }

        let user_id = Mutex::new(config.user_id.clone());

        Self {
            config,
            client,
            http: reqwest::Client::new(),
            user_id,
        }
    }

    /// Base URL of the project, i.e. the REST URL without `/rest/v1`.
    fn project_url(&self) -> &str {
        self.config
            .rest_url
            .strip_suffix("/rest/v1")
            .unwrap_or(&self.config.rest_url)
    }

    /// Looks the user up from the access token via the auth endpoint
    async fn fetch_user_id(&self, token: &str) -> Result<String, RemoteError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.project_url()))
            .header("apikey", &self.config.public_api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let user: AuthUser = response.json().await?;
        Ok(user.id)
    }
}

#[async_trait]
impl RemoteStore for AgosDbClient {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError> {
        let mut cached = self.user_id.lock().await;
        if cached.is_some() {
            return Ok(cached.clone());
        }
        let Some(token) = self.config.access_token.as_deref() else {
            return Ok(None);
        };
        let id = self.fetch_user_id(token).await?;
        *cached = Some(id);
        Ok(cached.clone())
    }

    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), RemoteError> {
        let json_data = serde_json::to_string(&row)?;

        let response = self
            .client
            .from(table)
            .insert(json_data)
            .execute()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| RemoteError::Transport(e.to_string()))?;
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(())
    }
}

/// Pulls `message` or `error` out of a PostgREST error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                message.to_string()
            } else if let Some(error) = value.get("error").and_then(|m| m.as_str()) {
                error.to_string()
            } else {
                body.to_string()
            }
        }
        Err(_) => body.to_string(),
    }
}
