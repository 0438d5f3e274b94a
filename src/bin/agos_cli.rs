use agos_rs::cache::worker::{CacheWorker, ControlMessage};
use agos_rs::cache::{CacheStorage, HttpFetcher, Request};
use agos_rs::config::AgosConfig;
use agos_rs::connectivity::Connectivity;
use agos_rs::db_client::{AgosDbClient, RemoteStore};
use agos_rs::error::RemoteError;
use agos_rs::models::{
    LatLng, MessageType, PendingLocation, PendingMessage, RoadConditionReport, RoadStatus,
};
use agos_rs::store::OfflineStore;
use agos_rs::sync::SyncManager;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, rename_all = "snake_case")]
struct Args {
    /// Command to execute: status, sync, auto_sync, queue_message, share_location, report_road, purge, fetch, control
    #[arg(short, long)]
    command: String,

    /// Log level
    #[arg(long, name = "log_level", default_value = "info")]
    log_level: String,

    /// Message body (for queue_message)
    #[arg(long)]
    content: Option<String>,

    /// broadcast, direct or alert (for queue_message)
    #[arg(long, name = "message_type", default_value = "broadcast")]
    message_type: String,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long, name = "recipient_id")]
    recipient_id: Option<String>,

    #[arg(long, default_value = "1")]
    priority: i32,

    /// Latitude (for share_location)
    #[arg(long)]
    latitude: Option<f64>,

    /// Longitude (for share_location)
    #[arg(long)]
    longitude: Option<f64>,

    /// Mark the location as an emergency
    #[arg(long, default_value = "false")]
    emergency: bool,

    #[arg(long, name = "status_message")]
    status_message: Option<String>,

    /// Road name (for report_road)
    #[arg(long, name = "road_name")]
    road_name: Option<String>,

    /// Road geometry as JSON, e.g. '[{"lat":17.61,"lng":121.72}]'
    #[arg(long, name = "coordinates_json")]
    coordinates_json: Option<String>,

    /// passable, flooded, blocked or unknown (for report_road)
    #[arg(long, name = "road_status", default_value = "unknown")]
    road_status: String,

    #[arg(long, default_value = "1")]
    severity: i32,

    #[arg(long)]
    description: Option<String>,

    /// Age threshold in days (for purge)
    #[arg(long, default_value = "7")]
    days: i64,

    /// URL or origin-relative path (for fetch)
    #[arg(long)]
    url: Option<String>,

    /// Treat the fetch as a page navigation
    #[arg(long, default_value = "false")]
    navigate: bool,

    /// Control message as JSON (for control)
    #[arg(long, name = "message_json")]
    message_json: Option<String>,
}

// example usage:
// AGOS_DATABASE_REST_URL=https://x.supabase.co AGOS_PUBLIC_API_KEY=anon ./target/release/agos_cli --command status
// ./target/release/agos_cli --command queue_message --content 'Need water at Barangay 5' --message_type alert --priority 3
// ./target/release/agos_cli --command share_location --latitude 17.6132 --longitude 121.7270 --emergency
// ./target/release/agos_cli --command report_road --road_name 'Maharlika Highway' --coordinates_json '[{"lat":17.61,"lng":121.72},{"lat":17.62,"lng":121.73}]' --road_status flooded --severity 4
// ./target/release/agos_cli --command sync
// ./target/release/agos_cli --command purge --days 7
// ./target/release/agos_cli --command fetch --url /index.html --navigate
// ./target/release/agos_cli --command control --message_json '{"type":"CACHE_ROUTES","routes":[{"url":"/route-packages/tuguegarao.json"}]}'

/// Stands in for the backend when no credentials are configured; every
/// record simply stays queued.
struct Unconfigured;

#[async_trait]
impl RemoteStore for Unconfigured {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError> {
        Ok(None)
    }

    async fn insert(&self, _table: &str, _row: serde_json::Value) -> Result<(), RemoteError> {
        Err(RemoteError::Offline)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!("agos_rs={},agos_cli={}", args.log_level, args.log_level))
        .init();

    let config = AgosConfig::from_env()?;

    match args.command.as_str() {
        "fetch" | "control" => run_cache_command(&args, &config).await,
        _ => run_sync_command(&args, &config).await,
    }
}

async fn build_manager(config: &AgosConfig) -> Result<Arc<SyncManager>> {
    let store = Arc::new(OfflineStore::new(config.local_db_path()));
    store.initialize().await?;

    let remote: Arc<dyn RemoteStore> = match &config.remote {
        Some(remote) => Arc::new(AgosDbClient::new(remote.clone())),
        None => {
            warn!("AGOS_DATABASE_REST_URL not set; records will stay queued");
            Arc::new(Unconfigured)
        }
    };

    let connectivity = Connectivity::new(config.remote.is_some());
    Ok(SyncManager::with_tokio_background(store, remote, connectivity))
}

async fn run_sync_command(args: &Args, config: &AgosConfig) -> Result<()> {
    let manager = build_manager(config).await?;

    match args.command.as_str() {
        "status" => {
            let status = manager.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "sync" => match manager.sync_all().await {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => info!("A sync pass is already running"),
        },
        "auto_sync" => {
            if let Some(remote) = &config.remote {
                let _probe = manager.connectivity().spawn_probe(
                    reqwest::Client::new(),
                    remote.rest_url.clone(),
                    config.sync_interval(),
                );
            }
            manager.start_auto_sync(config.sync_interval()).await;
            info!("Auto sync running; press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
            manager.stop_auto_sync();
        }
        "queue_message" => {
            let content = args
                .content
                .clone()
                .ok_or_else(|| anyhow!("--content is required for queue_message"))?;
            let message_type: MessageType = args.message_type.parse().map_err(|e| anyhow!("{}", e))?;

            let mut message = PendingMessage::new(content, message_type, args.priority);
            if let Some(subject) = &args.subject {
                message = message.with_subject(subject.as_str());
            }
            if let Some(recipient) = &args.recipient_id {
                message = message.with_recipient(recipient.as_str());
            }
            let id = message.id.clone();
            let delivery = manager.send_message(message).await?;
            println!("Message {}: {:?}", id, delivery);
        }
        "share_location" => {
            let (Some(latitude), Some(longitude)) = (args.latitude, args.longitude) else {
                return Err(anyhow!("--latitude and --longitude are required for share_location"));
            };
            let mut location = PendingLocation::new(latitude, longitude, args.emergency);
            location.status_message = args.status_message.clone();
            let id = location.id.clone();
            manager.share_location(location).await?;
            println!("Location {} queued", id);
        }
        "report_road" => {
            let road_name = args
                .road_name
                .clone()
                .ok_or_else(|| anyhow!("--road_name is required for report_road"))?;
            let coordinates: Vec<LatLng> = match &args.coordinates_json {
                Some(json) => serde_json::from_str(json)?,
                None => return Err(anyhow!("--coordinates_json is required for report_road")),
            };

            let mut report = RoadConditionReport::new(
                road_name,
                coordinates,
                RoadStatus::from(args.road_status.as_str()),
                args.severity,
            );
            report.description = args.description.clone();
            let id = report.id.clone();
            manager.report_road_condition(report).await?;
            println!("Road report {} queued", id);
        }
        "purge" => {
            let removed = manager.store().clear_old_data(args.days).await?;
            println!("Removed {} record(s) older than {} day(s)", removed, args.days);
        }
        other => {
            error!("Unknown command: {}", other);
            return Err(anyhow!("Unknown command: {}", other));
        }
    }

    // Let queued background requests run before exiting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

async fn run_cache_command(args: &Args, config: &AgosConfig) -> Result<()> {
    let origin = Url::parse(&config.origin)?;
    let storage = CacheStorage::open(config.cache_db_path())?;
    let worker = CacheWorker::new(
        origin.clone(),
        config.cache_version.clone(),
        storage,
        Arc::new(HttpFetcher::default()),
    );

    if let Err(e) = worker.install().await {
        warn!("Failed to cache static assets: {}", e);
    }
    worker.activate()?;

    match args.command.as_str() {
        "fetch" => {
            let raw = args
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("--url is required for fetch"))?;
            let url = origin.join(raw)?;
            let request = if args.navigate {
                Request::navigation(url)
            } else {
                Request::get(url)
            };
            let response = worker.handle_fetch(&request).await?;
            println!(
                "{} -> HTTP {} ({} bytes)",
                response.url,
                response.status,
                response.body.len()
            );
        }
        "control" => {
            let json = args
                .message_json
                .as_deref()
                .ok_or_else(|| anyhow!("--message_json is required for control"))?;
            let message: ControlMessage = serde_json::from_str(json)?;
            worker.handle_message(message).await?;
            println!("Done");
        }
        other => return Err(anyhow!("Unknown command: {}", other)),
    }
    Ok(())
}
