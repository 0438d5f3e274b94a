use chrono::Utc;
use native_db::db_type::Key;
use native_db::{native_db, ToKey};
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== TRAITS =====

/// Records that walk the `pending -> syncing -> {removed | failed}` lifecycle.
pub trait Syncable {
    fn sync_status(&self) -> SyncStatus;
    fn set_sync_status(&mut self, status: SyncStatus);

    fn is_drainable(&self) -> bool {
        matches!(self.sync_status(), SyncStatus::Pending | SyncStatus::Failed)
    }
}

// ===== ENUMS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Indexed by its wire name so the secondary key stays readable in the file.
impl ToKey for SyncStatus {
    fn to_key(&self) -> Key {
        self.as_str().to_string().to_key()
    }

    fn key_names() -> Vec<String> {
        vec!["SyncStatus".to_string()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Broadcast,
    Direct,
    Alert,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Direct => "direct",
            MessageType::Alert => "alert",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(MessageType::Broadcast),
            "direct" => Ok(MessageType::Direct),
            "alert" => Ok(MessageType::Alert),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadStatus {
    Passable,
    Flooded,
    Blocked,
    Unknown,
}

impl RoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadStatus::Passable => "passable",
            RoadStatus::Flooded => "flooded",
            RoadStatus::Blocked => "blocked",
            RoadStatus::Unknown => "unknown",
        }
    }
}

impl From<&str> for RoadStatus {
    fn from(s: &str) -> Self {
        match s {
            "passable" => RoadStatus::Passable,
            "flooded" => RoadStatus::Flooded,
            "blocked" => RoadStatus::Blocked,
            _ => RoadStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Well-known-text point, longitude first.
pub fn format_point(latitude: f64, longitude: f64) -> String {
    format!("POINT({} {})", longitude, latitude)
}

pub fn format_line_string(points: &[LatLng]) -> String {
    let coords: Vec<String> = points
        .iter()
        .map(|p| format!("{} {}", p.lng, p.lat))
        .collect();
    format!("LINESTRING({})", coords.join(","))
}

// ===== LOCAL COLLECTIONS =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct PendingMessage {
    #[primary_key]
    pub id: String,
    pub recipient_id: Option<String>,
    pub message_type: MessageType,
    pub subject: Option<String>,
    pub content: String,
    pub priority: i32,
    #[secondary_key]
    pub timestamp: i64,
    #[secondary_key]
    pub sync_status: SyncStatus,
}

impl PendingMessage {
    pub fn new(content: String, message_type: MessageType, priority: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: None,
            message_type,
            subject: None,
            content,
            priority,
            timestamp: now_millis(),
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }
}

impl Syncable for PendingMessage {
    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct CachedRoute {
    #[primary_key]
    pub id: String,
    /// JSON text; opaque to this crate.
    pub route_data: String,
    /// JSON text; opaque to this crate.
    pub geometry: String,
    #[secondary_key]
    pub timestamp: i64,
    pub version: u32,
}

impl CachedRoute {
    pub fn new(
        id: impl Into<String>,
        route_data: &serde_json::Value,
        geometry: &serde_json::Value,
        version: u32,
    ) -> Self {
        Self {
            id: id.into(),
            route_data: route_data.to_string(),
            geometry: geometry.to_string(),
            timestamp: now_millis(),
            version,
        }
    }

    pub fn route_data_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.route_data)
    }

    pub fn geometry_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.geometry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db(secondary_key(emergency_key -> u8))]
pub struct PendingLocation {
    #[primary_key]
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub battery_level: Option<f64>,
    pub is_emergency: bool,
    pub status_message: Option<String>,
    #[secondary_key]
    pub timestamp: i64,
}

impl PendingLocation {
    pub fn new(latitude: f64, longitude: f64, is_emergency: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            latitude,
            longitude,
            accuracy: None,
            battery_level: None,
            is_emergency,
            status_message: None,
            timestamp: now_millis(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// `isEmergency` index value; `bool` has no key encoding of its own.
    pub fn emergency_key(&self) -> u8 {
        u8::from(self.is_emergency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct RoadConditionReport {
    #[primary_key]
    pub id: String,
    pub road_name: String,
    pub location: Vec<LatLng>,
    pub status: RoadStatus,
    pub severity: i32,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    #[secondary_key]
    pub timestamp: i64,
    #[secondary_key]
    pub sync_status: SyncStatus,
}

impl RoadConditionReport {
    pub fn new(road_name: String, location: Vec<LatLng>, status: RoadStatus, severity: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            road_name,
            location,
            status,
            severity,
            description: None,
            photo_url: None,
            timestamp: now_millis(),
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Syncable for RoadConditionReport {
    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct DownloadedPackage {
    #[primary_key]
    pub id: String,
    pub name: String,
    pub version: String,
    pub route_ids: Vec<String>,
    #[secondary_key]
    pub downloaded_at: i64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 6, version = 1)]
#[native_db]
pub struct MapTile {
    #[primary_key]
    pub url: String,
    pub data: Vec<u8>,
    #[secondary_key]
    pub timestamp: i64,
}

// ===== NETWORK CACHE =====

/// One request -> response entry of a cache partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 7, version = 1)]
#[native_db]
pub struct CachedResponse {
    /// `<partition>|<url>`
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub partition: String,
    pub url: String,
    /// Monotonic insertion sequence; lowest is evicted first.
    pub seq: u64,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: i64,
}

impl CachedResponse {
    pub fn entry_key(partition: &str, url: &str) -> String {
        format!("{}|{}", partition, url)
    }
}

// ===== REMOTE ROWS =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
    pub priority: i32,
    pub sync_status: String,
}

impl MessageRow {
    pub fn from_pending(message: &PendingMessage, sender_id: Option<String>) -> Self {
        Self {
            sender_id,
            recipient_id: message.recipient_id.clone(),
            message_type: message.message_type,
            subject: message.subject.clone(),
            content: message.content.clone(),
            priority: message.priority,
            sync_status: "synced".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvacueeLocationRow {
    pub user_id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    pub is_emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl EvacueeLocationRow {
    pub fn from_pending(location: &PendingLocation, user_id: String) -> Self {
        Self {
            user_id,
            location: format_point(location.latitude, location.longitude),
            accuracy_meters: location.accuracy,
            battery_level: location.battery_level,
            is_emergency: location.is_emergency,
            status_message: location.status_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadConditionRow {
    pub road_name: String,
    pub location: String,
    pub status: RoadStatus,
    pub severity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub reported_by: String,
    pub is_verified: bool,
}

impl RoadConditionRow {
    pub fn from_report(report: &RoadConditionReport, reported_by: String) -> Self {
        Self {
            road_name: report.road_name.clone(),
            location: format_line_string(&report.location),
            status: report.status,
            severity: report.severity,
            description: report.description.clone(),
            photo_url: report.photo_url.clone(),
            reported_by,
            // Verification happens on the remote side.
            is_verified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_is_longitude_first() {
        assert_eq!(format_point(17.61, 121.72), "POINT(121.72 17.61)");
    }

    #[test]
    fn test_line_string_keeps_point_order() {
        let points = vec![LatLng::new(17.61, 121.72), LatLng::new(17.62, 121.73)];
        assert_eq!(
            format_line_string(&points),
            "LINESTRING(121.72 17.61,121.73 17.62)"
        );
    }

    #[test]
    fn test_message_row_serialization() {
        let message = PendingMessage::new("help".to_string(), MessageType::Alert, 3)
            .with_subject("Flood");
        let row = MessageRow::from_pending(&message, Some("user-1".to_string()));
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["message_type"], "alert");
        assert_eq!(json["sync_status"], "synced");
        assert_eq!(json["sender_id"], "user-1");
        assert!(json["recipient_id"].is_null());
        assert_eq!(json["subject"], "Flood");
    }

    #[test]
    fn test_location_row_omits_missing_optionals() {
        let location = PendingLocation::new(17.61, 121.72, true);
        let json =
            serde_json::to_value(EvacueeLocationRow::from_pending(&location, "u".to_string()))
                .unwrap();

        assert_eq!(json["location"], "POINT(121.72 17.61)");
        assert_eq!(json["is_emergency"], true);
        assert!(json.get("accuracy_meters").is_none());
    }

    #[test]
    fn test_drainable_statuses() {
        let mut message = PendingMessage::new("x".to_string(), MessageType::Direct, 1);
        assert!(message.is_drainable());
        message.set_sync_status(SyncStatus::Syncing);
        assert!(!message.is_drainable());
        message.set_sync_status(SyncStatus::Failed);
        assert!(message.is_drainable());
    }

    #[test]
    fn test_road_status_from_str_defaults_to_unknown() {
        assert_eq!(RoadStatus::from("flooded"), RoadStatus::Flooded);
        assert_eq!(RoadStatus::from("lava"), RoadStatus::Unknown);
    }
}
