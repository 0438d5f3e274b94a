pub mod v1;

// ===== VERSIONED MODELS FOLLOWING NATIVE_DB PATTERN =====
// Every collection is a native_model with an explicit (id, version). A schema
// change adds a v2 module with a `From<v1::X>` migration and re-points the alias.

pub mod data {
    // Type aliases pointing to the latest versions
    pub type PendingMessage = super::v1::PendingMessage;
    pub type CachedRoute = super::v1::CachedRoute;
    pub type PendingLocation = super::v1::PendingLocation;
    pub type RoadConditionReport = super::v1::RoadConditionReport;
    pub type DownloadedPackage = super::v1::DownloadedPackage;
    pub type MapTile = super::v1::MapTile;
    pub type CachedResponse = super::v1::CachedResponse;

    pub type MessageRow = super::v1::MessageRow;
    pub type EvacueeLocationRow = super::v1::EvacueeLocationRow;
    pub type RoadConditionRow = super::v1::RoadConditionRow;

    // Re-export versioned modules for direct access
    pub use super::v1;
}

pub use data::*;

// Shared traits, enums and helpers
pub use v1::{
    format_line_string, format_point, now_millis, LatLng, MessageType, RoadStatus, SyncStatus,
    Syncable,
};

