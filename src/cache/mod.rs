//! Network cache layer: request routing, versioned partitions and the worker
//! that serves requests cache-first or network-first.

pub mod fetch;
pub mod partition;
pub mod worker;

pub use fetch::{Fetcher, HttpFetcher, Request, Response};
pub use partition::{CacheStorage, PartitionId, PartitionKind};

use reqwest::Method;

/// Application shell assets, pre-cached on install.
pub const STATIC_ASSETS: [&str; 5] = [
    "/",
    "/index.html",
    "/manifest.json",
    "/icon-192.png",
    "/icon-512.png",
];

/// Binary icons are served normally but never pre-cached.
pub const ICON_ASSETS: [&str; 2] = ["/icon-192.png", "/icon-512.png"];

pub const SHELL_PATH: &str = "/index.html";

const API_PATHS: [&str; 3] = ["/functions/v1/", "/rest/v1/", "/realtime/v1/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the request goes straight to the network.
    PassThrough,
    Cached(Strategy, PartitionKind),
}

/// Classifies a request. Rules are checked in order; the first match wins.
pub fn route(request: &Request) -> Route {
    if request.method != Method::GET {
        return Route::PassThrough;
    }

    let path = request.url.path();
    let host = request.url.host_str().unwrap_or_default();

    if API_PATHS.iter().any(|p| path.contains(p)) || host.contains("supabase") {
        return Route::Cached(Strategy::NetworkFirst, PartitionKind::Dynamic);
    }

    if path.contains("/tiles/") || host.contains("tiles") || host.contains("mapbox") {
        return Route::Cached(Strategy::CacheFirst, PartitionKind::Tiles);
    }

    if path.contains("/routes/") || path.contains("/route-packages/") {
        return Route::Cached(Strategy::CacheFirst, PartitionKind::Routes);
    }

    if STATIC_ASSETS.contains(&path) || path.starts_with("/assets/") {
        return Route::Cached(Strategy::CacheFirst, PartitionKind::Static);
    }

    Route::Cached(Strategy::NetworkFirst, PartitionKind::Dynamic)
}
