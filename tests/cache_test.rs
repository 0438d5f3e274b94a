mod common;

use agos_rs::cache::worker::{CacheWorker, ControlMessage, RouteRef, WorkerEvent, WorkerHandle, WorkerState};
use agos_rs::cache::{CacheStorage, PartitionKind, Request, Response};
use agos_rs::CacheError;
use common::FakeFetcher;
use reqwest::Method;
use std::sync::Arc;
use url::Url;

const ORIGIN: &str = "http://localhost:5173";

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

fn shell_fetcher() -> Arc<FakeFetcher> {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.serve("http://localhost:5173/", "<html>root</html>");
    fetcher.serve("http://localhost:5173/index.html", "<html>shell</html>");
    fetcher.serve("http://localhost:5173/manifest.json", "{}");
    fetcher
}

fn worker_with(storage: CacheStorage, fetcher: Arc<FakeFetcher>) -> CacheWorker {
    CacheWorker::new(url(ORIGIN), "v1", storage, fetcher)
}

async fn active_worker(fetcher: Arc<FakeFetcher>) -> CacheWorker {
    let worker = worker_with(CacheStorage::in_memory().unwrap(), fetcher);
    worker.install().await.unwrap();
    worker.activate().unwrap();
    worker
}

#[tokio::test]
async fn test_install_caches_shell_without_icons() {
    let fetcher = shell_fetcher();
    let worker = worker_with(CacheStorage::in_memory().unwrap(), fetcher.clone());

    let cached = worker.install().await.unwrap();

    assert_eq!(cached, 3);
    assert_eq!(worker.state(), WorkerState::Waiting);
    let keys = worker
        .storage()
        .keys(&worker.partition(PartitionKind::Static))
        .unwrap();
    assert_eq!(
        keys,
        vec![
            "http://localhost:5173/",
            "http://localhost:5173/index.html",
            "http://localhost:5173/manifest.json"
        ]
    );
    assert!(keys.iter().all(|k| !k.ends_with(".png")));
}

#[tokio::test]
async fn test_install_is_all_or_nothing() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.serve("http://localhost:5173/", "<html>root</html>");
    fetcher.serve("http://localhost:5173/index.html", "<html>shell</html>");
    // manifest.json answers 404

    let worker = worker_with(CacheStorage::in_memory().unwrap(), fetcher);
    assert!(worker.install().await.is_err());
    assert_eq!(
        worker
            .storage()
            .len(&worker.partition(PartitionKind::Static))
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_offline_navigation_gets_shell_from_cache_first_route() {
    let fetcher = shell_fetcher();
    let worker = active_worker(fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::navigation(url("http://localhost:5173/route-packages/tuguegarao"));
    let response = worker.handle_fetch(&request).await.unwrap();

    assert_eq!(response.body, b"<html>shell</html>");
}

#[tokio::test]
async fn test_offline_navigation_gets_shell_from_network_first_route() {
    let fetcher = shell_fetcher();
    let worker = active_worker(fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::navigation(url("http://localhost:5173/evacuation-centers"));
    let response = worker.handle_fetch(&request).await.unwrap();

    assert_eq!(response.body, b"<html>shell</html>");
}

#[tokio::test]
async fn test_offline_non_navigation_without_cache_fails() {
    let fetcher = shell_fetcher();
    let worker = active_worker(fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::get(url("http://localhost:5173/api/alerts"));
    let result = worker.handle_fetch(&request).await;

    assert!(matches!(result, Err(CacheError::NoFallback { .. })));
}

#[tokio::test]
async fn test_network_first_falls_back_to_cached_copy() {
    let fetcher = shell_fetcher();
    let api = "https://abc.supabase.co/rest/v1/evacuation_centers";
    fetcher.serve(api, r#"[{"name":"Gym"}]"#);
    let worker = active_worker(fetcher.clone()).await;

    let request = Request::get(url(api));
    let live = worker.handle_fetch(&request).await.unwrap();
    fetcher.set_offline(true);
    let cached = worker.handle_fetch(&request).await.unwrap();

    assert_eq!(live.body, cached.body);
    assert!(worker
        .storage()
        .match_in(&worker.partition(PartitionKind::Dynamic), api)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_cache_first_skips_network_when_cached() {
    let fetcher = shell_fetcher();
    let tile = "https://tile.openstreetmap.org/tiles/12/3421/1834.png";
    fetcher.serve(tile, "png");
    let worker = active_worker(fetcher.clone()).await;
    let before = fetcher.calls();

    let request = Request::get(url(tile));
    worker.handle_fetch(&request).await.unwrap();
    worker.handle_fetch(&request).await.unwrap();

    assert_eq!(fetcher.calls() - before, 1);
    assert!(worker
        .storage()
        .match_in(&worker.partition(PartitionKind::Tiles), tile)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_error_responses_are_returned_but_not_cached() {
    let fetcher = shell_fetcher();
    let worker = active_worker(fetcher.clone()).await;

    let request = Request::get(url("http://localhost:5173/missing"));
    let response = worker.handle_fetch(&request).await.unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(
        worker
            .storage()
            .len(&worker.partition(PartitionKind::Dynamic))
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_dynamic_partition_is_capped_fifo() {
    let fetcher = shell_fetcher();
    for i in 0..55 {
        fetcher.serve(&format!("http://localhost:5173/page/{}", i), "page");
    }
    let worker = active_worker(fetcher.clone()).await;

    for i in 0..55 {
        let request = Request::get(url(&format!("http://localhost:5173/page/{}", i)));
        worker.handle_fetch(&request).await.unwrap();
    }

    let keys = worker
        .storage()
        .keys(&worker.partition(PartitionKind::Dynamic))
        .unwrap();
    assert_eq!(keys.len(), PartitionKind::Dynamic.cap());
    assert_eq!(keys[0], "http://localhost:5173/page/5");
    assert_eq!(keys[49], "http://localhost:5173/page/54");
}

#[tokio::test]
async fn test_non_get_and_inactive_requests_pass_through() {
    let fetcher = shell_fetcher();
    let tile = "https://tile.openstreetmap.org/tiles/1/1/1.png";
    fetcher.serve(tile, "png");

    let worker = worker_with(CacheStorage::in_memory().unwrap(), fetcher.clone());
    worker.handle_fetch(&Request::get(url(tile))).await.unwrap();
    assert!(worker.storage().partitions().unwrap().is_empty());

    worker.activate().unwrap();
    let post = Request::get(url(tile)).with_method(Method::POST);
    worker.handle_fetch(&post).await.unwrap();
    assert!(worker.storage().partitions().unwrap().is_empty());
}

#[tokio::test]
async fn test_activation_deletes_other_versions_only() {
    let storage = CacheStorage::in_memory().unwrap();
    let page = Response::new("/", 200, "old");
    storage.put("agos-v0-static", "http://localhost:5173/", &page).unwrap();
    storage.put("agos-v0-maps", "https://tiles.example/1.png", &page).unwrap();
    storage.put("agos-v1-routes", "http://localhost:5173/routes/a", &page).unwrap();
    storage.put("third-party", "https://cdn.example/lib.js", &page).unwrap();

    let worker = worker_with(storage, shell_fetcher());
    let mut events = worker.subscribe();
    let mut deleted = worker.activate().unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["agos-v0-maps", "agos-v0-static"]);
    let left = worker.storage().partitions().unwrap();
    assert!(left.contains("agos-v1-routes"));
    assert!(left.contains("third-party"));
    assert_eq!(worker.state(), WorkerState::Active);

    assert!(matches!(events.recv().await.unwrap(), WorkerEvent::Activated { .. }));
    assert_eq!(
        events.recv().await.unwrap(),
        WorkerEvent::Updated {
            version: "v1".to_string()
        }
    );
}

#[tokio::test]
async fn test_cache_routes_stores_ok_responses_only() {
    let fetcher = shell_fetcher();
    fetcher.serve("http://localhost:5173/route-packages/a.json", "{}");
    let worker = active_worker(fetcher.clone()).await;

    let stored = worker
        .cache_routes(&[
            RouteRef {
                url: Some("/route-packages/a.json".to_string()),
            },
            RouteRef {
                url: Some("/route-packages/missing.json".to_string()),
            },
            RouteRef { url: None },
        ])
        .await
        .unwrap();

    assert_eq!(stored, 1);
    assert_eq!(
        worker
            .storage()
            .keys(&worker.partition(PartitionKind::Routes))
            .unwrap(),
        vec!["http://localhost:5173/route-packages/a.json"]
    );
}

#[tokio::test]
async fn test_worker_handle_lifecycle_and_control_messages() {
    let fetcher = shell_fetcher();
    fetcher.serve("http://localhost:5173/routes/b.json", "{}");
    let worker = Arc::new(worker_with(CacheStorage::in_memory().unwrap(), fetcher));
    let handle = WorkerHandle::spawn(worker.clone());
    let mut events = handle.subscribe();

    assert_eq!(events.recv().await.unwrap(), WorkerEvent::Installed { assets: 3 });
    assert!(matches!(events.recv().await.unwrap(), WorkerEvent::Activated { .. }));
    assert!(matches!(events.recv().await.unwrap(), WorkerEvent::Updated { .. }));

    handle
        .post_json(r#"{"type":"CACHE_ROUTES","routes":[{"url":"/routes/b.json"}]}"#)
        .await
        .unwrap();
    assert_eq!(events.recv().await.unwrap(), WorkerEvent::RoutesCached { stored: 1 });

    handle.post_message(ControlMessage::ClearCache).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), WorkerEvent::CacheCleared { removed: 4 });
    assert!(worker.storage().partitions().unwrap().is_empty());

    assert!(handle.post_json(r#"{"type":"REBOOT"}"#).await.is_err());
}
