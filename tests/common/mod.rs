#![allow(dead_code)]

use agos_rs::cache::{Fetcher, Request, Response};
use agos_rs::db_client::RemoteStore;
use agos_rs::error::{CacheError, RemoteError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory backend that records inserted rows.
#[derive(Default)]
pub struct FakeRemote {
    user_id: Mutex<Option<String>>,
    rows: Mutex<Vec<(String, serde_json::Value)>>,
    /// Inserts whose `content` field is listed here are rejected.
    reject_content: Mutex<HashSet<String>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    attempts: AtomicUsize,
    /// Identity lookups that fail before the next one succeeds.
    failing_lookups: AtomicUsize,
    lookups: AtomicUsize,
}

impl FakeRemote {
    pub fn signed_in(user_id: &str) -> Self {
        let remote = Self::default();
        remote.set_user(Some(user_id));
        remote
    }

    pub fn set_user(&self, user_id: Option<&str>) {
        *self.user_id.lock().unwrap() = user_id.map(str::to_string);
    }

    pub fn reject_content(&self, content: &str) {
        self.reject_content
            .lock()
            .unwrap()
            .insert(content.to_string());
    }

    pub fn accept_all(&self) {
        self.reject_content.lock().unwrap().clear();
        self.offline.store(false, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_identity_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }

    pub fn identity_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RemoteError::Rejected {
                status: 503,
                message: "auth service unavailable".to_string(),
            });
        }
        Ok(self.user_id.lock().unwrap().clone())
    }

    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        let rejected = row
            .get("content")
            .and_then(|c| c.as_str())
            .map(|c| self.reject_content.lock().unwrap().contains(c))
            .unwrap_or(false);
        if rejected {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "rejected by test".to_string(),
            });
        }
        self.rows.lock().unwrap().push((table.to_string(), row));
        Ok(())
    }
}

/// Scripted network: known URLs answer 200, unknown ones 404, and the whole
/// network can be switched off.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::new(url, 200, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Network("network unreachable".to_string()));
        }
        let url = request.url.as_str();
        let response = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::new(url, 404, "not found"));
        Ok(response)
    }
}
