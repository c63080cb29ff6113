//! Cache storage abstraction.
//!
//! The agent never owns its cache: the host injects a [`CacheStore`], which
//! hands out named [`CacheHandle`]s keyed by version tag. Entries are full
//! response snapshots; the store applies no eviction, TTL, or size bound.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

use super::keys::CacheKey;

/// A stored response: status, headers, and a buffered body.
///
/// Cloning is cheap (the body is reference-counted), which is what lets the
/// refresher persist a duplicate while the original travels back to the
/// caller unconsumed.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let mut stored_headers = Vec::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            stored_headers.push((name.clone(), value.clone()));
        }

        Self {
            status,
            headers: stored_headers,
            body,
        }
    }

    /// Whether the status falls in the success range [200, 300).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache `{name}` is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Host-provided cache storage, handed out per named cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open the named cache, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheHandle>, StoreError>;

    /// Look a key up across every named cache.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>, StoreError>;
}

/// One named cache.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>, StoreError>;

    /// Insert or overwrite a single entry. Last write wins per key.
    async fn put(&self, key: CacheKey, snapshot: ResponseSnapshot) -> Result<(), StoreError>;

    /// Bulk-insert entries. Either every entry lands or none does.
    async fn put_all(&self, entries: Vec<(CacheKey, ResponseSnapshot)>) -> Result<(), StoreError>;
}

type CacheMap = HashMap<String, HashMap<CacheKey, ResponseSnapshot>>;

/// In-memory [`CacheStore`] backing the gateway process.
///
/// Unbounded by design; the resource list is small and fixed, so the entry
/// population is bounded by configuration rather than by the store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    caches: Arc<RwLock<CacheMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all named caches.
    pub async fn len(&self) -> usize {
        let caches = self.caches.read().await;
        caches.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheHandle>, StoreError> {
        let mut caches = self.caches.write().await;
        caches.entry(name.to_string()).or_default();

        Ok(Arc::new(MemoryHandle {
            name: name.to_string(),
            caches: self.caches.clone(),
        }))
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>, StoreError> {
        let caches = self.caches.read().await;
        Ok(caches.values().find_map(|entries| entries.get(key).cloned()))
    }
}

struct MemoryHandle {
    name: String,
    caches: Arc<RwLock<CacheMap>>,
}

#[async_trait]
impl CacheHandle for MemoryHandle {
    async fn get(&self, key: &CacheKey) -> Result<Option<ResponseSnapshot>, StoreError> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(&self.name)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn put(&self, key: CacheKey, snapshot: ResponseSnapshot) -> Result<(), StoreError> {
        let mut caches = self.caches.write().await;
        caches.entry(self.name.clone()).or_default().insert(key, snapshot);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(CacheKey, ResponseSnapshot)>) -> Result<(), StoreError> {
        let mut caches = self.caches.write().await;
        let cache = caches.entry(self.name.clone()).or_default();
        for (key, snapshot) in entries {
            cache.insert(key, snapshot);
        }
        Ok(())
    }
}
