//! In-memory session storage

use super::{StateBackend, StateError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory state backend
///
/// Entries carry an optional expiry. Expired entries are invisible to `get`
/// and are reclaimed by [`MemoryStateBackend::cleanup_expired`], which the
/// server calls periodically.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateBackend {
    store: Arc<RwLock<HashMap<String, StoredValue>>>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        Self { data, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries and return how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, value| !value.is_expired(now));
        before - store.len()
    }

    /// Number of stored keys, expired ones included
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        let store = self.store.read().await;
        Ok(store
            .get(key)
            .filter(|value| !value.is_expired(Instant::now()))
            .map(|value| value.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError> {
        let mut store = self.store.write().await;
        store.insert(key.to_string(), StoredValue::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.store.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StateError> {
        Ok(self.cleanup_expired().await)
    }
}
