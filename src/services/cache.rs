//! Expiring key/value cache.
//!
//! Every entry carries its own expiry. A read past expiry, a key that was
//! never written and a disabled backend all look the same to the caller: a
//! miss.

use crate::types::CacheKey;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared handle injected into resolvers and adapters.
pub type CacheHandle = Arc<dyn CacheStore>;

/// Backend-agnostic cache contract. Values are JSON text.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live value.
    async fn get(&self, key: &CacheKey) -> Option<String>;

    /// Store a value that expires after `ttl`. Overwrites any existing entry.
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration);

    /// Get every live value among `keys`. Misses are left out of the map.
    async fn get_many(&self, keys: &[CacheKey]) -> HashMap<CacheKey, String> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await {
                found.insert(key.clone(), value);
            }
        }
        found
    }

    /// Store several values, each with its own TTL.
    async fn set_many(&self, entries: Vec<(CacheKey, String, Duration)>) {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl).await;
        }
    }
}

/// Read and decode a JSON value. Undecodable entries count as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &CacheKey) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Discarding undecodable cache entry {}: {}", key, e);
            None
        }
    }
}

/// Encode and store a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheStore,
    key: &CacheKey,
    value: &T,
    ttl: Duration,
) {
    if let Ok(raw) = serde_json::to_string(value) {
        cache.set(key, raw, ttl).await;
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache store. Expired entries are dropped on read and by
/// [`MemoryCache::cleanup`].
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn live(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.value.clone());
        }
        drop(entry);
        // Only drop it if nobody refreshed the key in between.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        None
    }

    fn insert(&self, key: String, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop expired entries.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<String> {
        self.live(key.as_str())
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) {
        self.insert(key.to_string(), value, ttl);
    }
}

/// Cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

#[async_trait]
impl CacheStore for DisabledCache {
    async fn get(&self, _key: &CacheKey) -> Option<String> {
        None
    }

    async fn set(&self, _key: &CacheKey, _value: String, _ttl: Duration) {}

    async fn get_many(&self, _keys: &[CacheKey]) -> HashMap<CacheKey, String> {
        HashMap::new()
    }

    async fn set_many(&self, _entries: Vec<(CacheKey, String, Duration)>) {}
}
