use crate::services::cache::CacheStore;
use crate::types::CacheKey;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis-backed cache store, shareable across processes.
///
/// If the initial connection fails every operation is a miss or a no-op,
/// so callers keep working without a cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: Option<ConnectionManager>,
}

impl RedisCache {
    /// Connect to Redis at the given URL.
    pub async fn connect(redis_url: &str) -> Arc<Self> {
        let conn = match Self::open(redis_url).await {
            Ok(c) => {
                info!("Connected to Redis at {}", redis_url);
                Some(c)
            }
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Running without a shared cache.",
                    e
                );
                None
            }
        };

        Arc::new(Self { conn })
    }

    async fn open(redis_url: &str) -> RedisResult<ConnectionManager> {
        let client = redis::Client::open(redis_url)?;
        ConnectionManager::new(client).await
    }

    /// Check if Redis is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

/// Redis rejects `EX 0`.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &CacheKey) -> Option<String> {
        let mut conn = self.conn.clone()?;

        let value: RedisResult<Option<String>> = conn.get(key.as_str()).await;
        match value {
            Ok(value) => value,
            Err(e) => {
                debug!("Redis GET {} failed: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };

        if let Err(e) = redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("Redis SET {} failed: {}", key, e);
        }
    }

    async fn get_many(&self, keys: &[CacheKey]) -> HashMap<CacheKey, String> {
        let Some(mut conn) = self.conn.clone() else {
            return HashMap::new();
        };
        if keys.is_empty() {
            return HashMap::new();
        }

        let raw_keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        let values: RedisResult<Vec<Option<String>>> = redis::cmd("MGET")
            .arg(&raw_keys)
            .query_async(&mut conn)
            .await;

        match values {
            Ok(values) => keys
                .iter()
                .zip(values)
                .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
                .collect(),
            Err(e) => {
                debug!("Redis MGET of {} keys failed: {}", keys.len(), e);
                HashMap::new()
            }
        }
    }

    async fn set_many(&self, entries: Vec<(CacheKey, String, Duration)>) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if entries.is_empty() {
            return;
        }

        let mut pipe = redis::pipe();
        for (key, value, ttl) in &entries {
            pipe.cmd("SET")
                .arg(key.as_str())
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(*ttl))
                .ignore();
        }

        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!("Redis pipelined SET of {} keys failed: {}", entries.len(), e);
        }
    }
}
