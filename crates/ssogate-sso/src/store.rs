//! Key/value store underneath the SSO hierarchy.
//!
//! Two modes: an in-process `DashMap` for single-instance deployments and
//! tests, and Redis for anything shared. Values are whole serialized records;
//! every write carries its TTL.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use ssogate_auth::{AuthError, AuthResult};
use tokio::time::Instant;

use crate::config::RedisConfig;

/// Keys end in a bearer token; keep the family prefix and a short stub.
fn redact(key: &str) -> String {
    let split = key.rfind(':').map_or(0, |i| i + 1);
    let (prefix, token) = key.split_at(split);
    let stub: String = token.chars().take(6).collect();
    if stub.len() < token.len() {
        format!("{prefix}{stub}...")
    } else {
        key.to_string()
    }
}

fn storage_error(op: &str, key: &str, e: impl std::fmt::Display) -> AuthError {
    AuthError::storage(op, redact(key), e)
}

/// In-memory value with an optional deadline.
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    data: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist.
    Missing,
    /// Key exists without an expiry.
    Persistent,
    /// Key expires in this many seconds.
    Expires(i64),
}

impl KeyTtl {
    fn from_redis(raw: i64) -> Self {
        match raw {
            -2 => Self::Missing,
            -1 => Self::Persistent,
            secs => Self::Expires(secs),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// Seconds left, if the key expires.
    #[must_use]
    pub fn seconds(&self) -> Option<i64> {
        match self {
            Self::Expires(secs) => Some(*secs),
            _ => None,
        }
    }
}

/// Record store with TTL support.
#[derive(Clone)]
pub enum KvStore {
    /// Single-instance: local DashMap only
    Memory(Arc<DashMap<String, MemoryEntry>>),

    /// Multi-instance: shared Redis
    Redis(Pool),
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(map) => f.debug_tuple("Memory").field(&map.len()).finish(),
            Self::Redis(_) => f.write_str("Redis"),
        }
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new_memory()
    }
}

impl KvStore {
    /// Create an in-process store.
    pub fn new_memory() -> Self {
        KvStore::Memory(Arc::new(DashMap::new()))
    }

    /// Create a Redis-backed store.
    pub fn new_redis(pool: Pool) -> Self {
        KvStore::Redis(pool)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            KvStore::Memory(_) => "memory",
            KvStore::Redis(_) => "redis",
        }
    }

    async fn connection(&self, op: &str, key: &str) -> AuthResult<Option<deadpool_redis::Connection>> {
        match self {
            KvStore::Memory(_) => Ok(None),
            KvStore::Redis(pool) => pool
                .get()
                .await
                .map(Some)
                .map_err(|e| storage_error(op, key, e)),
        }
    }

    /// Read a value. Expired entries read as absent.
    pub async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        match self {
            KvStore::Memory(map) => {
                let now = Instant::now();
                let value = match map.get(key) {
                    Some(entry) if !entry.is_expired(now) => Some(entry.data.clone()),
                    Some(_) => None,
                    None => return Ok(None),
                };
                if value.is_none() {
                    map.remove_if(key, |_, entry| entry.is_expired(now));
                }
                Ok(value)
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("get", key).await? else {
                    return Ok(None);
                };
                conn.get::<_, Option<String>>(key)
                    .await
                    .map_err(|e| storage_error("get", key, e))
            }
        }
    }

    /// Write a value that expires after `ttl_secs`.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AuthResult<()> {
        let ttl_secs = ttl_secs.max(1);
        match self {
            KvStore::Memory(map) => {
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        data: value.to_string(),
                        expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
                    },
                );
                Ok(())
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("set_ex", key).await? else {
                    return Ok(());
                };
                conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                    .await
                    .map_err(|e| storage_error("set_ex", key, e))?;
                tracing::debug!(key = %redact(key), ttl_secs, "Stored record");
                Ok(())
            }
        }
    }

    /// Write a value with no expiry.
    pub async fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        match self {
            KvStore::Memory(map) => {
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        data: value.to_string(),
                        expires_at: None,
                    },
                );
                Ok(())
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("set", key).await? else {
                    return Ok(());
                };
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| storage_error("set", key, e))
            }
        }
    }

    /// Reset the TTL of an existing key. Returns false when the key is absent.
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> AuthResult<bool> {
        let ttl_secs = ttl_secs.max(1);
        match self {
            KvStore::Memory(map) => {
                let now = Instant::now();
                match map.get_mut(key) {
                    Some(mut entry) if !entry.is_expired(now) => {
                        entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("expire", key).await? else {
                    return Ok(false);
                };
                let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
                conn.expire::<_, bool>(key, secs)
                    .await
                    .map_err(|e| storage_error("expire", key, e))
            }
        }
    }

    /// Remaining lifetime of a key, rounded to the nearest second.
    pub async fn ttl(&self, key: &str) -> AuthResult<KeyTtl> {
        match self {
            KvStore::Memory(map) => {
                let now = Instant::now();
                Ok(match map.get(key) {
                    Some(entry) if !entry.is_expired(now) => match entry.expires_at {
                        Some(at) => {
                            let millis = at.saturating_duration_since(now).as_millis();
                            KeyTtl::Expires(i64::try_from((millis + 500) / 1000).unwrap_or(i64::MAX))
                        }
                        None => KeyTtl::Persistent,
                    },
                    _ => KeyTtl::Missing,
                })
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("ttl", key).await? else {
                    return Ok(KeyTtl::Missing);
                };
                conn.ttl::<_, i64>(key)
                    .await
                    .map(KeyTtl::from_redis)
                    .map_err(|e| storage_error("ttl", key, e))
            }
        }
    }

    /// Delete a key. Deleting an absent key succeeds.
    pub async fn del(&self, key: &str) -> AuthResult<()> {
        match self {
            KvStore::Memory(map) => {
                map.remove(key);
                Ok(())
            }
            KvStore::Redis(_) => {
                let Some(mut conn) = self.connection("del", key).await? else {
                    return Ok(());
                };
                conn.del::<_, ()>(key)
                    .await
                    .map_err(|e| storage_error("del", key, e))
            }
        }
    }
}

/// Build a store from configuration.
///
/// Falls back to the in-memory store when Redis is disabled or unreachable.
pub async fn create_kv_store(config: &RedisConfig) -> KvStore {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-memory SSO store");
        return KvStore::new_memory();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-memory store."
            );
            return KvStore::new_memory();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            KvStore::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-memory store."
            );
            KvStore::new_memory()
        }
    }
}
