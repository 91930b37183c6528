//! Key/value cache used as a short-lived lookup table.
//!
//! Two backends share the `Cache` trait: Redis (through a reconnecting
//! connection manager) and an in-process map used when REDIS_URL is unset.
//! Values are strings; `get_json`/`set_json` layer serde on top. No expiry is
//! ever set on entries.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum CacheError {
  #[error("redis error for key {key:?}: {source}")]
  Redis {
    key: String,
    #[source]
    source: redis::RedisError,
  },

  #[error("cached value for key {key:?} has an unexpected shape: {source}")]
  Shape {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode value for key {key:?}: {source}")]
  Encode {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait Cache: Send + Sync {
  async fn get(&self, key: &str) -> CacheResult<Option<String>>;
  async fn set(&self, key: &str, value: String) -> CacheResult<()>;
  async fn del(&self, key: &str) -> CacheResult<()>;
  async fn exists(&self, key: &str) -> CacheResult<bool>;
  async fn ping(&self) -> CacheResult<()>;
}

/// Read and decode a JSON value. A value that does not decode as `T` is an error.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> CacheResult<Option<T>> {
  match cache.get(key).await? {
    None => Ok(None),
    Some(raw) => serde_json::from_str(&raw)
      .map(Some)
      .map_err(|source| CacheError::Shape { key: key.to_string(), source }),
  }
}

pub async fn set_json<T: Serialize + ?Sized>(cache: &dyn Cache, key: &str, value: &T) -> CacheResult<()> {
  let raw = serde_json::to_string(value).map_err(|source| CacheError::Encode { key: key.to_string(), source })?;
  cache.set(key, raw).await
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
  manager: ConnectionManager,
}

impl RedisCache {
  pub async fn connect(url: &str) -> CacheResult<Self> {
    let wrap = |source| CacheError::Redis { key: String::new(), source };
    let client = redis::Client::open(url).map_err(wrap)?;
    let manager = ConnectionManager::new(client).await.map_err(wrap)?;
    info!(target: "recall_backend", "Connected to Redis");
    Ok(Self { manager })
  }
}

#[async_trait]
impl Cache for RedisCache {
  #[instrument(level = "debug", skip(self))]
  async fn get(&self, key: &str) -> CacheResult<Option<String>> {
    let mut conn = self.manager.clone();
    conn.get(key).await.map_err(|source| CacheError::Redis { key: key.to_string(), source })
  }

  #[instrument(level = "debug", skip(self, value), fields(value_len = value.len()))]
  async fn set(&self, key: &str, value: String) -> CacheResult<()> {
    let mut conn = self.manager.clone();
    conn.set(key, value).await.map_err(|source| CacheError::Redis { key: key.to_string(), source })
  }

  #[instrument(level = "debug", skip(self))]
  async fn del(&self, key: &str) -> CacheResult<()> {
    let mut conn = self.manager.clone();
    conn.del(key).await.map_err(|source| CacheError::Redis { key: key.to_string(), source })
  }

  async fn exists(&self, key: &str) -> CacheResult<bool> {
    let mut conn = self.manager.clone();
    conn.exists(key).await.map_err(|source| CacheError::Redis { key: key.to_string(), source })
  }

  async fn ping(&self) -> CacheResult<()> {
    let mut conn = self.manager.clone();
    redis::cmd("PING")
      .query_async::<_, String>(&mut conn)
      .await
      .map(|_| ())
      .map_err(|source| CacheError::Redis { key: String::new(), source })
  }
}

/// In-process cache. Lives as long as the server does.
#[derive(Default)]
pub struct MemoryCache {
  entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Cache for MemoryCache {
  async fn get(&self, key: &str) -> CacheResult<Option<String>> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: &str, value: String) -> CacheResult<()> {
    debug!(target: "recall_backend", %key, value_len = value.len(), "memory cache set");
    self.entries.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn del(&self, key: &str) -> CacheResult<()> {
    self.entries.write().await.remove(key);
    Ok(())
  }

  async fn exists(&self, key: &str) -> CacheResult<bool> {
    Ok(self.entries.read().await.contains_key(key))
  }

  async fn ping(&self) -> CacheResult<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: u32,
    name: String,
  }

  #[tokio::test]
  async fn memory_cache_set_get_del() {
    let cache = MemoryCache::new();
    assert_eq!(cache.get("k").await.unwrap(), None);
    assert!(!cache.exists("k").await.unwrap());

    cache.set("k", "v1".into()).await.unwrap();
    cache.set("k", "v2".into()).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));
    assert!(cache.exists("k").await.unwrap());

    cache.del("k").await.unwrap();
    assert!(!cache.exists("k").await.unwrap());
    // deleting a missing key is fine
    cache.del("k").await.unwrap();
  }

  #[tokio::test]
  async fn json_helpers_round_trip_a_list() {
    let cache = MemoryCache::new();
    let items = vec![Item { id: 1, name: "a".into() }, Item { id: 2, name: "b".into() }];
    set_json(&cache, "list", &items).await.unwrap();

    let back: Option<Vec<Item>> = get_json(&cache, "list").await.unwrap();
    assert_eq!(back, Some(items));

    let missing: Option<Vec<Item>> = get_json(&cache, "nope").await.unwrap();
    assert!(missing.is_none());
  }

  #[tokio::test]
  async fn get_json_rejects_unexpected_shape() {
    let cache = MemoryCache::new();
    cache.set("list", r#"{"not":"a list"}"#.into()).await.unwrap();
    let err = get_json::<Vec<Item>>(&cache, "list").await.unwrap_err();
    assert!(matches!(err, CacheError::Shape { ref key, .. } if key == "list"));
  }
}
