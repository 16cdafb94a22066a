mod redis_store;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use redis_store::RedisCacheStore;

/// How long guild configuration stays cached before it is re-read.
pub const CONFIG_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
enum CacheBackend {
    Disabled,
    Redis(RedisCacheStore),
}

/// JSON cache in front of hot configuration reads. The disabled backend
/// always misses, so callers fall through to the store.
#[derive(Clone, Debug)]
pub struct CacheService {
    key_prefix: String,
    backend: CacheBackend,
}

impl CacheService {
    pub fn disabled(prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: prefix.into(),
            backend: CacheBackend::Disabled,
        }
    }

    pub fn redis(redis_url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            key_prefix: prefix.into(),
            backend: CacheBackend::Redis(RedisCacheStore::from_url(redis_url)?),
        })
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        match &self.backend {
            CacheBackend::Disabled => Ok(()),
            CacheBackend::Redis(store) => store.ping().await,
        }
    }

    pub fn key(&self, suffix: impl AsRef<str>) -> String {
        format!("{}:{}", self.key_prefix, suffix.as_ref())
    }

    pub async fn get_json<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let value = match &self.backend {
            CacheBackend::Disabled => None,
            CacheBackend::Redis(store) => store.get(key).await?,
        };

        match value {
            Some(bytes) => {
                let parsed = serde_json::from_slice(&bytes).map_err(|e| {
                    anyhow::anyhow!("failed to deserialize cache value for `{key}`: {e}")
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let ttl_seconds = ttl.as_secs().max(1);
        let payload = serde_json::to_vec(value)
            .map_err(|e| anyhow::anyhow!("failed to serialize cache value for `{key}`: {e}"))?;

        match &self.backend {
            CacheBackend::Disabled => Ok(()),
            CacheBackend::Redis(store) => store.set(key, payload, ttl_seconds).await,
        }
    }

    pub async fn del(&self, key: &str) -> anyhow::Result<()> {
        match &self.backend {
            CacheBackend::Disabled => Ok(()),
            CacheBackend::Redis(store) => store.del(key).await,
        }
    }

    /// Read through the cache. Cache failures are logged and never fail the
    /// read; only the loader's error is returned.
    pub async fn get_or_load_json<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match self.get_json::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(?e, cache_key = key, "cache get failed; falling back to store"),
        }

        let loaded = loader().await?;

        if let Err(e) = self.set_json(key, &loaded, ttl).await {
            warn!(?e, cache_key = key, "cache set failed; returning store value");
        }

        Ok(loaded)
    }
}

pub fn guild_config_key(cache: &CacheService, guild_id: u64) -> String {
    cache.key(format!("guild_config:{guild_id}"))
}

pub async fn invalidate_guild_config(cache: &CacheService, guild_id: u64) -> anyhow::Result<()> {
    cache.del(&guild_config_key(cache, guild_id)).await
}
