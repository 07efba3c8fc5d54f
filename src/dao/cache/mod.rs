//! Typed cache facade over a key/value backend with a per-entity TTL policy.
//!
//! The cache is a best-effort optimisation layered over the document store: every backend
//! failure is logged and reported to callers exactly like a miss.

pub mod keys;
pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis_backend;

use std::{error::Error, future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

/// Result alias for raw cache backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable during {operation}")]
    Unavailable {
        operation: &'static str,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("cached value at `{key}` is not an integer")]
    NotAnInteger { key: String },
}

impl CacheError {
    /// Wrap a backend failure that happened during `operation`.
    pub fn unavailable(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        CacheError::Unavailable {
            operation,
            source: Box::new(source),
        }
    }
}

/// Shortest lifetime a backend gives an entry; Redis `SETEX` has one-second resolution.
pub const MIN_TTL: Duration = Duration::from_secs(1);

/// Raw string-valued key/value backend (Redis in production, in-memory in development).
pub trait CacheBackend: Send + Sync {
    fn get_raw(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>>;
    fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>>;
    fn delete(&self, key: &str) -> BoxFuture<'static, CacheResult<bool>>;
    /// Delete every key matching a glob pattern (`*` and `?` wildcards).
    fn delete_pattern(&self, pattern: &str) -> BoxFuture<'static, CacheResult<usize>>;
    fn increment_by(&self, key: &str, delta: i64) -> BoxFuture<'static, CacheResult<i64>>;
    fn ping(&self) -> BoxFuture<'static, CacheResult<()>>;
}

/// Fixed TTL per cached entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Leaderboard,
    Tournament,
    Teams,
    Matches,
    VoteTally,
    Player,
    Session,
    Stats,
    /// Explicit TTL in seconds; zero is raised to [`MIN_TTL`].
    Custom(u64),
}

impl CacheTtl {
    /// Duration a value of this kind stays cached.
    pub fn as_duration(self) -> Duration {
        let secs = match self {
            CacheTtl::Leaderboard => 5,
            CacheTtl::Tournament => 60,
            CacheTtl::Teams => 30,
            CacheTtl::Matches => 10,
            CacheTtl::VoteTally => 10,
            CacheTtl::Player => 300,
            CacheTtl::Session => 3_600,
            CacheTtl::Stats => 30,
            CacheTtl::Custom(secs) => secs,
        };
        Duration::from_secs(secs).max(MIN_TTL)
    }
}

/// Typed cache facade handed to services.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    /// Wrap a backend implementation.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Fetch and decode a cached value; decode errors and backend failures read as a miss.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.backend.get_raw(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(key, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "cache get failed");
                None
            }
        }
    }

    /// Encode and store a value; returns whether the write reached the backend.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: CacheTtl) -> bool
    where
        T: Serialize + ?Sized,
    {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "failed to encode cache entry");
                return false;
            }
        };

        match self.backend.set_raw(key, raw, ttl.as_duration()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "cache set failed");
                false
            }
        }
    }

    /// Remove a key; `false` when it was absent or the backend failed.
    pub async fn delete(&self, key: &str) -> bool {
        self.backend.delete(key).await.unwrap_or_else(|err| {
            warn!(key, error = %err, "cache delete failed");
            false
        })
    }

    /// Remove all keys matching `pattern`, returning how many were removed.
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        self.backend
            .delete_pattern(pattern)
            .await
            .unwrap_or_else(|err| {
                warn!(pattern, error = %err, "cache pattern delete failed");
                0
            })
    }

    /// Atomically add `delta` to an integer counter.
    pub async fn increment_by(&self, key: &str, delta: i64) -> Option<i64> {
        match self.backend.increment_by(key, delta).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "cache increment failed");
                None
            }
        }
    }

    /// Whether the backend currently answers.
    pub async fn is_healthy(&self) -> bool {
        self.backend.ping().await.is_ok()
    }

    /// Read-through helper: return the cached value or load it from the source of truth and
    /// warm the cache with the fresh result.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: CacheTtl, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }

        let value = load().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        dao::cache::memory::MemoryCache,
        state::clock::{ManualClock, SharedClock},
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Standing {
        team: String,
        wins: u32,
        tags: Vec<String>,
    }

    fn cache_with_clock() -> (Cache, ManualClock) {
        let clock = ManualClock::default();
        let shared: SharedClock = Arc::new(clock.clone());
        (Cache::new(Arc::new(MemoryCache::new(shared))), clock)
    }

    #[tokio::test]
    async fn set_then_get_returns_equal_value_until_ttl_elapses() {
        let (cache, clock) = cache_with_clock();
        let value = Standing {
            team: "hopscotch".into(),
            wins: 3,
            tags: vec!["favourite".into()],
        };

        assert!(cache.set("cache:standing", &value, CacheTtl::Custom(5)).await);
        assert_eq!(cache.get::<Standing>("cache:standing").await, Some(value));

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get::<Standing>("cache:standing").await, None);
    }

    #[tokio::test]
    async fn zero_ttl_expires_after_the_minimum_instead_of_never() {
        let (cache, clock) = cache_with_clock();
        assert_eq!(CacheTtl::Custom(0).as_duration(), MIN_TTL);
        assert!(cache.set("cache:flash", &1_u32, CacheTtl::Custom(0)).await);
        assert_eq!(cache.get::<u32>("cache:flash").await, Some(1));

        clock.advance(MIN_TTL);
        assert_eq!(cache.get::<u32>("cache:flash").await, None);
    }

    #[tokio::test]
    async fn leaderboard_ttl_is_five_seconds() {
        let (cache, clock) = cache_with_clock();
        cache.set("cache:leaderboard:x", &1_u32, CacheTtl::Leaderboard).await;

        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get::<u32>("cache:leaderboard:x").await, Some(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<u32>("cache:leaderboard:x").await, None);
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let (cache, _clock) = cache_with_clock();
        cache.set("cache:k", &"text", CacheTtl::Stats).await;
        assert_eq!(cache.get::<u32>("cache:k").await, None);
    }

    #[tokio::test]
    async fn get_or_load_warms_cache() {
        let (cache, _clock) = cache_with_clock();
        let loaded: Result<u32, ()> = cache
            .get_or_load("cache:load", CacheTtl::Stats, || async { Ok(7) })
            .await;
        assert_eq!(loaded, Ok(7));

        let second: Result<u32, ()> = cache
            .get_or_load("cache:load", CacheTtl::Stats, || async { Err(()) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn pattern_delete_and_increment() {
        let (cache, _clock) = cache_with_clock();
        cache.set("cache:teams:a", &1, CacheTtl::Teams).await;
        cache.set("cache:teams:b", &2, CacheTtl::Teams).await;
        cache.set("cache:matches:a", &3, CacheTtl::Matches).await;

        assert_eq!(cache.delete_pattern("cache:teams:*").await, 2);
        assert_eq!(cache.get::<i32>("cache:matches:a").await, Some(3));

        assert_eq!(cache.increment_by("counter", 2).await, Some(2));
        assert_eq!(cache.increment_by("counter", 3).await, Some(5));
        assert!(cache.delete("counter").await);
        assert!(!cache.delete("counter").await);
    }
}
