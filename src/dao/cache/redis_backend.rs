//! Redis cache backend.

use std::time::Duration;

use futures::future::BoxFuture;
use redis::aio::MultiplexedConnection;

use super::{CacheBackend, CacheError, CacheResult, MIN_TTL};

const SCAN_BATCH: usize = 200;

/// Cache backend talking to Redis through a shared multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    /// Open a client for `url` and establish the multiplexed connection.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client =
            redis::Client::open(url).map_err(|err| CacheError::unavailable("open", err))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| CacheError::unavailable("connect", err))?;
        Ok(Self { connection })
    }
}

impl CacheBackend for RedisCache {
    fn get_raw(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        let mut conn = self.connection.clone();
        let key = key.to_string();
        Box::pin(async move {
            let value: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::unavailable("GET", err))?;
            Ok(value)
        })
    }

    fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        let mut conn = self.connection.clone();
        let key = key.to_string();
        Box::pin(async move {
            let secs = ttl.max(MIN_TTL).as_secs();
            let _: () = redis::cmd("SETEX")
                .arg(&key)
                .arg(secs)
                .arg(value)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::unavailable("SETEX", err))?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, CacheResult<bool>> {
        let mut conn = self.connection.clone();
        let key = key.to_string();
        Box::pin(async move {
            let removed: i64 = redis::cmd("DEL")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::unavailable("DEL", err))?;
            Ok(removed > 0)
        })
    }

    fn delete_pattern(&self, pattern: &str) -> BoxFuture<'static, CacheResult<usize>> {
        let mut conn = self.connection.clone();
        let pattern = pattern.to_string();
        Box::pin(async move {
            let mut cursor: u64 = 0;
            let mut removed = 0_usize;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| CacheError::unavailable("SCAN", err))?;

                if !keys.is_empty() {
                    let count: i64 = redis::cmd("DEL")
                        .arg(&keys)
                        .query_async(&mut conn)
                        .await
                        .map_err(|err| CacheError::unavailable("DEL", err))?;
                    removed += usize::try_from(count).unwrap_or_default();
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(removed)
        })
    }

    fn increment_by(&self, key: &str, delta: i64) -> BoxFuture<'static, CacheResult<i64>> {
        let mut conn = self.connection.clone();
        let key = key.to_string();
        Box::pin(async move {
            redis::cmd("INCRBY")
                .arg(&key)
                .arg(delta)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::unavailable("INCRBY", err))
        })
    }

    fn ping(&self) -> BoxFuture<'static, CacheResult<()>> {
        let mut conn = self.connection.clone();
        Box::pin(async move {
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::unavailable("PING", err))?;
            Ok(())
        })
    }
}
