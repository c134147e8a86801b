//! The distributed (L2) cache tier (§4.A). Deployments without a shared
//! cache configured fall back to [`NullDistributedCache`], which always
//! misses — the engine then behaves as an in-process-only cache.
//! [`RedisDistributedCache`] backs the tier for real when
//! `cache.distributed.endpoint` is configured.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum DistributedCacheError {
    #[error("distributed cache unreachable: {0}")]
    Unreachable(String),
    #[error("distributed cache call timed out")]
    Timeout,
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DistributedCacheError>;
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_seconds: u64,
    ) -> Result<(), DistributedCacheError>;
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, DistributedCacheError>;

    /// Batched lookup, in the same order as `keys`. The default loops one
    /// key at a time and swallows per-key errors as misses; backends able
    /// to pipeline (e.g. Redis `MGET`) override this with a single round
    /// trip.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, DistributedCacheError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await.unwrap_or(None));
        }
        Ok(out)
    }

    /// Batched write. The default loops one key at a time; backends able to
    /// pipeline override this with a single round trip. Returns the number
    /// of entries actually written so callers can compute a failure ratio
    /// rather than treating the whole batch as one failure.
    async fn set_many(&self, entries: &[(String, Vec<u8>, u64)]) -> Result<usize, DistributedCacheError> {
        let mut written = 0;
        for (key, value, ttl_seconds) in entries {
            if self.set(key, value.clone(), *ttl_seconds).await.is_ok() {
                written += 1;
            }
        }
        Ok(written)
    }
}

/// No-op L2 used when no `cache.distributed.endpoint` is configured.
#[derive(Debug, Default)]
pub struct NullDistributedCache;

#[async_trait]
impl DistributedCache for NullDistributedCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, DistributedCacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl_seconds: u64,
    ) -> Result<(), DistributedCacheError> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<usize, DistributedCacheError> {
        Ok(0)
    }
}

/// Redis-backed L2, built over a `ConnectionManager` so a dropped
/// connection reconnects transparently instead of poisoning every
/// subsequent call. Every round trip is bounded by `deadline` since an
/// unreachable distributed tier must degrade to a miss, not stall the
/// caller indefinitely.
pub struct RedisDistributedCache {
    manager: redis::aio::ConnectionManager,
    deadline: Duration,
}

impl RedisDistributedCache {
    pub async fn connect(endpoint: &str, deadline: Duration) -> Result<Self, DistributedCacheError> {
        let client = redis::Client::open(endpoint)
            .map_err(|e| DistributedCacheError::Unreachable(e.to_string()))?;
        let manager = tokio::time::timeout(deadline, redis::aio::ConnectionManager::new(client))
            .await
            .map_err(|_| DistributedCacheError::Timeout)?
            .map_err(|e| DistributedCacheError::Unreachable(e.to_string()))?;
        Ok(Self { manager, deadline })
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = redis::RedisResult<T>>) -> Result<T, DistributedCacheError> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DistributedCacheError::Unreachable(e.to_string())),
            Err(_elapsed) => Err(DistributedCacheError::Timeout),
        }
    }
}

#[async_trait]
impl DistributedCache for RedisDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DistributedCacheError> {
        let mut conn = self.manager.clone();
        self.with_timeout(redis::cmd("GET").arg(key).query_async(&mut conn)).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_seconds: u64,
    ) -> Result<(), DistributedCacheError> {
        let mut conn = self.manager.clone();
        self.with_timeout(
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_seconds)
                .arg(value)
                .query_async(&mut conn),
        )
        .await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, DistributedCacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        self.with_timeout(redis::cmd("MGET").arg(keys).query_async(&mut conn)).await
    }

    /// A single pipeline write covering the whole batch (§4.A: "single L2
    /// pipeline" for `setMany`). Since `SETEX` on a pipeline either all
    /// apply or the round trip itself fails, this reports all-or-nothing
    /// rather than a true per-key count — a real client failure here means
    /// every entry in the batch is presumed unwritten.
    async fn set_many(&self, entries: &[(String, Vec<u8>, u64)]) -> Result<usize, DistributedCacheError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for (key, value, ttl_seconds) in entries {
            pipe.cmd("SETEX").arg(key).arg(*ttl_seconds).arg(value).ignore();
        }
        self.with_timeout(pipe.query_async::<()>(&mut conn)).await?;
        Ok(entries.len())
    }

    /// Non-blocking `SCAN ... MATCH` cursor loop, batching deletes up to
    /// 1000 keys per pipeline rather than `KEYS`, which blocks the server
    /// for the duration of a full keyspace walk.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, DistributedCacheError> {
        let mut conn = self.manager.clone();
        let match_pattern = format!("{pattern}*");
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .with_timeout(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&match_pattern)
                        .arg("COUNT")
                        .arg(1000)
                        .query_async(&mut conn),
                )
                .await?;

            for batch in keys.chunks(1000) {
                if batch.is_empty() {
                    continue;
                }
                let mut del_pipe = redis::pipe();
                for key in batch {
                    del_pipe.cmd("DEL").arg(key).ignore();
                }
                self.with_timeout(del_pipe.query_async::<()>(&mut conn)).await?;
                deleted += batch.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }
}

/// Builds the L2 tier from config: `None` endpoint (or a failed connect
/// attempt, logged and swallowed) falls back to [`NullDistributedCache`]
/// so a down distributed cache degrades the engine to in-process-only
/// rather than failing startup.
pub async fn build_from_endpoint(endpoint: Option<&str>, deadline: Duration) -> std::sync::Arc<dyn DistributedCache> {
    match endpoint {
        Some(endpoint) => match RedisDistributedCache::connect(endpoint, deadline).await {
            Ok(cache) => std::sync::Arc::new(cache),
            Err(e) => {
                warn!(endpoint, error = %e, "failed to connect to distributed cache, falling back to in-process only");
                std::sync::Arc::new(NullDistributedCache)
            }
        },
        None => std::sync::Arc::new(NullDistributedCache),
    }
}
