//! The two-tier cache engine (§4.A): an L1 in-process store backed by
//! [`dashmap::DashMap`], fronting an optional L2 [`DistributedCache`].
//!
//! L1 lookups are synchronous; only an L2 round trip (on an L1 miss, or on
//! every write-through/pipeline call) crosses an await point. A distributed
//! cache failure is always logged and folded into the L1-only outcome
//! rather than propagated — the L2 tier is an optimization, not a source
//! of truth.

use crate::distributed::{build_from_endpoint, DistributedCache, NullDistributedCache};
use chrono::Utc;
use dashmap::DashMap;
use sprint_core::config::CacheConfig;
use sprint_core::types::CacheEntry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// L1 occupancy at which a `set`/`set_many` triggers eviction (§8 capacity
/// pressure invariant).
const CAPACITY_PRESSURE_RATIO: f64 = 0.95;
/// Fraction of `max_entries` evicted on a plain `set`'s capacity pressure.
const SET_EVICTION_RATIO: f64 = 0.10;
/// Fraction of `max_entries` evicted when a `set_many` batch's L2 write
/// failure ratio crosses [`SET_MANY_FAILURE_RATIO_THRESHOLD`].
const SET_MANY_EVICTION_RATIO: f64 = 0.20;
/// Per-item L2 failure ratio in a `set_many` batch above which the extra
/// L1 eviction triggers.
const SET_MANY_FAILURE_RATIO_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

pub struct CacheEngine {
    store: DashMap<String, CacheEntry>,
    max_entries: usize,
    default_ttl_seconds: u64,
    distributed: Arc<dyn DistributedCache>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl CacheEngine {
    pub fn new(max_entries: usize, default_ttl_seconds: u64) -> Self {
        Self::with_distributed(max_entries, default_ttl_seconds, Arc::new(NullDistributedCache))
    }

    pub fn with_distributed(
        max_entries: usize,
        default_ttl_seconds: u64,
        distributed: Arc<dyn DistributedCache>,
    ) -> Self {
        Self {
            store: DashMap::new(),
            max_entries,
            default_ttl_seconds,
            distributed,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Builds the engine from `cache.*` config: an endpoint configured
    /// under `distributed.endpoint` becomes a real [`crate::distributed::RedisDistributedCache`]
    /// L2 tier; a missing endpoint (or a failed connect attempt) falls
    /// back to [`NullDistributedCache`], matching the documented "`None`
    /// disables the distributed tier" contract.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let deadline = Duration::from_millis(config.distributed.deadline_ms);
        let distributed = build_from_endpoint(config.distributed.endpoint.as_deref(), deadline).await;
        Self::with_distributed(config.memory.max_entries, config.memory.default_ttl_seconds, distributed)
    }

    /// L1-only lookup honoring TTL. Returns `None` and removes the entry if
    /// it has expired.
    fn get_l1(&self, key: &str) -> Option<serde_json::Value> {
        let expired = match self.store.get(key) {
            Some(entry) => self.is_expired(&entry),
            None => return None,
        };

        if expired {
            self.store.remove(key);
            return None;
        }

        self.store.get_mut(key).map(|mut entry| {
            entry.access_count += 1;
            entry.last_accessed = Utc::now();
            entry.value.clone()
        })
    }

    /// Lookup with an L2 fallback on an L1 miss: the distributed tier is
    /// consulted, a hit backfills L1, and a miss or distributed-cache error
    /// is reported as `None`.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.get_l1(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        match self.distributed.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => {
                    self.backfill_l1(key, value.clone());
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(e) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key, error = %e, "failed to deserialize distributed cache entry");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "distributed cache lookup failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Batched lookup, preserving the order of `keys`. L1 is checked
    /// per-key; L2 misses are grouped into a single pipeline call rather
    /// than one round trip per key, and hits backfill L1.
    pub async fn get_many(&self, keys: &[String]) -> std::collections::HashMap<String, serde_json::Value> {
        let mut out = std::collections::HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();

        for key in keys {
            if let Some(value) = self.get_l1(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                out.insert(key.clone(), value);
            } else {
                misses.push(key.clone());
            }
        }

        if misses.is_empty() {
            return out;
        }

        match self.distributed.get_many(&misses).await {
            Ok(values) => {
                for (key, maybe_bytes) in misses.iter().zip(values) {
                    match maybe_bytes {
                        Some(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                            Ok(value) => {
                                self.backfill_l1(key, value.clone());
                                self.hits.fetch_add(1, Ordering::Relaxed);
                                out.insert(key.clone(), value);
                            }
                            Err(e) => {
                                self.errors.fetch_add(1, Ordering::Relaxed);
                                warn!(key, error = %e, "failed to deserialize distributed cache entry");
                                self.misses.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        None => {
                            self.misses.fetch_add(1, Ordering::Relaxed);
                        }
                    };
                }
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "distributed cache batch lookup failed, treating misses as absent");
                self.misses.fetch_add(misses.len() as u64, Ordering::Relaxed);
            }
        }

        out
    }

    /// Insert or overwrite an entry: L1 first (evicting under capacity
    /// pressure), then a write-through to L2. `ttl_seconds` of `None` uses
    /// the engine's configured default.
    pub async fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl_seconds: Option<u64>) {
        let key = key.into();
        if !self.store.contains_key(&key) {
            self.enforce_capacity_pressure(SET_EVICTION_RATIO);
        }
        self.insert_l1(key.clone(), value.clone(), ttl_seconds);
        self.write_through_l2(&key, &value, ttl_seconds.unwrap_or(self.default_ttl_seconds)).await;
    }

    /// Batched insert: one capacity-pressure check for the whole batch,
    /// then a single L2 pipeline write. If at least
    /// [`SET_MANY_FAILURE_RATIO_THRESHOLD`] of the batch's L2 writes fail,
    /// an extra [`SET_MANY_EVICTION_RATIO`] of L1 is evicted to relieve
    /// pressure building up behind a degraded distributed tier.
    pub async fn set_many(&self, entries: Vec<(String, serde_json::Value, Option<u64>)>) {
        if entries.is_empty() {
            return;
        }

        if entries.iter().any(|(key, _, _)| !self.store.contains_key(key)) {
            self.enforce_capacity_pressure(SET_EVICTION_RATIO);
        }

        for (key, value, ttl_seconds) in &entries {
            self.insert_l1(key.clone(), value.clone(), *ttl_seconds);
        }

        let payloads: Vec<(String, Vec<u8>, u64)> = entries
            .iter()
            .filter_map(|(key, value, ttl_seconds)| {
                serde_json::to_vec(value)
                    .ok()
                    .map(|bytes| (key.clone(), bytes, ttl_seconds.unwrap_or(self.default_ttl_seconds)))
            })
            .collect();

        let total = payloads.len();
        if total == 0 {
            return;
        }

        match self.distributed.set_many(&payloads).await {
            Ok(written) => {
                let failed = total.saturating_sub(written);
                if failed > 0 {
                    self.errors.fetch_add(failed as u64, Ordering::Relaxed);
                }
                let failure_ratio = failed as f64 / total as f64;
                if failure_ratio >= SET_MANY_FAILURE_RATIO_THRESHOLD {
                    warn!(
                        failed,
                        total, "set_many L2 failure ratio crossed threshold, evicting L1 headroom"
                    );
                    self.evict_batch(SET_MANY_EVICTION_RATIO);
                }
            }
            Err(e) => {
                self.errors.fetch_add(total as u64, Ordering::Relaxed);
                warn!(error = %e, total, "set_many L2 pipeline failed entirely, evicting L1 headroom");
                self.evict_batch(SET_MANY_EVICTION_RATIO);
            }
        }
    }

    /// Delete every key whose name starts with `prefix`, in both tiers.
    /// Used to invalidate a whole sprint's worth of cached reads after a
    /// tool call that mutates upstream state. The returned count sums both
    /// tiers and may double-count a key present in both L1 and L2.
    pub async fn delete_pattern(&self, prefix: &str) -> usize {
        let to_remove: Vec<String> = self
            .store
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        let removed_l1 = to_remove.len();
        for key in to_remove {
            self.store.remove(&key);
        }

        let removed_l2 = match self.distributed.delete_pattern(prefix).await {
            Ok(n) => n,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(prefix, error = %e, "distributed cache pattern delete failed");
                0
            }
        };

        removed_l1 + removed_l2
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.num_seconds() >= entry.ttl_seconds as i64
    }

    fn insert_l1(&self, key: String, value: serde_json::Value, ttl_seconds: Option<u64>) {
        let now = Utc::now();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            ttl_seconds: ttl_seconds.unwrap_or(self.default_ttl_seconds),
            stored_at: now,
            access_count: 0,
            last_accessed: now,
        };
        self.store.insert(key, entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Backfill an L2 hit into L1, respecting capacity pressure for new
    /// keys just as a direct `set` would.
    fn backfill_l1(&self, key: &str, value: serde_json::Value) {
        if !self.store.contains_key(key) {
            self.enforce_capacity_pressure(SET_EVICTION_RATIO);
        }
        self.insert_l1(key.to_string(), value, None);
    }

    async fn write_through_l2(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(e) = self.distributed.set(key, bytes, ttl_seconds).await {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key, error = %e, "distributed cache write failed, L1 still holds the entry");
                }
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "failed to serialize value for distributed cache write");
            }
        }
    }

    fn over_capacity_pressure(&self) -> bool {
        if self.max_entries == 0 {
            return false;
        }
        self.store.len() as f64 >= self.max_entries as f64 * CAPACITY_PRESSURE_RATIO
    }

    /// Evict `eviction_ratio` of `max_entries`, oldest-accessed first, and
    /// retry once if pressure hasn't cleared (e.g. concurrent inserts
    /// outpaced the first pass).
    fn enforce_capacity_pressure(&self, eviction_ratio: f64) {
        if !self.over_capacity_pressure() {
            return;
        }
        self.evict_batch(eviction_ratio);
        if self.over_capacity_pressure() {
            self.evict_batch(eviction_ratio);
        }
    }

    /// Evict the oldest `ceil(max_entries * eviction_ratio)` entries by
    /// `last_accessed`. `max_entries` is expected to stay in the low tens
    /// of thousands, so a full sort per eviction trades a bit of
    /// eviction-time cost for not needing a second ordered index.
    fn evict_batch(&self, eviction_ratio: f64) {
        let target = ((self.max_entries as f64) * eviction_ratio).ceil().max(1.0) as usize;
        let mut oldest: Vec<(String, chrono::DateTime<Utc>)> = self
            .store
            .iter()
            .map(|entry| (entry.key().clone(), entry.last_accessed))
            .collect();
        oldest.sort_by_key(|(_, last_accessed)| *last_accessed);

        let mut evicted = 0usize;
        for (key, _) in oldest.into_iter().take(target) {
            if self.store.remove(&key).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, target, "evicted batch of cache entries under capacity pressure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::DistributedCacheError;
    use async_trait::async_trait;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = CacheEngine::new(100, 300);
        cache.set("sprint:42", json!({"name": "Sprint 42"}), None).await;
        assert_eq!(cache.get("sprint:42").await, Some(json!({"name": "Sprint 42"})));
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_read() {
        let cache = CacheEngine::new(100, 0);
        cache.set("k", json!(1), Some(0)).await;
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn set_many_and_get_many_round_trip() {
        let cache = CacheEngine::new(100, 300);
        cache
            .set_many(vec![
                ("a".to_string(), json!(1), None),
                ("b".to_string(), json!(2), None),
            ])
            .await;
        let got = cache.get_many(&["a".to_string(), "b".to_string(), "missing".to_string()]).await;
        assert_eq!(got.len(), 2);
        assert_eq!(got.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn capacity_pressure_evicts_ten_percent_at_ninety_five_percent_occupancy() {
        // max_entries = 20: 0.95 * 20 = 19, so the 20th insert finds the
        // store already at 19 entries and evicts ceil(0.10 * 20) = 2.
        let cache = CacheEngine::new(20, 300);
        for i in 0..19 {
            cache.set(format!("k{i}"), json!(i), None).await;
        }
        assert_eq!(cache.stats().entries, 19);
        assert_eq!(cache.stats().evictions, 0);

        cache.set("k19", json!(19), None).await;

        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(cache.stats().entries, 18);
        // The two oldest (k0, k1) are gone; the newest survives.
        assert_eq!(cache.get("k0").await, None);
        assert_eq!(cache.get("k1").await, None);
        assert!(cache.get("k19").await.is_some());
    }

    #[tokio::test]
    async fn delete_pattern_removes_matching_prefix() {
        let cache = CacheEngine::new(100, 300);
        cache.set("sprint:42:issues", json!([]), None).await;
        cache.set("sprint:42:commits", json!([]), None).await;
        cache.set("sprint:43:issues", json!([]), None).await;

        let removed = cache.delete_pattern("sprint:42:").await;
        assert_eq!(removed, 2);
        assert!(cache.get("sprint:43:issues").await.is_some());
    }

    #[tokio::test]
    async fn l2_miss_falls_through_to_none() {
        let cache = CacheEngine::new(100, 300);
        assert_eq!(cache.get("absent").await, None);
    }

    #[tokio::test]
    async fn l2_hit_backfills_l1() {
        struct OneShotDistributedCache;
        #[async_trait]
        impl DistributedCache for OneShotDistributedCache {
            async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DistributedCacheError> {
                if key == "remote" {
                    Ok(Some(serde_json::to_vec(&json!({"from": "l2"})).unwrap()))
                } else {
                    Ok(None)
                }
            }
            async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_seconds: u64) -> Result<(), DistributedCacheError> {
                Ok(())
            }
            async fn delete_pattern(&self, _pattern: &str) -> Result<usize, DistributedCacheError> {
                Ok(0)
            }
        }

        let cache = CacheEngine::with_distributed(100, 300, Arc::new(OneShotDistributedCache));
        assert_eq!(cache.get("remote").await, Some(json!({"from": "l2"})));
        // Backfilled: stats now show an L1 entry even though we never called `set`.
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn set_many_evicts_extra_headroom_when_l2_failure_ratio_is_high() {
        struct AlwaysFailDistributedCache;
        #[async_trait]
        impl DistributedCache for AlwaysFailDistributedCache {
            async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, DistributedCacheError> {
                Ok(None)
            }
            async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_seconds: u64) -> Result<(), DistributedCacheError> {
                Err(DistributedCacheError::Unreachable("down".to_string()))
            }
            async fn delete_pattern(&self, _pattern: &str) -> Result<usize, DistributedCacheError> {
                Ok(0)
            }
        }

        // max_entries = 10: every set() in this batch fails, so the
        // failure ratio is 100% >= 30%, triggering ceil(0.20 * 10) = 2
        // extra evictions on top of the L1 inserts.
        let cache = CacheEngine::with_distributed(10, 300, Arc::new(AlwaysFailDistributedCache));
        cache
            .set_many(vec![
                ("a".to_string(), json!(1), None),
                ("b".to_string(), json!(2), None),
                ("c".to_string(), json!(3), None),
            ])
            .await;

        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(cache.stats().errors, 3);
    }
}
