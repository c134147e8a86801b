//! The common request pipeline every upstream call goes through (§4.C):
//! cache lookup, rate-limit acquire, circuit-breaker gate, the HTTP attempt
//! itself, retry-with-backoff, and a cache store on success.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sprint_cache::CacheEngine;
use sprint_core::config::RetryConfig;
use sprint_core::error::EngineError;
use sprint_resilience::rate_limiter::RateLimiter;
use sprint_resilience::registry::{CircuitBreakerRegistry, RateLimiterRegistry};
use tracing::{debug, warn};

use crate::error::UpstreamError;

/// Maximum time a caller will be parked waiting for rate-limiter tokens to
/// refill before giving up with `RateLimitExceeded` (§4.B).
const DEFAULT_RATE_LIMIT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RequestPipeline {
    cache: Arc<CacheEngine>,
    rate_limiters: Arc<RateLimiterRegistry>,
    circuits: Arc<CircuitBreakerRegistry>,
    retry: RetryConfig,
    rate_limit_timeout: Duration,
}

impl RequestPipeline {
    pub fn new(
        cache: Arc<CacheEngine>,
        rate_limiters: Arc<RateLimiterRegistry>,
        circuits: Arc<CircuitBreakerRegistry>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            cache,
            rate_limiters,
            circuits,
            retry,
            rate_limit_timeout: DEFAULT_RATE_LIMIT_TIMEOUT,
        }
    }

    /// Run one cached, rate-limited, circuit-broken, retried call to
    /// `provider`'s `endpoint`. `cache_key` of `None` skips caching
    /// entirely; `cache_ttl` of `Some(0)` means "do not cache" (§3
    /// invariant) while still performing the call.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        endpoint: &str,
        cache_key: Option<&str>,
        cache_ttl: Option<u64>,
        tokens: f64,
        call: F,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let cacheable = cache_ttl != Some(0);

        if cacheable {
            if let Some(key) = cache_key {
                if let Some(value) = self.cache.get(key).await {
                    if let Ok(parsed) = serde_json::from_value::<T>(value) {
                        debug!(key, "cache hit");
                        return Ok(parsed);
                    }
                }
            }
        }

        self.acquire_tokens(provider, tokens).await?;

        let breaker = self.circuits.for_provider(provider);
        breaker
            .guard()
            .await
            .map_err(|_| EngineError::CircuitOpen {
                provider: provider.to_string(),
            })?;

        let outcome = self.retry_loop(provider, endpoint, &call).await;

        match &outcome {
            Ok(_) => breaker.on_success().await,
            Err(e) if e.is_retriable() => breaker.on_failure().await,
            Err(_) => { /* 4xx other than 429 does not count against the breaker */ }
        }

        let value = outcome.map_err(|e| crate::error::to_engine_error(provider, endpoint, &e))?;

        if cacheable {
            if let Some(key) = cache_key {
                if let Ok(json) = serde_json::to_value(&value) {
                    self.cache.set(key.to_string(), json, cache_ttl).await;
                }
            }
        }

        Ok(value)
    }

    /// Exponential backoff with jitter (base 1000ms, multiplier 2, max
    /// 30s, max 3 attempts). 429s are retried honouring `Retry-After`
    /// instead of the backoff schedule; other 4xx responses are terminal.
    async fn retry_loop<T, F, Fut>(
        &self,
        provider: &str,
        endpoint: &str,
        call: &F,
    ) -> Result<T, UpstreamError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(UpstreamError::RateLimited { retry_after }) if attempt < self.retry.max_attempts => {
                    let wait = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    warn!(provider, endpoint, attempt, ?wait, "429, honoring retry-after");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) if e.is_retriable() && attempt < self.retry.max_attempts => {
                    let wait = self.backoff_delay(attempt);
                    warn!(provider, endpoint, attempt, ?wait, error = %e, "retriable failure, backing off");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.base_delay_ms as f64;
        let max = self.retry.max_delay_ms as f64;
        let exp = base * 2f64.powi(attempt as i32 - 1);
        let capped = exp.min(max);
        let jittered = capped * rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_millis(jittered as u64)
    }

    /// Park the caller until tokens are available, up to
    /// `rate_limit_timeout`. On timeout the caller fails with
    /// `RateLimitExceeded` rather than waiting indefinitely (§4.B).
    async fn acquire_tokens(&self, provider: &str, tokens: f64) -> Result<(), EngineError> {
        let limiter: Arc<RateLimiter> = self.rate_limiters.for_provider(provider);
        let mut waited = Duration::ZERO;

        loop {
            match limiter.check_with_cost(provider, tokens) {
                Ok(()) => return Ok(()),
                Err(sprint_resilience::rate_limiter::RateLimitError::Exceeded { retry_after, .. }) => {
                    if waited + retry_after > self.rate_limit_timeout {
                        return Err(EngineError::RateLimitExceeded(format!(
                            "{provider}: exceeded {:?} wait budget",
                            self.rate_limit_timeout
                        )));
                    }
                    tokio::time::sleep(retry_after).await;
                    waited += retry_after;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprint_core::config::AggregationConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pipeline() -> RequestPipeline {
        let config = AggregationConfig::default();
        RequestPipeline::new(
            Arc::new(CacheEngine::new(1000, 300)),
            Arc::new(RateLimiterRegistry::new(config.clone())),
            Arc::new(CircuitBreakerRegistry::new(config)),
            RetryConfig::default(),
        )
    }

    #[tokio::test]
    async fn successful_call_is_cached_for_next_request() {
        let pipeline = pipeline();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let fetch = move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(serde_json::json!({"ok": true}))
            }
        };

        let first: serde_json::Value = pipeline
            .execute("tracker", "test", Some("k"), Some(60), 1.0, fetch.clone())
            .await
            .unwrap();
        let second: serde_json::Value = pipeline
            .execute("tracker", "test", Some("k"), Some(60), 1.0, fetch)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ttl_zero_skips_cache_entirely() {
        let pipeline = pipeline();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(1u32)
            }
        };

        let _: u32 = pipeline
            .execute("tracker", "test", Some("nocache"), Some(0), 1.0, fetch.clone())
            .await
            .unwrap();
        let _: u32 = pipeline
            .execute("tracker", "test", Some("nocache"), Some(0), 1.0, fetch)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_retriable_failure_then_succeeds() {
        let pipeline = pipeline();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(UpstreamError::Server("boom".into()))
                } else {
                    Ok(42u32)
                }
            }
        };

        let result: u32 = pipeline
            .execute("scm", "test", None, None, 1.0, fetch)
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let pipeline = pipeline();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(UpstreamError::NotFound)
            }
        };

        let result = pipeline.execute("scm", "test", None, None, 1.0, fetch).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_then_fails_fast() {
        let mut config = AggregationConfig::default();
        config.circuit.providers.insert(
            "scm".to_string(),
            sprint_core::config::ProviderCircuit {
                failure_threshold: 2,
                cooldown_ms: 60_000,
            },
        );
        let pipeline = RequestPipeline::new(
            Arc::new(CacheEngine::new(1000, 300)),
            Arc::new(RateLimiterRegistry::new(config.clone())),
            Arc::new(CircuitBreakerRegistry::new(config)),
            RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
        );

        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let c = calls.clone();
            let fetch = move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(UpstreamError::Server("down".into()))
                }
            };
            let _ = pipeline.execute("scm", "test", None, None, 1.0, fetch).await;
        }

        let before = calls.load(Ordering::SeqCst);
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(UpstreamError::Server("down".into()))
            }
        };
        let result = pipeline.execute("scm", "test", None, None, 1.0, fetch).await;
        assert!(matches!(result, Err(EngineError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), before, "breaker should fail fast without calling upstream again");
    }
}
