//! Per-provider wiring on top of [`crate::rate_limiter`] and
//! [`crate::circuit_breaker`] (§4.B): one bucket and one breaker per
//! upstream provider (`"tracker"`, `"scm"`), built lazily from
//! [`sprint_core::config::AggregationConfig`] on first use.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use dashmap::DashMap;
use sprint_core::config::AggregationConfig;
use std::sync::Arc;
use std::time::Duration;

pub struct RateLimiterRegistry {
    config: AggregationConfig,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            limiters: DashMap::new(),
        }
    }

    pub fn for_provider(&self, provider: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.get(provider) {
            return limiter.clone();
        }

        let settings = self.config.rate_limit_for(provider);
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::per_minute(settings.per_minute as u64).with_burst(settings.burst as u64),
        ));
        self.limiters
            .insert(provider.to_string(), limiter.clone());
        limiter
    }
}

pub struct CircuitBreakerRegistry {
    config: AggregationConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn for_provider(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(provider) {
            return breaker.clone();
        }

        let settings = self.config.circuit_for(provider);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            timeout: Duration::from_millis(settings.cooldown_ms),
            ..CircuitBreakerConfig::default()
        }));
        self.breakers
            .insert(provider.to_string(), breaker.clone());
        breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_provider_returns_same_limiter_instance() {
        let registry = RateLimiterRegistry::new(AggregationConfig::default());
        let a = registry.for_provider("tracker");
        let b = registry.for_provider("tracker");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_providers_get_independent_limiters() {
        let registry = RateLimiterRegistry::new(AggregationConfig::default());
        let tracker = registry.for_provider("tracker");
        let scm = registry.for_provider("scm");
        assert!(!Arc::ptr_eq(&tracker, &scm));
    }

    #[test]
    fn breaker_config_reflects_provider_override() {
        let mut config = AggregationConfig::default();
        config.circuit.providers.insert(
            "scm".to_string(),
            sprint_core::config::ProviderCircuit {
                failure_threshold: 2,
                cooldown_ms: 1_000,
            },
        );
        let registry = CircuitBreakerRegistry::new(config);
        let breaker = registry.for_provider("scm");
        assert_eq!(breaker.failure_threshold(), 2);
    }
}
