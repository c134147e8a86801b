use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("circuit is open, refusing call")]
    Open,
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("inner error: {0}")]
    Inner(String),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all calls pass through.
    Closed,
    /// Too many failures, calls are rejected immediately.
    Open,
    /// Testing recovery, limited calls are allowed through.
    HalfOpen,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Rolling-window failure count at or above which the circuit opens,
    /// independent of the ratio condition below.
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open before closing.
    pub success_threshold: u32,
    /// How long the circuit stays open before transitioning to half-open.
    pub timeout: Duration,
    /// Maximum duration for an individual call.
    pub call_timeout: Duration,
    /// Width of the rolling window over which failures/successes are
    /// counted while Closed (§4.B: 5-minute window).
    pub rolling_window: Duration,
    /// Minimum number of samples in the window before the ratio condition
    /// can trip the circuit; below this, only `failure_threshold` applies.
    pub min_samples_for_ratio: u32,
    /// Failure-ratio-in-window above which the circuit opens, once
    /// `min_samples_for_ratio` has been reached.
    pub failure_ratio_threshold: f64,
}

/// Concurrent probe requests admitted while HalfOpen (§4.B "allows up to 3
/// probe requests").
const MAX_HALF_OPEN_PROBES: u32 = 3;

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            // §4.B: "on probe success -> Closed" — a single successful probe
            // closes the circuit.
            failure_threshold: 5,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
            rolling_window: Duration::from_secs(300),
            min_samples_for_ratio: 10,
            failure_ratio_threshold: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Inner state (behind Mutex)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct InnerState {
    state: CircuitState,
    /// Outcomes recorded while Closed, oldest first, `true` meaning a
    /// countable failure. Pruned to `rolling_window` on every record.
    events: VecDeque<(Instant, bool)>,
    /// Consecutive successes recorded while HalfOpen.
    half_open_successes: u32,
    /// Probe requests currently admitted and not yet resolved while
    /// HalfOpen (§4.B "allows up to 3 probe requests").
    half_open_in_flight: u32,
    last_failure_time: Option<Instant>,
}

impl InnerState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some((ts, _)) = self.events.front() {
            if now.duration_since(*ts) > window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_counts(&self) -> (u32, u32) {
        let failures = self.events.iter().filter(|(_, is_failure)| *is_failure).count() as u32;
        (failures, self.events.len() as u32)
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<InnerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(InnerState {
                state: CircuitState::Closed,
                events: VecDeque::new(),
                half_open_successes: 0,
                half_open_in_flight: 0,
                last_failure_time: None,
            })),
        }
    }

    /// Returns the current state of the circuit breaker.
    pub async fn state(&self) -> CircuitState {
        let guard = self.inner.lock().await;
        guard.state
    }

    /// Failures currently counted in the rolling window (diagnostic; not
    /// pruned by this call, so it may include entries that would be
    /// dropped on the next `record_failure`/`record_success`).
    pub async fn failure_count(&self) -> u32 {
        let guard = self.inner.lock().await;
        guard.window_counts().0
    }

    /// Consecutive successes recorded while half-open.
    pub async fn success_count(&self) -> u32 {
        let guard = self.inner.lock().await;
        guard.half_open_successes
    }

    /// The configured rolling-window failure-count threshold, exposed for
    /// registries that build breakers per provider and need to report
    /// their own settings.
    pub fn failure_threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    /// Pre-flight check used both by [`CircuitBreaker::call`] and by callers
    /// (such as the upstream client pipeline) that need to gate a call whose
    /// success/failure accounting does not map 1:1 onto the inner future's
    /// `Result` — e.g. when only a subset of error kinds should count
    /// against the breaker (§4.B: only 5xx/connection/timeout failures, not
    /// 4xx responses).
    pub async fn guard(&self) -> Result<(), CircuitBreakerError> {
        let mut guard = self.inner.lock().await;
        match guard.state {
            CircuitState::Open => {
                if let Some(last) = guard.last_failure_time {
                    if last.elapsed() >= self.config.timeout {
                        info!("circuit breaker transitioning Open -> HalfOpen");
                        guard.state = CircuitState::HalfOpen;
                        guard.half_open_successes = 0;
                        guard.half_open_in_flight = 1;
                        Ok(())
                    } else {
                        Err(CircuitBreakerError::Open)
                    }
                } else {
                    Err(CircuitBreakerError::Open)
                }
            }
            CircuitState::HalfOpen => {
                if guard.half_open_in_flight >= MAX_HALF_OPEN_PROBES {
                    Err(CircuitBreakerError::Open)
                } else {
                    guard.half_open_in_flight += 1;
                    Ok(())
                }
            }
            CircuitState::Closed => Ok(()),
        }
    }

    /// Record a successful call against the breaker's own accounting,
    /// without going through [`CircuitBreaker::call`]'s generic closure.
    pub async fn on_success(&self) {
        self.record_success().await;
    }

    /// Record a countable failure against the breaker's own accounting.
    pub async fn on_failure(&self) {
        self.record_failure().await;
    }

    /// Execute `f` through the circuit breaker.
    ///
    /// If the circuit is **Open** and the timeout has not elapsed the call is
    /// rejected immediately.  If the timeout *has* elapsed the circuit moves
    /// to **HalfOpen** and the call is allowed through.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.guard().await?;

        // --- execute with timeout ---
        let result = tokio::time::timeout(self.config.call_timeout, f()).await;

        match result {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(e.to_string()))
            }
            Err(_elapsed) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Timeout(self.config.call_timeout))
            }
        }
    }

    // ----- helpers -----

    async fn record_success(&self) {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        match guard.state {
            CircuitState::HalfOpen => {
                guard.half_open_in_flight = guard.half_open_in_flight.saturating_sub(1);
                guard.half_open_successes += 1;
                if guard.half_open_successes >= self.config.success_threshold {
                    info!("circuit breaker transitioning HalfOpen -> Closed");
                    guard.state = CircuitState::Closed;
                    guard.half_open_successes = 0;
                    guard.half_open_in_flight = 0;
                    guard.events.clear();
                }
            }
            CircuitState::Closed => {
                guard.events.push_back((now, false));
                guard.prune(now, self.config.rolling_window);
            }
            CircuitState::Open => { /* shouldn't happen */ }
        }
    }

    /// Opens the circuit on `failure count >= threshold OR (samples >= 10
    /// AND failure ratio > 50%)` within the rolling window (§4.B) — the
    /// ratio condition catches a provider that is failing roughly half the
    /// time without ever reaching `failure_threshold` consecutive failures.
    async fn record_failure(&self) {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        guard.last_failure_time = Some(now);

        match guard.state {
            CircuitState::Closed => {
                guard.events.push_back((now, true));
                guard.prune(now, self.config.rolling_window);
                let (failures, samples) = guard.window_counts();
                let ratio_tripped = samples >= self.config.min_samples_for_ratio
                    && (failures as f64 / samples as f64) > self.config.failure_ratio_threshold;

                if failures >= self.config.failure_threshold || ratio_tripped {
                    warn!(
                        failures,
                        samples, ratio_tripped, "circuit breaker transitioning Closed -> Open"
                    );
                    guard.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker transitioning HalfOpen -> Open (failure during probe)");
                guard.state = CircuitState::Open;
                guard.half_open_successes = 0;
                guard.half_open_in_flight = 0;
                guard.events.clear();
            }
            CircuitState::Open => { /* already open */ }
        }
    }

    /// Manually reset the circuit breaker to the **Closed** state.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.state = CircuitState::Closed;
        guard.events.clear();
        guard.half_open_successes = 0;
        guard.half_open_in_flight = 0;
        guard.last_failure_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_failures_trip_on_absolute_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            min_samples_for_ratio: 100,
            ..CircuitBreakerConfig::default()
        });
        for _ in 0..2 {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn ratio_condition_trips_before_absolute_threshold_with_enough_samples() {
        // threshold unreachable (20), but 6/10 failures (60%) crosses the
        // 50% ratio condition once min_samples_for_ratio is met.
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 20,
            min_samples_for_ratio: 10,
            failure_ratio_threshold: 0.5,
            ..CircuitBreakerConfig::default()
        });

        for _ in 0..4 {
            breaker.on_success().await;
        }
        for _ in 0..5 {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed, "only 9 samples so far");

        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open, "6/10 failures crosses the 50% ratio");
    }

    #[tokio::test]
    async fn ratio_condition_does_not_trip_below_minimum_sample_count() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 20,
            min_samples_for_ratio: 10,
            failure_ratio_threshold: 0.5,
            ..CircuitBreakerConfig::default()
        });

        // 3/3 failures is a 100% ratio but only 3 samples, below the floor.
        for _ in 0..3 {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_millis(10),
            ..CircuitBreakerConfig::default()
        });
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.guard().await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(10),
            ..CircuitBreakerConfig::default()
        });
        breaker.on_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.guard().await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.on_success().await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.on_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_on_single_probe_success_by_default() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_millis(10),
            ..CircuitBreakerConfig::default()
        });
        breaker.on_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        breaker.guard().await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.on_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_admits_at_most_three_concurrent_probes() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_millis(10),
            ..CircuitBreakerConfig::default()
        });
        breaker.on_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // First guard() call transitions Open -> HalfOpen and consumes a
        // probe slot; two more are admitted, a fourth is rejected.
        breaker.guard().await.unwrap();
        breaker.guard().await.unwrap();
        breaker.guard().await.unwrap();
        assert!(matches!(breaker.guard().await, Err(CircuitBreakerError::Open)));
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn reset_clears_window_and_state() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
    }
}
