//! Configuration contract for the aggregation engine (§6): cache sizing,
//! per-provider rate limits and circuit breaker thresholds, retry policy,
//! aggregator tuning, and per-tool quotas.

use crate::tier::TierRules;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub tool: HashMap<String, ToolConfig>,
    #[serde(default)]
    pub tier_rules: TierRules,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitConfig::default(),
            retry: RetryConfig::default(),
            aggregator: AggregatorConfig::default(),
            tool: HashMap::new(),
            tier_rules: TierRules::default(),
        }
    }
}

impl AggregationConfig {
    /// Load config from `~/.sprint-report/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: AggregationConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rate limit settings for a named provider (`"tracker"`, `"scm"`),
    /// falling back to the config's blanket default when the provider has
    /// no entry of its own.
    pub fn rate_limit_for(&self, provider: &str) -> ProviderRateLimit {
        self.rate_limit
            .providers
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.rate_limit.default.clone())
    }

    /// Circuit breaker settings for a named provider.
    pub fn circuit_for(&self, provider: &str) -> ProviderCircuit {
        self.circuit
            .providers
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.circuit.default.clone())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sprint-report")
            .join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// cache.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub memory: MemoryCacheConfig,
    #[serde(default)]
    pub distributed: DistributedCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryCacheConfig::default(),
            distributed: DistributedCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_max_entries() -> usize {
    50_000
}
fn default_ttl_seconds() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedCacheConfig {
    /// `None` disables the distributed tier entirely, falling back to the
    /// in-process `NullDistributedCache`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for DistributedCacheConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            deadline_ms: default_deadline_ms(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    2_000
}

// ---------------------------------------------------------------------------
// rate_limit.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub default: ProviderRateLimit,
    #[serde(default)]
    pub providers: HashMap<String, ProviderRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: ProviderRateLimit::default(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRateLimit {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for ProviderRateLimit {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            burst: default_burst(),
        }
    }
}

fn default_per_minute() -> u32 {
    100
}
fn default_burst() -> u32 {
    20
}

// ---------------------------------------------------------------------------
// circuit.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default)]
    pub default: ProviderCircuit,
    #[serde(default)]
    pub providers: HashMap<String, ProviderCircuit>,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            default: ProviderCircuit::default(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCircuit {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for ProviderCircuit {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_ms() -> u64 {
    60_000
}

// ---------------------------------------------------------------------------
// retry.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

// ---------------------------------------------------------------------------
// aggregator.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_pr_enhancement_cap")]
    pub pr_enhancement_cap: usize,
    #[serde(default = "default_pr_enhancement_batch_size")]
    pub pr_enhancement_batch_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            pr_enhancement_cap: default_pr_enhancement_cap(),
            pr_enhancement_batch_size: default_pr_enhancement_batch_size(),
        }
    }
}

fn default_pr_enhancement_cap() -> usize {
    15
}
fn default_pr_enhancement_batch_size() -> usize {
    5
}

// ---------------------------------------------------------------------------
// tool.<name>.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_tool_quota_per_minute")]
    pub quota_per_minute: u32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            quota_per_minute: default_tool_quota_per_minute(),
        }
    }
}

fn default_tool_quota_per_minute() -> u32 {
    30
}
