//! Shared context handed to every tool handler (§4.E): the cache, the
//! upstream clients, and the aggregator the handlers are thin wrappers
//! over. The registry owns quotas; handlers never see them.

use std::sync::Arc;

use sprint_aggregator::AggregationService;
use sprint_cache::CacheEngine;
use sprint_clients::scm::ScmClient;
use sprint_clients::TrackerClient;
use sprint_core::config::AggregationConfig;
use sprint_resilience::registry::CircuitBreakerRegistry;

#[derive(Clone)]
pub struct ToolContext {
    pub cache: Arc<CacheEngine>,
    pub tracker: Arc<TrackerClient>,
    pub scm: Option<Arc<ScmClient>>,
    pub aggregator: Arc<AggregationService>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    pub config: AggregationConfig,
}
