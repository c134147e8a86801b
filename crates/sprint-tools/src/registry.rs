//! Tool dispatch (§4.E): name lookup, schema validation, per-tool quota,
//! deadline-bounded handler execution, and response-envelope assembly.
//!
//! Tools are registered once at construction and looked up by name; dispatch
//! is a single match over the fourteen known names, with the transport
//! (JSON-RPC, stdio, or otherwise) left to whatever embeds this registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sprint_core::config::AggregationConfig;
use sprint_core::error::EngineError;
use sprint_resilience::rate_limiter::{RateLimitConfig, RateLimitError, RateLimiter};
use tracing::{info, warn};

use crate::context::ToolContext;
use crate::envelope::{ToolError, ToolResponse};
use crate::handlers;
use crate::schema::{tool_definitions, ToolDefinition};

/// Wall-clock ceiling for a single tool invocation (§5), independent of the
/// per-tool quota and of any individual upstream call's own deadline.
const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(60);

const DEFAULT_QUOTA_PER_MINUTE: u32 = 30;

pub struct ToolRegistry {
    definitions: HashMap<String, ToolDefinition>,
    /// One rate limiter bucket per tool name, keyed by tool name per the
    /// spec's "per-tool, per-window bucket" quota (§4.E); reuses
    /// `sprint_resilience::RateLimiter` rather than a bespoke mechanism.
    quotas: DashMap<String, Arc<RateLimiter>>,
    config: AggregationConfig,
}

impl ToolRegistry {
    pub fn new(config: AggregationConfig) -> Self {
        let definitions = tool_definitions()
            .into_iter()
            .map(|def| (def.name.to_string(), def))
            .collect();
        Self {
            definitions,
            quotas: DashMap::new(),
            config,
        }
    }

    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        self.definitions.values().collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    fn quota_for(&self, tool_name: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.quotas.get(tool_name) {
            return limiter.clone();
        }
        let per_minute = self
            .config
            .tool
            .get(tool_name)
            .map(|t| t.quota_per_minute)
            .unwrap_or(DEFAULT_QUOTA_PER_MINUTE);
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(per_minute as u64)));
        self.quotas.insert(tool_name.to_string(), limiter.clone());
        limiter
    }

    /// Dispatch one tool call: lookup → schema validation → quota acquire →
    /// deadline-bounded handler execution → response envelope (§4.E).
    /// Thread-safe and idempotent per invocation (§9): repeated calls with
    /// identical input produce the same observable result modulo upstream
    /// state and cache TTL.
    pub async fn invoke(&self, ctx: &ToolContext, tool_name: &str, input: serde_json::Value) -> ToolResponse {
        let started = Instant::now();

        let Some(definition) = self.definitions.get(tool_name) else {
            return ToolResponse::failed(
                tool_name,
                ToolError::not_found(format!("unknown tool `{tool_name}`")),
                elapsed_ms(started),
            );
        };

        let violations = crate::validate::validate(&definition.input_schema, &input);
        if !violations.is_empty() {
            return ToolResponse::failed(
                tool_name,
                ToolError::validation(violations),
                elapsed_ms(started),
            );
        }

        if let Err(RateLimitError::Exceeded { retry_after, .. }) = self.quota_for(tool_name).check(tool_name) {
            warn!(tool = tool_name, retry_after_ms = retry_after.as_millis() as u64, "tool quota exceeded");
            return ToolResponse::failed(
                tool_name,
                ToolError::rate_limit_exceeded(format!(
                    "quota exceeded for `{tool_name}`, retry after {}ms",
                    retry_after.as_millis()
                )),
                elapsed_ms(started),
            );
        }

        let outcome = tokio::time::timeout(DEFAULT_TOOL_DEADLINE, dispatch(ctx, tool_name, &input)).await;

        let response = match outcome {
            Ok(Ok(result)) => ToolResponse::ok(tool_name, result, elapsed_ms(started)),
            Ok(Err(err)) => ToolResponse::failed(tool_name, ToolError::from_engine_error(&err), elapsed_ms(started)),
            Err(_elapsed) => ToolResponse::failed(
                tool_name,
                ToolError {
                    kind: "UpstreamTimeout".to_string(),
                    message: format!("`{tool_name}` exceeded its {}s deadline", DEFAULT_TOOL_DEADLINE.as_secs()),
                    details: None,
                },
                elapsed_ms(started),
            ),
        };

        info!(tool = tool_name, success = response.success, duration_ms = response.duration_ms, "tool invocation complete");
        response
    }
}

async fn dispatch(ctx: &ToolContext, tool_name: &str, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    match tool_name {
        "search_boards" => handlers::search_boards(ctx, input).await,
        "get_sprints" => handlers::get_sprints(ctx, input).await,
        "get_sprint_issues" => handlers::get_sprint_issues(ctx, input).await,
        "get_issue_details" => handlers::get_issue_details(ctx, input).await,
        "search_issues_jql" => handlers::search_issues_jql(ctx, input).await,
        "get_commits" => handlers::get_commits(ctx, input).await,
        "get_pull_requests" => handlers::get_pull_requests(ctx, input).await,
        "search_commits_by_message" => handlers::search_commits_by_message(ctx, input).await,
        "find_commits_with_issue_refs" => handlers::find_commits_with_issue_refs(ctx, input).await,
        "generate_sprint_report" => handlers::generate_sprint_report(ctx, input).await,
        "generate_comprehensive_report" => handlers::generate_comprehensive_report(ctx, input).await,
        "get_sprint_metrics" => handlers::get_sprint_metrics(ctx, input).await,
        "health_check" => handlers::health_check(ctx, input).await,
        "cache_stats" => handlers::cache_stats(ctx, input).await,
        other => Err(EngineError::Internal {
            debug: format!("tool `{other}` is registered but has no dispatcher arm"),
        }),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
