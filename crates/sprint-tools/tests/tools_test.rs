use std::sync::Arc;

use sprint_aggregator::AggregationService;
use sprint_cache::CacheEngine;
use sprint_clients::tracker::{TrackerClient, TrackerConfig};
use sprint_clients::RequestPipeline;
use sprint_core::config::{AggregationConfig, RetryConfig};
use sprint_resilience::registry::{CircuitBreakerRegistry, RateLimiterRegistry};
use sprint_tools::{ToolContext, ToolRegistry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_context(tracker_base: &str) -> ToolContext {
    let config = AggregationConfig::default();
    let cache = Arc::new(CacheEngine::new(1000, 300));
    let pipeline = Arc::new(RequestPipeline::new(
        cache.clone(),
        Arc::new(RateLimiterRegistry::new(config.clone())),
        Arc::new(CircuitBreakerRegistry::new(config.clone())),
        RetryConfig::default(),
    ));
    let circuits = Arc::new(CircuitBreakerRegistry::new(config.clone()));
    let tracker = Arc::new(TrackerClient::new(
        TrackerConfig {
            base_url: tracker_base.to_string(),
            token: "test-token".into(),
        },
        pipeline,
    ));
    let aggregator = Arc::new(AggregationService::new(tracker.clone(), None, cache.clone(), &config));

    ToolContext {
        cache,
        tracker,
        scm: None,
        aggregator,
        circuits,
        config,
    }
}

#[tokio::test]
async fn get_sprints_round_trips_through_the_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board/7/sprint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "values": [
                {"id": 44318, "name": "Sprint 80", "state": "active",
                 "startDate": "2025-08-06T00:00:00Z", "endDate": "2025-08-20T00:00:00Z",
                 "completeDate": null, "goal": null, "originBoardId": 7}
            ]
        })))
        .mount(&server)
        .await;

    let ctx = build_context(&server.uri());
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry
        .invoke(&ctx, "get_sprints", serde_json::json!({ "board_id": "7", "state": "active" }))
        .await;

    assert!(response.success);
    let result = response.result.unwrap();
    assert_eq!(result["count"], 1);
}

#[tokio::test]
async fn missing_required_field_fails_validation_without_reaching_the_handler() {
    let ctx = build_context("http://127.0.0.1:0");
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry.invoke(&ctx, "get_sprints", serde_json::json!({})).await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.kind, "ValidationError");
}

#[tokio::test]
async fn unknown_tool_name_returns_not_found() {
    let ctx = build_context("http://127.0.0.1:0");
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry.invoke(&ctx, "delete_everything", serde_json::json!({})).await;

    assert!(!response.success);
    assert_eq!(response.error.unwrap().kind, "NotFound");
}

#[tokio::test]
async fn health_check_reports_circuit_state_without_scm_configured() {
    let ctx = build_context("http://127.0.0.1:0");
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry.invoke(&ctx, "health_check", serde_json::json!({})).await;

    assert!(response.success);
    let result = response.result.unwrap();
    assert_eq!(result["providers"]["scm"]["configured"], false);
}

#[tokio::test]
async fn cache_stats_reflects_prior_activity() {
    let ctx = build_context("http://127.0.0.1:0");
    ctx.cache.set("k", serde_json::json!(1), None).await;
    ctx.cache.get("k").await;
    ctx.cache.get("missing").await;
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry.invoke(&ctx, "cache_stats", serde_json::json!({})).await;

    assert!(response.success);
    let result = response.result.unwrap();
    assert_eq!(result["hits"], 1);
    assert_eq!(result["misses"], 1);
}

#[tokio::test]
async fn jql_with_mutation_keyword_is_rejected_by_the_client_before_any_request() {
    let ctx = build_context("http://127.0.0.1:0");
    let registry = ToolRegistry::new(ctx.config.clone());

    let response = registry
        .invoke(
            &ctx,
            "search_issues_jql",
            serde_json::json!({ "jql": "project = X; DELETE FROM issues" }),
        )
        .await;

    assert!(!response.success);
    assert_eq!(response.error.unwrap().kind, "ValidationError");
}
