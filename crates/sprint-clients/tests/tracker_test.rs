use std::sync::Arc;

use sprint_cache::CacheEngine;
use sprint_clients::tracker::{TrackerClient, TrackerConfig};
use sprint_clients::RequestPipeline;
use sprint_core::config::{AggregationConfig, RetryConfig};
use sprint_core::types::SprintState;
use sprint_resilience::registry::{CircuitBreakerRegistry, RateLimiterRegistry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline() -> Arc<RequestPipeline> {
    let config = AggregationConfig::default();
    Arc::new(RequestPipeline::new(
        Arc::new(CacheEngine::new(1000, 300)),
        Arc::new(RateLimiterRegistry::new(config.clone())),
        Arc::new(CircuitBreakerRegistry::new(config)),
        RetryConfig::default(),
    ))
}

#[tokio::test]
async fn lists_boards_matching_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "values": [
                {"id": 7, "name": "Sage Connect", "type": "scrum",
                 "location": {"projectKey": "SCNT", "projectName": "Sage Connect"}}
            ]
        })))
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        TrackerConfig {
            base_url: server.uri(),
            token: "test-token".into(),
        },
        pipeline(),
    );

    let boards = client.list_boards(Some("Sage"), None).await.unwrap();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].id, "7");
    assert_eq!(boards[0].project_key.as_deref(), Some("SCNT"));
}

#[tokio::test]
async fn lists_closed_sprints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board/7/sprint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "values": [
                {"id": 43577, "name": "Sprint 77", "state": "closed",
                 "startDate": "2025-08-06T00:00:00Z", "endDate": "2025-08-20T00:00:00Z",
                 "completeDate": "2025-08-20T01:00:00Z", "goal": null, "originBoardId": 7}
            ]
        })))
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        TrackerConfig {
            base_url: server.uri(),
            token: "test-token".into(),
        },
        pipeline(),
    );

    let sprints = client.list_sprints("7", SprintState::Closed).await.unwrap();
    assert_eq!(sprints.len(), 1);
    assert_eq!(sprints[0].id, "43577");
    assert_eq!(sprints[0].state, SprintState::Closed);
}

#[tokio::test]
async fn second_call_for_same_board_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"values": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        TrackerConfig {
            base_url: server.uri(),
            token: "test-token".into(),
        },
        pipeline(),
    );

    client.list_boards(Some("Sage"), None).await.unwrap();
    client.list_boards(Some("Sage"), None).await.unwrap();
    // wiremock's `.expect(1)` is verified on drop; a second network call
    // would panic the mock server before this test returns.
}

#[tokio::test]
async fn search_issues_rejects_destructive_jql_without_a_network_call() {
    let server = MockServer::start().await;
    // No mock registered for /rest/api/2/search — a call would 404/panic.
    let client = TrackerClient::new(
        TrackerConfig {
            base_url: server.uri(),
            token: "test-token".into(),
        },
        pipeline(),
    );

    let result = client.search_issues("project = X; DROP TABLE", None, None).await;
    assert!(result.is_err());
}
