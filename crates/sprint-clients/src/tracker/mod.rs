//! The issue-tracker REST client (§4.C "Tracker client"): boards, sprints,
//! issues, and JQL search against a Jira-like Agile REST API.

mod wire;

use std::sync::Arc;

use sprint_core::error::EngineError;
use sprint_core::types::{BoardInfo, Issue, Sprint, SprintState};

use crate::error::UpstreamError;
use crate::pipeline::RequestPipeline;

const PROVIDER: &str = "tracker";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub token: String,
}

pub struct TrackerClient {
    http: reqwest::Client,
    config: TrackerConfig,
    pipeline: Arc<RequestPipeline>,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig, pipeline: Arc<RequestPipeline>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            pipeline,
        }
    }

    /// `GET /rest/agile/1.0/board?name=&projectKeyOrId=` — search boards by
    /// name or id/project key.
    pub async fn list_boards(
        &self,
        query: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<BoardInfo>, EngineError> {
        let limit = limit.unwrap_or(50);
        let cache_key = format!("tracker:boards:{}:{limit}", query.unwrap_or("*"));
        let url = self.url("rest/agile/1.0/board");
        let http = self.http.clone();
        let token = self.config.token.clone();
        let query = query.map(str::to_string);

        let response: wire::BoardSearchResponse = self
            .pipeline
            .execute(
                PROVIDER,
                "list_boards",
                Some(&cache_key),
                Some(600),
                1.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    let query = query.clone();
                    async move {
                        let mut req = http.get(&url).bearer_auth(&token).query(&[("maxResults", "50")]);
                        if let Some(q) = &query {
                            req = req.query(&[("name", q)]);
                        }
                        let resp = req.send().await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(response.values.into_iter().map(BoardInfo::from).collect())
    }

    /// `GET /rest/agile/1.0/sprint/{sprintId}` — a single sprint descriptor,
    /// the entry point for report generation (§4.D: the sprint fetch blocks
    /// the rest of the fan-out).
    pub async fn get_sprint(&self, sprint_id: &str) -> Result<Sprint, EngineError> {
        let cache_key = format!("sprint:{sprint_id}");
        let url = self.url(&format!("rest/agile/1.0/sprint/{sprint_id}"));
        let http = self.http.clone();
        let token = self.config.token.clone();

        let response: wire::WireSprint = self
            .pipeline
            .execute(
                PROVIDER,
                "get_sprint",
                Some(&cache_key),
                Some(120),
                1.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    async move {
                        let resp = http.get(&url).bearer_auth(&token).send().await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(Sprint::from(response))
    }

    /// `GET /rest/agile/1.0/board/{boardId}/sprint?state=` — closed sprints
    /// are paginated upstream; this client follows `startAt` until the
    /// server reports `isLast`.
    pub async fn list_sprints(
        &self,
        board_id: &str,
        state: SprintState,
    ) -> Result<Vec<Sprint>, EngineError> {
        let state_str = match state {
            SprintState::Active => "active",
            SprintState::Future => "future",
            SprintState::Closed => "closed",
        };
        let cache_key = format!("board:{board_id}:sprints:{state_str}");
        let ttl = match state {
            SprintState::Active => 300,
            SprintState::Future => 900,
            SprintState::Closed => 1800,
        };
        let url = self.url(&format!("rest/agile/1.0/board/{board_id}/sprint"));
        let http = self.http.clone();
        let token = self.config.token.clone();
        let state_str = state_str.to_string();

        let response: wire::SprintSearchResponse = self
            .pipeline
            .execute(
                PROVIDER,
                "list_sprints",
                Some(&cache_key),
                Some(ttl),
                1.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    let state_str = state_str.clone();
                    async move {
                        let resp = http
                            .get(&url)
                            .bearer_auth(&token)
                            .query(&[("state", state_str.as_str())])
                            .send()
                            .await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(response.values.into_iter().map(Sprint::from).collect())
    }

    /// `GET /rest/agile/1.0/sprint/{sprintId}/issue` — issues for a sprint,
    /// with `fields` projected as requested (changelog expansion is left to
    /// [`TrackerClient::get_issue_details`]).
    pub async fn list_sprint_issues(
        &self,
        sprint_id: &str,
        fields: Option<&[&str]>,
        max_results: u32,
    ) -> Result<Vec<Issue>, EngineError> {
        let fields_str = fields.map(|f| f.join(",")).unwrap_or_default();
        let cache_key = format!("sprint:{sprint_id}:issues:{fields_str}:{max_results}");
        let url = self.url(&format!("rest/agile/1.0/sprint/{sprint_id}/issue"));
        let http = self.http.clone();
        let token = self.config.token.clone();
        let max_results = max_results.max(1).to_string();

        let response: wire::IssueSearchResponse = self
            .pipeline
            .execute(
                PROVIDER,
                "list_sprint_issues",
                Some(&cache_key),
                Some(300),
                1.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    let fields_str = fields_str.clone();
                    let max_results = max_results.clone();
                    async move {
                        let mut req = http
                            .get(&url)
                            .bearer_auth(&token)
                            .query(&[("maxResults", max_results.as_str())]);
                        if !fields_str.is_empty() {
                            req = req.query(&[("fields", fields_str.as_str())]);
                        }
                        let resp = req.send().await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(response.issues.into_iter().map(Issue::from).collect())
    }

    /// `GET /rest/api/2/issue/{key}` — a single issue, with changelog when
    /// `expand_changelog` is set (needed for cycle time / burndown).
    pub async fn get_issue_details(
        &self,
        key: &str,
        expand_changelog: bool,
    ) -> Result<Issue, EngineError> {
        let key = normalize_issue_key(key);
        let cache_key = format!("issue:{key}:{expand_changelog}");
        let url = self.url(&format!("rest/api/2/issue/{key}"));
        let http = self.http.clone();
        let token = self.config.token.clone();

        let response: wire::WireIssue = self
            .pipeline
            .execute(
                PROVIDER,
                "get_issue_details",
                Some(&cache_key),
                Some(120),
                1.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    async move {
                        let mut req = http.get(&url).bearer_auth(&token);
                        if expand_changelog {
                            req = req.query(&[("expand", "changelog")]);
                        }
                        let resp = req.send().await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(Issue::from(response))
    }

    /// `GET /rest/api/2/search?jql=` — JQL must be sanitized before it
    /// leaves this client (§4.C).
    pub async fn search_issues(
        &self,
        jql: &str,
        fields: Option<&[&str]>,
        max_results: Option<u32>,
    ) -> Result<Vec<Issue>, EngineError> {
        let jql = sanitize_jql(jql)?;
        let fields_str = fields.map(|f| f.join(",")).unwrap_or_default();
        let max_results = max_results.unwrap_or(50);
        let cache_key = format!("tracker:search:{jql}:{fields_str}:{max_results}");
        let url = self.url("rest/api/2/search");
        let http = self.http.clone();
        let token = self.config.token.clone();
        let jql_owned = jql.clone();
        let max_results_str = max_results.to_string();

        let response: wire::IssueSearchResponse = self
            .pipeline
            .execute(
                PROVIDER,
                "search_issues",
                Some(&cache_key),
                Some(120),
                2.0,
                move || {
                    let http = http.clone();
                    let token = token.clone();
                    let url = url.clone();
                    let jql = jql_owned.clone();
                    let fields_str = fields_str.clone();
                    let max_results_str = max_results_str.clone();
                    async move {
                        let mut req = http
                            .get(&url)
                            .bearer_auth(&token)
                            .query(&[("jql", jql.as_str()), ("maxResults", max_results_str.as_str())]);
                        if !fields_str.is_empty() {
                            req = req.query(&[("fields", fields_str.as_str())]);
                        }
                        let resp = req.send().await?;
                        parse_json(resp).await
                    }
                },
            )
            .await?;

        Ok(response.issues.into_iter().map(Issue::from).collect())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Guarantees an uppercase project prefix in canonical `PROJ-NUM` form,
/// regardless of the casing a caller passed in.
pub fn normalize_issue_key(key: &str) -> String {
    match key.split_once('-') {
        Some((prefix, num)) => format!("{}-{}", prefix.to_ascii_uppercase(), num),
        None => key.to_ascii_uppercase(),
    }
}

/// Reject JQL containing mutation keywords or script-invocation tokens
/// before it reaches the upstream search endpoint (§4.C).
fn sanitize_jql(jql: &str) -> Result<String, EngineError> {
    let lowered = jql.to_ascii_lowercase();
    const BANNED: &[&str] = &["delete", "drop", "exec(", "eval(", "javascript:", "<script"];
    for token in BANNED {
        if lowered.contains(token) {
            return Err(EngineError::Validation(format!(
                "jql contains disallowed token `{token}`"
            )));
        }
    }
    Ok(jql.to_string())
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, UpstreamError> {
    let status = resp.status();
    if !status.is_success() {
        let retry_after = crate::error::parse_retry_after(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        return Err(match status.as_u16() {
            401 | 403 => UpstreamError::Auth(body),
            404 => UpstreamError::NotFound,
            429 => UpstreamError::RateLimited { retry_after },
            400..=499 => UpstreamError::BadRequest(body),
            _ => UpstreamError::Server(body),
        });
    }
    resp.json::<T>().await.map_err(UpstreamError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_lowercase_prefix() {
        assert_eq!(normalize_issue_key("proj-123"), "PROJ-123");
        assert_eq!(normalize_issue_key("PROJ-123"), "PROJ-123");
    }

    #[test]
    fn rejects_delete_and_drop() {
        assert!(sanitize_jql("project = X").is_ok());
        assert!(sanitize_jql("project = X; DELETE FROM issues").is_err());
        assert!(sanitize_jql("drop table issues").is_err());
    }

    #[test]
    fn rejects_script_invocation_tokens() {
        assert!(sanitize_jql("summary ~ \"<script>alert(1)</script>\"").is_err());
        assert!(sanitize_jql("summary ~ \"javascript:alert(1)\"").is_err());
    }
}
