//! Handler implementations for the fourteen required tools (§4.E): thin
//! parameter-shaping wrappers over `sprint-clients` and `sprint-aggregator`.
//! The registry owns dispatch, quota, and error enhancement; a handler's
//! only job is to turn validated JSON into a typed call and back.

use chrono::{DateTime, Utc};
use sprint_aggregator::ReportRequest;
use sprint_core::error::EngineError;
use sprint_core::issue_keys::extract_issue_keys;
use sprint_core::types::SprintState;

use crate::context::ToolContext;

fn str_field<'a>(input: &'a serde_json::Value, field: &str) -> Result<&'a str, EngineError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::Validation(format!("missing required field `{field}`")))
}

fn parse_instant(input: &serde_json::Value, field: &str) -> Result<DateTime<Utc>, EngineError> {
    let raw = str_field(input, field)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Validation(format!("`{field}` is not a valid RFC3339 instant: {e}")))
}

fn fields_of(input: &serde_json::Value) -> Option<Vec<String>> {
    input.get("fields").and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn scm_of(ctx: &ToolContext) -> Result<&std::sync::Arc<sprint_clients::scm::ScmClient>, EngineError> {
    ctx.scm
        .as_ref()
        .ok_or_else(|| EngineError::Validation("SCM is not configured for this deployment".to_string()))
}

pub async fn search_boards(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let query = input.get("query").and_then(|v| v.as_str());
    let limit = input.get("limit").and_then(|v| v.as_u64()).map(|n| n as u32);
    let boards = ctx.tracker.list_boards(query, limit).await?;
    Ok(serde_json::json!({ "boards": boards, "count": boards.len() }))
}

pub async fn get_sprints(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let board_id = str_field(input, "board_id")?;
    let state = match input.get("state").and_then(|v| v.as_str()) {
        Some("active") | None => SprintState::Active,
        Some("future") => SprintState::Future,
        Some("closed") => SprintState::Closed,
        Some(other) => return Err(EngineError::Validation(format!("unknown sprint state `{other}`"))),
    };
    let sprints = ctx.tracker.list_sprints(board_id, state).await?;
    Ok(serde_json::json!({ "sprints": sprints, "count": sprints.len() }))
}

pub async fn get_sprint_issues(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let sprint_id = str_field(input, "sprint_id")?;
    let fields = fields_of(input);
    let field_refs: Option<Vec<&str>> = fields.as_ref().map(|f| f.iter().map(String::as_str).collect());
    let max_results = input.get("max_results").and_then(|v| v.as_u64()).unwrap_or(100) as u32;
    let issues = ctx
        .tracker
        .list_sprint_issues(sprint_id, field_refs.as_deref(), max_results)
        .await?;
    Ok(serde_json::json!({ "issues": issues, "count": issues.len() }))
}

pub async fn get_issue_details(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let key = str_field(input, "key")?;
    let expand = input.get("expand_changelog").and_then(|v| v.as_bool()).unwrap_or(false);
    let issue = ctx.tracker.get_issue_details(key, expand).await?;
    serde_json::to_value(issue).map_err(|e| EngineError::Internal { debug: e.to_string() })
}

pub async fn search_issues_jql(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let jql = str_field(input, "jql")?;
    let fields = fields_of(input);
    let field_refs: Option<Vec<&str>> = fields.as_ref().map(|f| f.iter().map(String::as_str).collect());
    let max_results = input.get("max_results").and_then(|v| v.as_u64()).map(|n| n as u32);
    let issues = ctx.tracker.search_issues(jql, field_refs.as_deref(), max_results).await?;
    Ok(serde_json::json!({ "issues": issues, "count": issues.len() }))
}

pub async fn get_commits(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let scm = scm_of(ctx)?;
    let owner = str_field(input, "owner")?;
    let repo = str_field(input, "repo")?;
    let since = parse_instant(input, "since")?;
    let until = parse_instant(input, "until")?;
    let max_pages = input.get("max_pages").and_then(|v| v.as_u64()).unwrap_or(10) as u32;
    let commits = scm.get_commits(owner, repo, since, until, max_pages).await?;
    Ok(serde_json::json!({ "commits": commits, "count": commits.len() }))
}

pub async fn get_pull_requests(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let scm = scm_of(ctx)?;
    let owner = str_field(input, "owner")?;
    let repo = str_field(input, "repo")?;
    let since = parse_instant(input, "since")?;
    let until = parse_instant(input, "until")?;
    let (prs, truncated) = scm.get_pull_requests_in_window(owner, repo, since, until).await?;
    Ok(serde_json::json!({
        "pull_requests": prs,
        "count": prs.len(),
        "truncated": truncated,
    }))
}

pub async fn search_commits_by_message(
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let scm = scm_of(ctx)?;
    let owner = str_field(input, "owner")?;
    let repo = str_field(input, "repo")?;
    let since = parse_instant(input, "since")?;
    let until = parse_instant(input, "until")?;
    let query = str_field(input, "query")?.to_ascii_lowercase();

    let commits = scm.get_commits(owner, repo, since, until, 10).await?;
    let matched: Vec<_> = commits
        .into_iter()
        .filter(|c| c.message.to_ascii_lowercase().contains(&query))
        .collect();
    Ok(serde_json::json!({ "commits": matched, "count": matched.len() }))
}

pub async fn find_commits_with_issue_refs(
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let scm = scm_of(ctx)?;
    let owner = str_field(input, "owner")?;
    let repo = str_field(input, "repo")?;
    let since = parse_instant(input, "since")?;
    let until = parse_instant(input, "until")?;

    let mut commits = scm.get_commits(owner, repo, since, until, 10).await?;
    for commit in &mut commits {
        if commit.issue_keys.is_empty() {
            commit.issue_keys = extract_issue_keys(&commit.message);
        }
    }
    let matched: Vec<_> = commits.into_iter().filter(|c| !c.issue_keys.is_empty()).collect();
    Ok(serde_json::json!({ "commits": matched, "count": matched.len() }))
}

pub async fn generate_sprint_report(
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let sprint_id = str_field(input, "sprint_id")?;
    let mut request = ReportRequest::new(sprint_id);
    request.owner = input.get("owner").and_then(|v| v.as_str()).map(String::from);
    request.repo = input.get("repo").and_then(|v| v.as_str()).map(String::from);
    request.no_cache = input.get("no_cache").and_then(|v| v.as_bool()).unwrap_or(false);

    let report = ctx.aggregator.generate_report(&request).await?;
    serde_json::to_value(report).map_err(|e| EngineError::Internal { debug: e.to_string() })
}

pub async fn generate_comprehensive_report(
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let sprint_id = str_field(input, "sprint_id")?;
    let flag = |name: &str| input.get(name).and_then(|v| v.as_bool()).unwrap_or(false);

    let mut request = ReportRequest::new(sprint_id);
    request.owner = input.get("owner").and_then(|v| v.as_str()).map(String::from);
    request.repo = input.get("repo").and_then(|v| v.as_str()).map(String::from);
    request.include_tier1 = flag("include_tier1");
    request.include_tier2 = flag("include_tier2");
    request.include_tier3 = flag("include_tier3");
    request.include_forward_looking = flag("include_forward_looking");
    request.include_enhanced_scm = flag("include_enhanced_scm");
    request.no_cache = flag("no_cache");

    let report = ctx.aggregator.generate_report(&request).await?;
    serde_json::to_value(report).map_err(|e| EngineError::Internal { debug: e.to_string() })
}

pub async fn get_sprint_metrics(ctx: &ToolContext, input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let sprint_id = str_field(input, "sprint_id")?;
    let sprint = ctx.tracker.get_sprint(sprint_id).await?;
    let issues = ctx.tracker.list_sprint_issues(&sprint.id, None, 500).await?;
    let metrics = sprint_aggregator::metrics::compute_metrics(&sprint, &issues);
    serde_json::to_value(metrics).map_err(|e| EngineError::Internal { debug: e.to_string() })
}

pub async fn health_check(ctx: &ToolContext, _input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let tracker_state = format!("{:?}", ctx.circuits.for_provider("tracker").state().await);
    let providers = if ctx.scm.is_some() {
        let scm_state = format!("{:?}", ctx.circuits.for_provider("scm").state().await);
        serde_json::json!({ "tracker": { "circuit": tracker_state }, "scm": { "circuit": scm_state } })
    } else {
        serde_json::json!({ "tracker": { "circuit": tracker_state }, "scm": { "configured": false } })
    };

    let stats = ctx.cache.stats();
    Ok(serde_json::json!({
        "status": "ok",
        "providers": providers,
        "cache": {
            "entries": stats.entries,
            "hits": stats.hits,
            "misses": stats.misses,
        },
    }))
}

pub async fn cache_stats(ctx: &ToolContext, _input: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let stats = ctx.cache.stats();
    Ok(serde_json::json!({
        "entries": stats.entries,
        "hits": stats.hits,
        "misses": stats.misses,
        "sets": stats.sets,
        "evictions": stats.evictions,
        "errors": stats.errors,
        "hitRate": stats.hit_rate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_instant_rejects_non_rfc3339() {
        let input = json!({ "since": "not-a-date" });
        let err = parse_instant(&input, "since").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn parse_instant_accepts_rfc3339() {
        let input = json!({ "since": "2025-08-06T00:00:00Z" });
        assert!(parse_instant(&input, "since").is_ok());
    }

    #[test]
    fn fields_of_extracts_string_array() {
        let input = json!({ "fields": ["summary", "status"] });
        assert_eq!(fields_of(&input), Some(vec!["summary".to_string(), "status".to_string()]));
    }

    #[test]
    fn fields_of_none_when_absent() {
        assert_eq!(fields_of(&json!({})), None);
    }
}
