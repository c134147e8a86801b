//! The SCM GraphQL path (§4.C): date-bounded PR search. Preferred over the
//! REST fallback whenever a GraphQL token is configured, since REST
//! pagination has no native date index.

use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::Deserialize;
use serde_json::json;
use sprint_core::issue_keys::extract_issue_keys;
use sprint_core::types::{PrState, PullRequest};

use crate::error::UpstreamError;

const PAGE_SIZE: u32 = 100;
/// §8 boundary behaviour: more than 1000 PRs in a GraphQL window is capped,
/// with the cap noted in the report's `metadata.warnings`.
pub const MAX_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Debug, Deserialize)]
struct SearchConnection {
    nodes: Vec<GraphQlPullRequest>,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    author: Option<GraphQlActor>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
    #[serde(rename = "mergedAt")]
    merged_at: Option<DateTime<Utc>>,
    #[serde(rename = "closedAt")]
    closed_at: Option<DateTime<Utc>>,
    additions: u64,
    deletions: u64,
    #[serde(rename = "changedFiles")]
    changed_files: u64,
    commits: GraphQlCount,
    comments: GraphQlCount,
    labels: GraphQlLabelConnection,
    assignees: GraphQlLoginConnection,
}

#[derive(Debug, Deserialize)]
struct GraphQlActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlCount {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct GraphQlLabelConnection {
    nodes: Vec<GraphQlLabel>,
}

#[derive(Debug, Deserialize)]
struct GraphQlLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlLoginConnection {
    nodes: Vec<GraphQlActor>,
}

const QUERY: &str = r#"
query($search: String!, $cursor: String) {
  search(query: $search, type: ISSUE, first: 100, after: $cursor) {
    nodes {
      ... on PullRequest {
        number
        title
        body
        state
        author { login }
        createdAt
        updatedAt
        mergedAt
        closedAt
        additions
        deletions
        changedFiles
        commits { totalCount }
        comments { totalCount }
        labels(first: 20) { nodes { name } }
        assignees(first: 20) { nodes { login } }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

/// `search(query: "repo:O/R is:pr created:S..E", type: ISSUE, first: 100,
/// after: $cursor)`, auto-paginated up to [`MAX_RESULTS`].
pub async fn search_pull_requests_in_window(
    octocrab: &Octocrab,
    owner: &str,
    repo: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<(Vec<PullRequest>, bool), UpstreamError> {
    let search_query = format!(
        "repo:{owner}/{repo} is:pr created:{}..{}",
        since.format("%Y-%m-%d"),
        until.format("%Y-%m-%d"),
    );

    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    let mut truncated = false;

    loop {
        let body = json!({
            "query": QUERY,
            "variables": { "search": search_query, "cursor": cursor },
        });

        let response: SearchResponse = octocrab
            .graphql(&body)
            .await
            .map_err(UpstreamError::from)?;

        let connection = response.data.search;
        let page_len = connection.nodes.len();
        for node in connection.nodes {
            out.push(to_domain_pr(node));
            if out.len() >= MAX_RESULTS {
                truncated = true;
                break;
            }
        }

        if truncated || !connection.page_info.has_next_page || page_len < PAGE_SIZE as usize {
            break;
        }
        cursor = connection.page_info.end_cursor;
        if cursor.is_none() {
            break;
        }
    }

    Ok((out, truncated))
}

fn to_domain_pr(node: GraphQlPullRequest) -> PullRequest {
    let mut issue_keys = extract_issue_keys(&node.title);
    if let Some(body) = &node.body {
        for key in extract_issue_keys(body) {
            if !issue_keys.contains(&key) {
                issue_keys.push(key);
            }
        }
    }

    PullRequest {
        number: node.number,
        title: node.title,
        body: node.body,
        state: if node.merged_at.is_some() {
            PrState::Merged
        } else if node.state.eq_ignore_ascii_case("open") {
            PrState::Open
        } else {
            PrState::Closed
        },
        author: node.author.map(|a| a.login).unwrap_or_default(),
        created_at: node.created_at,
        updated_at: node.updated_at,
        merged_at: node.merged_at,
        closed_at: node.closed_at,
        additions: node.additions,
        deletions: node.deletions,
        files_changed: node.changed_files,
        commits: node.commits.total_count,
        reviews: Vec::new(),
        comments: node.comments.total_count,
        labels: node.labels.nodes.into_iter().map(|l| l.name).collect(),
        assignees: node.assignees.nodes.into_iter().map(|a| a.login).collect(),
        issue_keys,
        enhanced: false,
    }
}
