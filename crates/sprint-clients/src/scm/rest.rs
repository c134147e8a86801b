//! The SCM REST path (§4.C): commits, basic PR listings, and default
//! branch metadata via `octocrab`. Used directly for commits always, and
//! for PR listing as a fallback when no GraphQL token is configured.

use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use octocrab::params::State as OctocrabState;
use sprint_core::issue_keys::extract_issue_keys;
use sprint_core::types::{Commit, CommitAuthor, PrState, PullRequest};

use crate::error::UpstreamError;

pub async fn get_commits(
    octocrab: &Octocrab,
    owner: &str,
    repo: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    max_pages: u32,
) -> Result<Vec<Commit>, UpstreamError> {
    let mut out = Vec::new();
    let mut page_handler = octocrab
        .repos(owner, repo)
        .list_commits()
        .since(since)
        .per_page(100)
        .send()
        .await?;

    let mut pages_seen = 0;
    loop {
        for item in &page_handler.items {
            let committed_at = item
                .commit
                .author
                .as_ref()
                .and_then(|a| a.date)
                .unwrap_or(since);
            if committed_at > until {
                continue;
            }
            if committed_at < since {
                return Ok(out);
            }

            let message = item.commit.message.clone();
            out.push(Commit {
                sha: item.sha.clone(),
                issue_keys: extract_issue_keys(&message),
                message,
                author: CommitAuthor {
                    name: item
                        .commit
                        .author
                        .as_ref()
                        .and_then(|a| a.name.clone())
                        .unwrap_or_default(),
                    email: item
                        .commit
                        .author
                        .as_ref()
                        .and_then(|a| a.email.clone())
                        .unwrap_or_default(),
                    login: item.author.as_ref().map(|a| a.login.clone()),
                },
                committed_at,
                url: item.html_url.clone(),
                additions: item.stats.as_ref().map(|s| s.additions),
                deletions: item.stats.as_ref().map(|s| s.deletions),
            });
        }

        pages_seen += 1;
        if pages_seen >= max_pages {
            break;
        }

        match octocrab.get_page(&page_handler.next).await? {
            Some(next) => page_handler = next,
            None => break,
        }
    }

    Ok(out)
}

/// REST fallback for date-bounded PR discovery: lists PRs sorted by
/// creation date descending and filters client-side, since the REST
/// listing endpoint has no native date filter (§4.C).
pub async fn list_pull_requests_in_window(
    octocrab: &Octocrab,
    owner: &str,
    repo: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<PullRequest>, UpstreamError> {
    let mut out = Vec::new();
    let mut page = octocrab
        .pulls(owner, repo)
        .list()
        .state(OctocrabState::All)
        .sort(octocrab::params::pulls::Sort::Created)
        .direction(octocrab::params::Direction::Descending)
        .per_page(100)
        .send()
        .await?;

    'pages: loop {
        for pr in &page.items {
            if pr.created_at.map(|c| c < since).unwrap_or(false) {
                break 'pages;
            }
            if pr.created_at.map(|c| c > until).unwrap_or(true) {
                continue;
            }
            out.push(to_domain_pr(pr));
        }

        match octocrab.get_page(&page.next).await? {
            Some(next) => page = next,
            None => break,
        }
    }

    Ok(out)
}

pub fn to_domain_pr(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    let body = pr.body.clone();
    let title = pr.title.clone().unwrap_or_default();
    let mut issue_keys = extract_issue_keys(&title);
    if let Some(b) = &body {
        for key in extract_issue_keys(b) {
            if !issue_keys.contains(&key) {
                issue_keys.push(key);
            }
        }
    }

    PullRequest {
        number: pr.number,
        title,
        body,
        state: if pr.merged_at.is_some() {
            PrState::Merged
        } else {
            match pr.state {
                Some(octocrab::models::IssueState::Open) => PrState::Open,
                _ => PrState::Closed,
            }
        },
        author: pr.user.as_ref().map(|u| u.login.clone()).unwrap_or_default(),
        created_at: pr.created_at.unwrap_or_else(Utc::now),
        updated_at: pr.updated_at.unwrap_or_else(Utc::now),
        merged_at: pr.merged_at,
        closed_at: pr.closed_at,
        additions: pr.additions.unwrap_or(0),
        deletions: pr.deletions.unwrap_or(0),
        files_changed: pr.changed_files.unwrap_or(0),
        commits: pr.commits.unwrap_or(0),
        reviews: Vec::new(),
        comments: pr.comments.unwrap_or(0),
        labels: pr
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.name)
            .collect(),
        assignees: pr
            .assignees
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.login)
            .collect(),
        issue_keys,
        enhanced: false,
    }
}
