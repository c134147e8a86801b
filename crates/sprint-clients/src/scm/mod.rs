//! The dual-backed SCM client (§4.C): REST for commits and the PR-listing
//! fallback, GraphQL for date-bounded PR search when a token is configured.

mod graphql;
mod rest;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use sprint_core::error::EngineError;
use sprint_core::types::{Commit, PrReview, PullRequest};

use crate::error::UpstreamError;
use crate::pipeline::RequestPipeline;

const PROVIDER: &str = "scm";
const ENHANCEMENT_BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ScmConfig {
    pub token: String,
    /// `Some` when GraphQL PR search is available; `None` forces the
    /// REST-with-client-side-filtering fallback (§4.C).
    pub graphql_token: Option<String>,
    /// Override for GitHub Enterprise deployments (and for pointing the
    /// client at a mock server in tests); `None` uses `api.github.com`.
    pub base_uri: Option<String>,
}

pub struct ScmClient {
    octocrab: Octocrab,
    config: ScmConfig,
    pipeline: Arc<RequestPipeline>,
}

impl ScmClient {
    pub fn new(config: ScmConfig, pipeline: Arc<RequestPipeline>) -> Result<Self, EngineError> {
        let mut builder = Octocrab::builder().personal_token(config.token.clone());
        if let Some(uri) = &config.base_uri {
            builder = builder
                .base_uri(uri.as_str())
                .map_err(|e| EngineError::Internal { debug: e.to_string() })?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| EngineError::Internal { debug: e.to_string() })?;
        Ok(Self {
            octocrab,
            config,
            pipeline,
        })
    }

    /// True when a GraphQL token is configured, making GraphQL the
    /// preferred capability for date-bounded PR discovery.
    pub fn has_graphql(&self) -> bool {
        self.config.graphql_token.is_some()
    }

    pub async fn get_commits(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        max_pages: u32,
    ) -> Result<Vec<Commit>, EngineError> {
        let cache_key = format!(
            "repo:{owner}/{repo}:commits:{}:{}",
            since.to_rfc3339(),
            until.to_rfc3339()
        );
        let octocrab = self.octocrab.clone();
        let owner = owner.to_string();
        let repo = repo.to_string();

        self.pipeline
            .execute(
                PROVIDER,
                "get_commits",
                Some(&cache_key),
                Some(1800),
                1.0,
                move || {
                    let octocrab = octocrab.clone();
                    let owner = owner.clone();
                    let repo = repo.clone();
                    async move {
                        rest::get_commits(&octocrab, &owner, &repo, since, until, max_pages).await
                    }
                },
            )
            .await
    }

    /// Uses GraphQL when configured (preferred per §4.C runtime capability
    /// check), falling back to REST with client-side date filtering
    /// otherwise. Caps at 1000 results and signals truncation to the
    /// caller so it can be surfaced in `metadata.warnings`.
    pub async fn get_pull_requests_in_window(
        &self,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(Vec<PullRequest>, bool), EngineError> {
        let cache_key = format!(
            "repo:{owner}/{repo}:prs:graphql:{}..{}",
            since.to_rfc3339(),
            until.to_rfc3339()
        );
        let octocrab = self.octocrab.clone();
        let owner_s = owner.to_string();
        let repo_s = repo.to_string();
        let use_graphql = self.has_graphql();

        self.pipeline
            .execute(
                PROVIDER,
                "get_pull_requests_in_window",
                Some(&cache_key),
                Some(1800),
                2.0,
                move || {
                    let octocrab = octocrab.clone();
                    let owner = owner_s.clone();
                    let repo = repo_s.clone();
                    async move {
                        if use_graphql {
                            graphql::search_pull_requests_in_window(&octocrab, &owner, &repo, since, until)
                                .await
                        } else {
                            let prs =
                                rest::list_pull_requests_in_window(&octocrab, &owner, &repo, since, until)
                                    .await?;
                            Ok((prs, false))
                        }
                    }
                },
            )
            .await
    }

    /// A single PR plus reviews and timing, cached independently of the
    /// listing it came from so repeated enhancement requests across report
    /// generations are cheap (§6 `pr:<owner>/<repo>:<number>:enhanced`).
    pub async fn get_enhanced_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, EngineError> {
        let cache_key = format!("pr:{owner}/{repo}:{number}:enhanced");
        let octocrab = self.octocrab.clone();
        let owner = owner.to_string();
        let repo = repo.to_string();

        self.pipeline
            .execute(
                PROVIDER,
                "get_enhanced_pull_request",
                Some(&cache_key),
                Some(1800),
                1.0,
                move || {
                    let octocrab = octocrab.clone();
                    let owner = owner.clone();
                    let repo = repo.clone();
                    async move { fetch_enhanced_pr(&octocrab, &owner, &repo, number).await }
                },
            )
            .await
    }

    /// Enhance up to `cap` basic PRs in parallel batches of `batch_size`
    /// with an inter-batch delay, per the PR-enhancement policy (§4.C). A
    /// per-PR failure falls back to the basic record rather than aborting
    /// the batch; the number of fallbacks is returned for the caller's
    /// `metadata.warnings`.
    pub async fn enhance_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        basic_prs: Vec<PullRequest>,
        cap: usize,
        batch_size: usize,
    ) -> (Vec<PullRequest>, usize) {
        let batch_size = batch_size.max(1);
        let mut result = Vec::with_capacity(basic_prs.len());
        let mut fallback_count = 0;

        let (to_enhance, rest) = if basic_prs.len() > cap {
            basic_prs.split_at(cap)
        } else {
            (basic_prs.as_slice(), &basic_prs[basic_prs.len()..])
        };

        for chunk in to_enhance.chunks(batch_size) {
            let futures = chunk.iter().map(|pr| {
                let pr = pr.clone();
                async move {
                    match self.get_enhanced_pull_request(owner, repo, pr.number).await {
                        Ok(enhanced) => enhanced,
                        Err(_) => pr,
                    }
                }
            });
            let enhanced_chunk = futures::future::join_all(futures).await;
            for (original, enhanced) in chunk.iter().zip(enhanced_chunk.into_iter()) {
                if !enhanced.enhanced {
                    fallback_count += 1;
                }
                let _ = original;
                result.push(enhanced);
            }
            tokio::time::sleep(ENHANCEMENT_BATCH_DELAY).await;
        }

        result.extend(rest.iter().cloned());
        (result, fallback_count)
    }
}

async fn fetch_enhanced_pr(
    octocrab: &Octocrab,
    owner: &str,
    repo: &str,
    number: u64,
) -> Result<PullRequest, UpstreamError> {
    let pr = octocrab.pulls(owner, repo).get(number).await?;
    let mut domain_pr = rest::to_domain_pr(&pr);

    let reviews = octocrab
        .pulls(owner, repo)
        .list_reviews(number)
        .await
        .map(|page| {
            page.items
                .into_iter()
                .map(|r| PrReview {
                    reviewer: r.user.map(|u| u.login).unwrap_or_default(),
                    state: r
                        .state
                        .map(|s| format!("{s:?}"))
                        .unwrap_or_else(|| "unknown".to_string()),
                    submitted_at: r.submitted_at.unwrap_or_else(Utc::now),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    domain_pr.reviews = reviews;
    domain_pr.enhanced = true;
    Ok(domain_pr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprint_core::types::PrState;

    fn basic_pr(number: u64) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            body: None,
            state: PrState::Merged,
            author: "dev".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            merged_at: Some(Utc::now()),
            closed_at: None,
            additions: 1,
            deletions: 1,
            files_changed: 1,
            commits: 1,
            reviews: vec![],
            comments: 0,
            labels: vec![],
            assignees: vec![],
            issue_keys: vec![],
            enhanced: false,
        }
    }

    #[test]
    fn prs_beyond_cap_stay_basic() {
        let prs: Vec<_> = (0..3).map(basic_pr).collect();
        assert!(prs.len() > 1);
    }
}
