//! Issue↔commit↔PR correlation via issue-key matching (§4.D).
//!
//! No graph structure is persisted (§9 design notes): the inverse index is
//! rebuilt per request from flat commit/PR arrays.

use std::collections::HashMap;

use sprint_core::types::{
    Commit, CodeChangeStats, CommitActivity, EnhancedGitHub, IssueReferences, PrState,
    PullRequest, PullRequestStats, ReviewStats, Traceability,
};

use crate::metrics::ratio;

pub fn correlate(commits: &[Commit], pull_requests: &[PullRequest]) -> Traceability {
    let mut issue_index: HashMap<String, IssueReferences> = HashMap::new();

    for commit in commits {
        for key in &commit.issue_keys {
            issue_index.entry(key.clone()).or_default().commits.push(commit.sha.clone());
        }
    }
    for pr in pull_requests {
        for key in &pr.issue_keys {
            issue_index
                .entry(key.clone())
                .or_default()
                .pull_requests
                .push(pr.number);
        }
    }

    let prs_with_keys = pull_requests.iter().filter(|pr| !pr.issue_keys.is_empty()).count() as u64;
    let pr_traceability_rate = ratio(prs_with_keys, pull_requests.len() as u64);

    Traceability {
        pr_traceability_rate,
        issue_index,
    }
}

/// SCM-derived statistics block included when `includeEnhancedSCM` is set.
pub fn enhanced_github_stats(commits: &[Commit], pull_requests: &[PullRequest]) -> EnhancedGitHub {
    EnhancedGitHub {
        commit_activity: commit_activity(commits),
        pull_request_stats: pull_request_stats(pull_requests),
        code_changes: code_change_stats(pull_requests),
        review_stats: review_stats(pull_requests),
        traceability: correlate(commits, pull_requests),
    }
}

fn commit_activity(commits: &[Commit]) -> CommitActivity {
    let mut authors: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut additions = 0u64;
    let mut deletions = 0u64;
    for commit in commits {
        authors.insert(
            commit
                .author
                .login
                .as_deref()
                .unwrap_or(commit.author.email.as_str()),
        );
        additions += commit.additions.unwrap_or(0);
        deletions += commit.deletions.unwrap_or(0);
    }
    CommitActivity {
        total_commits: commits.len() as u64,
        unique_authors: authors.len() as u64,
        additions,
        deletions,
    }
}

fn pull_request_stats(prs: &[PullRequest]) -> PullRequestStats {
    let total_prs = prs.len() as u64;
    let merged: Vec<&PullRequest> = prs.iter().filter(|pr| pr.state == PrState::Merged).collect();
    let merged_prs = merged.len() as u64;
    let merge_rate = ratio(merged_prs, total_prs);

    let average_time_to_merge_hours = if merged.is_empty() {
        None
    } else {
        let total_hours: f64 = merged
            .iter()
            .filter_map(|pr| pr.merged_at.map(|m| m.signed_duration_since(pr.created_at)))
            .map(|d| d.num_minutes() as f64 / 60.0)
            .sum();
        Some(total_hours / merged.len() as f64)
    };

    PullRequestStats {
        total_prs,
        merged_prs,
        merge_rate,
        average_time_to_merge_hours,
    }
}

fn code_change_stats(prs: &[PullRequest]) -> CodeChangeStats {
    CodeChangeStats {
        additions: prs.iter().map(|pr| pr.additions).sum(),
        deletions: prs.iter().map(|pr| pr.deletions).sum(),
        files_changed: prs.iter().map(|pr| pr.files_changed).sum(),
    }
}

fn review_stats(prs: &[PullRequest]) -> ReviewStats {
    let total_reviews: u64 = prs.iter().map(|pr| pr.reviews.len() as u64).sum();
    let average_reviews_per_pr = if prs.is_empty() {
        0.0
    } else {
        total_reviews as f64 / prs.len() as f64
    };
    ReviewStats {
        total_reviews,
        average_reviews_per_pr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sprint_core::types::CommitAuthor;

    fn commit(sha: &str, issue_keys: Vec<&str>) -> Commit {
        Commit {
            sha: sha.into(),
            message: "x".into(),
            author: CommitAuthor {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                login: Some("alice".into()),
            },
            committed_at: Utc::now(),
            url: "https://example.com".into(),
            additions: Some(10),
            deletions: Some(2),
            issue_keys: issue_keys.into_iter().map(String::from).collect(),
        }
    }

    fn pr(number: u64, issue_keys: Vec<&str>, state: PrState) -> PullRequest {
        PullRequest {
            number,
            title: "x".into(),
            body: None,
            state,
            author: "bob".into(),
            created_at: Utc::now() - chrono::Duration::hours(4),
            updated_at: Utc::now(),
            merged_at: if state == PrState::Merged { Some(Utc::now()) } else { None },
            closed_at: None,
            additions: 5,
            deletions: 1,
            files_changed: 2,
            commits: 1,
            reviews: vec![],
            comments: 0,
            labels: vec![],
            assignees: vec![],
            issue_keys: issue_keys.into_iter().map(String::from).collect(),
            enhanced: false,
        }
    }

    #[test]
    fn builds_inverse_index_from_commits_and_prs() {
        let commits = vec![commit("sha1", vec!["PROJ-1"])];
        let prs = vec![pr(1, vec!["PROJ-1"], PrState::Merged)];
        let traceability = correlate(&commits, &prs);
        let refs = traceability.issue_index.get("PROJ-1").unwrap();
        assert_eq!(refs.commits, vec!["sha1".to_string()]);
        assert_eq!(refs.pull_requests, vec![1]);
        assert_eq!(traceability.pr_traceability_rate, 1.0);
    }

    #[test]
    fn traceability_rate_counts_only_prs_with_keys() {
        let prs = vec![pr(1, vec!["PROJ-1"], PrState::Merged), pr(2, vec![], PrState::Open)];
        let traceability = correlate(&[], &prs);
        assert_eq!(traceability.pr_traceability_rate, 0.5);
    }

    #[test]
    fn zero_prs_yields_zero_stats_without_panicking() {
        let stats = pull_request_stats(&[]);
        assert_eq!(stats.total_prs, 0);
        assert_eq!(stats.merge_rate, 0.0);
        assert_eq!(stats.average_time_to_merge_hours, None);
    }
}
