//! The sprint report orchestrator (§4.D): fetches the sprint descriptor,
//! fans out the independent upstream calls concurrently, correlates and
//! computes metrics, and packages the result — recovering from a down SCM
//! but treating a down tracker as fatal.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sprint_cache::CacheEngine;
use sprint_clients::scm::ScmClient;
use sprint_clients::TrackerClient;
use sprint_core::config::AggregationConfig;
use sprint_core::error::EngineError;
use sprint_core::tier::TierRules;
use sprint_core::types::{
    Issue, ReportMetadata, Sprint, SprintReport, SprintState, SprintVelocityPoint, TeamMemberPerformance,
    TeamPerformanceReport,
};

use crate::burndown::compute_burndown;
use crate::correlation::enhanced_github_stats;
use crate::forward_looking::build_forward_looking;
use crate::metrics::compute_metrics;
use crate::request::ReportRequest;
use crate::velocity::build_velocity_report;

const MAX_ISSUES_PER_SPRINT: u32 = 500;
const COMMIT_MAX_PAGES: u32 = 10;
const HISTORICAL_SPRINT_COUNT: usize = 5;
/// `teamPerformance(boardId, lastN=1)` (§4.D): team performance looks only
/// at the immediately preceding closed sprint by default.
const HISTORICAL_TEAM_PERF_COUNT: usize = 1;

pub struct AggregationService {
    tracker: Arc<TrackerClient>,
    scm: Option<Arc<ScmClient>>,
    cache: Arc<CacheEngine>,
    tier_rules: TierRules,
    pr_enhancement_cap: usize,
    pr_enhancement_batch_size: usize,
}

impl AggregationService {
    pub fn new(
        tracker: Arc<TrackerClient>,
        scm: Option<Arc<ScmClient>>,
        cache: Arc<CacheEngine>,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            tracker,
            scm,
            cache,
            tier_rules: config.tier_rules.clone(),
            pr_enhancement_cap: config.aggregator.pr_enhancement_cap,
            pr_enhancement_batch_size: config.aggregator.pr_enhancement_batch_size,
        }
    }

    pub async fn generate_report(&self, request: &ReportRequest) -> Result<SprintReport, EngineError> {
        let started = Instant::now();
        let cache_key = request.cache_key();

        if !request.no_cache {
            if let Some(cached) = self.cache.get(&cache_key).await {
                if let Ok(report) = serde_json::from_value::<SprintReport>(cached) {
                    return Ok(report);
                }
            }
        }

        let hits_before = self.cache.stats().hits;

        // FETCHING_SPRINT — required, blocks the rest of the fan-out (§4.D
        // state machine); tracker failure here is fatal.
        let sprint = self.tracker.get_sprint(&request.sprint_id).await?;

        // FANNING_OUT — independent calls issued concurrently.
        let issues_fut = self
            .tracker
            .list_sprint_issues(&sprint.id, None, MAX_ISSUES_PER_SPRINT);
        let velocity_fut = self.historical_velocity(&sprint.board_id, HISTORICAL_SPRINT_COUNT);
        let scm_fut = self.fetch_scm_data(request, &sprint);
        let team_perf_fut = self.team_performance(&sprint.board_id, HISTORICAL_TEAM_PERF_COUNT);

        let (issues_result, velocity_result, scm_result, team_perf_result) =
            tokio::join!(issues_fut, velocity_fut, scm_fut, team_perf_fut);

        let mut issues = issues_result?;
        let mut warnings = Vec::new();

        let velocity_points = match velocity_result {
            Ok(points) => points,
            Err(e) => {
                warnings.push(format!("historical velocity unavailable: {}", e.user_message()));
                Vec::new()
            }
        };

        let team_performance = match team_perf_result {
            Ok(report) => Some(report),
            Err(e) => {
                warnings.push(format!("team performance unavailable: {}", e.user_message()));
                None
            }
        };

        let (commits, pull_requests, scm_warnings) = scm_result;
        warnings.extend(scm_warnings);

        // CORRELATING — runs only after issues/commits/PRs are all in hand
        // (joint barrier, §5).
        for issue in &mut issues {
            issue.tier = self.tier_rules.classify(issue);
        }

        // COMPUTING
        let metrics = compute_metrics(&sprint, &issues);
        let velocity = build_velocity_report(velocity_points.clone());
        let burndown = compute_burndown(&sprint, &issues);

        let enhanced_github = if request.include_enhanced_scm && self.scm.is_some() {
            Some(enhanced_github_stats(&commits, &pull_requests))
        } else {
            None
        };

        let forward_looking = if request.include_forward_looking {
            let history: Vec<f64> = velocity_points.iter().map(|p| p.velocity).collect();
            let available_capacity = if history.is_empty() {
                0.0
            } else {
                history.iter().sum::<f64>() / history.len() as f64
            };
            Some(build_forward_looking(&sprint, &issues, &history, available_capacity))
        } else {
            None
        };

        let (tier1, tier2, tier3) = partition_tiers(&issues, request);

        let cache_hits = self.cache.stats().hits.saturating_sub(hits_before);

        let report = SprintReport {
            sprint: sprint.clone(),
            metrics,
            tier1_issues: tier1,
            tier2_issues: tier2,
            tier3_issues: tier3,
            commits,
            pull_requests,
            velocity,
            burndown,
            enhanced_github,
            forward_looking,
            team_performance,
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                generator_version: env!("CARGO_PKG_VERSION").to_string(),
                cache_hits,
                upstream_latency_ms: started.elapsed().as_millis() as u64,
                warnings,
            },
        };

        // PACKAGED — cache the freshly generated report at the TTL implied
        // by the sprint's own state (§4.D caching strategy).
        if let Ok(json) = serde_json::to_value(&report) {
            self.cache.set(cache_key, json, Some(report_ttl(sprint.state))).await;
        }

        Ok(report)
    }

    /// Commits and PR listing/enhancement for the report's SCM section.
    /// Returns empty data plus a warning rather than failing the whole
    /// report when SCM is unconfigured or its circuit is open (§7
    /// propagation policy: SCM `CircuitOpen` is non-fatal).
    async fn fetch_scm_data(
        &self,
        request: &ReportRequest,
        sprint: &Sprint,
    ) -> (Vec<sprint_core::types::Commit>, Vec<sprint_core::types::PullRequest>, Vec<String>) {
        let mut warnings = Vec::new();

        let scm = match (&self.scm, request.has_scm_target()) {
            (Some(scm), true) => scm,
            _ => {
                warnings.push("SCM not configured".to_string());
                return (Vec::new(), Vec::new(), warnings);
            }
        };

        let owner = request.owner.as_deref().unwrap_or_default();
        let repo = request.repo.as_deref().unwrap_or_default();
        let (start, end) = match (sprint.start_date, sprint.end_date) {
            (Some(s), Some(e)) => (s, e),
            _ => (Utc::now() - chrono::Duration::days(14), Utc::now()),
        };

        let (commits_result, prs_result) = tokio::join!(
            scm.get_commits(owner, repo, start, end, COMMIT_MAX_PAGES),
            scm.get_pull_requests_in_window(owner, repo, start, end)
        );

        let commits = match commits_result {
            Ok(commits) => commits,
            Err(EngineError::CircuitOpen { provider }) if provider == "scm" => {
                warnings.push("SCM circuit open".to_string());
                Vec::new()
            }
            Err(e) => {
                warnings.push(format!("commits unavailable: {}", e.user_message()));
                Vec::new()
            }
        };

        let (basic_prs, truncated) = match prs_result {
            Ok(v) => v,
            Err(EngineError::CircuitOpen { provider }) if provider == "scm" => {
                if !warnings.iter().any(|w| w == "SCM circuit open") {
                    warnings.push("SCM circuit open".to_string());
                }
                (Vec::new(), false)
            }
            Err(e) => {
                warnings.push(format!("pull requests unavailable: {}", e.user_message()));
                (Vec::new(), false)
            }
        };
        if truncated {
            warnings.push("pull request search truncated at 1000 results".to_string());
        }

        // Enhanced PR data (reviews + timing) is required for closed sprints
        // and whenever the caller explicitly asked for it (§3 PullRequest).
        let pull_requests = if !basic_prs.is_empty() && (sprint.state == SprintState::Closed || request.include_enhanced_scm) {
            let (enhanced, fallback_count) = scm
                .enhance_pull_requests(owner, repo, basic_prs, self.pr_enhancement_cap, self.pr_enhancement_batch_size)
                .await;
            if fallback_count > 0 {
                warnings.push(format!("{fallback_count} pull request(s) fell back to basic data"));
            }
            enhanced
        } else {
            basic_prs
        };

        (commits, pull_requests, warnings)
    }

    /// Velocity points for up to the last `last_n` closed sprints on
    /// `board_id`, oldest first.
    async fn historical_velocity(
        &self,
        board_id: &str,
        last_n: usize,
    ) -> Result<Vec<SprintVelocityPoint>, EngineError> {
        let mut closed = self.tracker.list_sprints(board_id, SprintState::Closed).await?;
        closed.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        let recent: Vec<Sprint> = closed
            .into_iter()
            .rev()
            .take(last_n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let fetches = recent.iter().map(|sprint| {
            let tracker = self.tracker.clone();
            let sprint = sprint.clone();
            async move {
                let issues = tracker
                    .list_sprint_issues(&sprint.id, None, MAX_ISSUES_PER_SPRINT)
                    .await?;
                Ok::<_, EngineError>(sprint_to_velocity_point(&sprint, &issues))
            }
        });

        futures::future::join_all(fetches)
            .await
            .into_iter()
            .collect()
    }

    /// `teamPerformance(boardId, lastN)` (§4.D): per-assignee completion
    /// counts, story points, and mean cycle time across the last `last_n`
    /// closed sprints on `board_id`. Unassigned issues are grouped under
    /// `"unassigned"` rather than dropped.
    async fn team_performance(&self, board_id: &str, last_n: usize) -> Result<TeamPerformanceReport, EngineError> {
        let mut closed = self.tracker.list_sprints(board_id, SprintState::Closed).await?;
        closed.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        let recent: Vec<Sprint> = closed
            .into_iter()
            .rev()
            .take(last_n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let fetches = recent.iter().map(|sprint| {
            let tracker = self.tracker.clone();
            let sprint_id = sprint.id.clone();
            async move {
                let issues = tracker
                    .list_sprint_issues(&sprint_id, None, MAX_ISSUES_PER_SPRINT)
                    .await?;
                Ok::<_, EngineError>((sprint_id, issues))
            }
        });

        let results: Vec<Result<(String, Vec<Issue>), EngineError>> = futures::future::join_all(fetches).await;
        let per_sprint: Vec<(String, Vec<Issue>)> = results.into_iter().collect::<Result<_, _>>()?;

        Ok(summarize_team_performance(per_sprint))
    }
}

#[derive(Default)]
struct AssigneeAccumulator {
    completed_issues: u64,
    completed_story_points: f64,
    cycle_time_hours_sum: f64,
    cycle_time_samples: u64,
}

/// Pure aggregation step behind [`AggregationService::team_performance`]:
/// groups completed issues by assignee across the given `(sprint_id,
/// issues)` pairs. Unassigned issues are grouped under `"unassigned"`
/// rather than dropped.
fn summarize_team_performance(per_sprint: Vec<(String, Vec<Issue>)>) -> TeamPerformanceReport {
    let mut sprints_considered = Vec::with_capacity(per_sprint.len());
    let mut by_assignee: std::collections::HashMap<String, AssigneeAccumulator> = std::collections::HashMap::new();

    for (sprint_id, issues) in per_sprint {
        sprints_considered.push(sprint_id);
        for issue in &issues {
            if !issue.is_completed() {
                continue;
            }
            let assignee = issue.assignee.clone().unwrap_or_else(|| "unassigned".to_string());
            let acc = by_assignee.entry(assignee).or_default();
            acc.completed_issues += 1;
            acc.completed_story_points += issue.story_points.unwrap_or(0.0);
            if let Some(resolved) = issue.resolved {
                let hours = (resolved - issue.created).num_minutes() as f64 / 60.0;
                if hours >= 0.0 {
                    acc.cycle_time_hours_sum += hours;
                    acc.cycle_time_samples += 1;
                }
            }
        }
    }

    let mut members: Vec<TeamMemberPerformance> = by_assignee
        .into_iter()
        .map(|(assignee, acc)| TeamMemberPerformance {
            assignee,
            completed_issues: acc.completed_issues,
            completed_story_points: acc.completed_story_points,
            average_cycle_time_hours: if acc.cycle_time_samples > 0 {
                Some(acc.cycle_time_hours_sum / acc.cycle_time_samples as f64)
            } else {
                None
            },
        })
        .collect();
    members.sort_by(|a, b| a.assignee.cmp(&b.assignee));

    TeamPerformanceReport { sprints_considered, members }
}

fn sprint_to_velocity_point(sprint: &Sprint, issues: &[Issue]) -> SprintVelocityPoint {
    let commitment: f64 = issues.iter().filter_map(|i| i.story_points).sum();
    let completed: f64 = issues
        .iter()
        .filter(|i| i.is_completed())
        .filter_map(|i| i.story_points)
        .sum();
    SprintVelocityPoint {
        id: sprint.id.clone(),
        name: sprint.name.clone(),
        commitment,
        completed,
        velocity: completed,
    }
}

fn partition_tiers(issues: &[Issue], request: &ReportRequest) -> (Vec<Issue>, Vec<Issue>, Vec<Issue>) {
    use sprint_core::types::Tier;
    let tier1 = if request.include_tier1 {
        issues.iter().filter(|i| i.tier == Some(Tier::T1)).cloned().collect()
    } else {
        Vec::new()
    };
    let tier2 = if request.include_tier2 {
        issues.iter().filter(|i| i.tier == Some(Tier::T2)).cloned().collect()
    } else {
        Vec::new()
    };
    let tier3 = if request.include_tier3 {
        issues.iter().filter(|i| i.tier == Some(Tier::T3)).cloned().collect()
    } else {
        Vec::new()
    };
    (tier1, tier2, tier3)
}

fn report_ttl(state: SprintState) -> u64 {
    match state {
        SprintState::Active => 300,
        SprintState::Closed => 1800,
        SprintState::Future => 900,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_ttl_matches_state_policy() {
        assert_eq!(report_ttl(SprintState::Active), 300);
        assert_eq!(report_ttl(SprintState::Closed), 1800);
        assert_eq!(report_ttl(SprintState::Future), 900);
    }

    fn issue(key: &str, tier: Option<sprint_core::types::Tier>) -> Issue {
        Issue {
            key: key.into(),
            id: key.into(),
            summary: "x".into(),
            status: "Open".into(),
            issue_type: "Story".into(),
            priority: None,
            assignee: None,
            reporter: None,
            story_points: None,
            created: Utc::now(),
            updated: Utc::now(),
            resolved: None,
            sprint_id: None,
            labels: vec![],
            components: vec![],
            epic_link: None,
            parent_key: None,
            tier,
            transitions: vec![],
        }
    }

    #[test]
    fn partition_tiers_respects_inclusion_flags() {
        use sprint_core::types::Tier;
        let issues = vec![
            issue("A", Some(Tier::T1)),
            issue("B", Some(Tier::T2)),
            issue("C", Some(Tier::T3)),
        ];
        let mut request = ReportRequest::new("1");
        request.include_tier1 = true;
        let (t1, t2, t3) = partition_tiers(&issues, &request);
        assert_eq!(t1.len(), 1);
        assert_eq!(t2.len(), 0);
        assert_eq!(t3.len(), 0);
    }

    #[test]
    fn summarize_team_performance_groups_completed_issues_by_assignee() {
        let mut a1 = issue("A-1", None);
        a1.status = "Done".into();
        a1.assignee = Some("alice".into());
        a1.story_points = Some(3.0);
        a1.created = Utc::now() - chrono::Duration::hours(10);
        a1.resolved = Some(Utc::now());

        let mut a2 = issue("A-2", None);
        a2.status = "Done".into();
        a2.assignee = Some("alice".into());
        a2.story_points = Some(2.0);

        let mut b1 = issue("B-1", None);
        b1.status = "Open".into();
        b1.assignee = Some("bob".into());

        let mut unassigned = issue("U-1", None);
        unassigned.status = "Done".into();
        unassigned.story_points = Some(1.0);

        let report = summarize_team_performance(vec![(
            "sprint-1".to_string(),
            vec![a1, a2, b1, unassigned],
        )]);

        assert_eq!(report.sprints_considered, vec!["sprint-1".to_string()]);
        assert_eq!(report.members.len(), 2);

        let alice = report.members.iter().find(|m| m.assignee == "alice").unwrap();
        assert_eq!(alice.completed_issues, 2);
        assert_eq!(alice.completed_story_points, 5.0);
        assert!(alice.average_cycle_time_hours.unwrap() > 0.0);

        let unassigned_member = report.members.iter().find(|m| m.assignee == "unassigned").unwrap();
        assert_eq!(unassigned_member.completed_issues, 1);
        assert!(report.members.iter().all(|m| m.assignee != "bob"));
    }
}
