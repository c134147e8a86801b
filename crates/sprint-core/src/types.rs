//! Sprint report data model — the shapes exchanged between the tracker
//! client, the SCM client, the aggregator, and the tool registry.
//!
//! Every timestamp is a UTC instant (`chrono::DateTime<Utc>`). Identifiers
//! coming from upstream providers are treated as opaque strings rather than
//! newtypes, since the providers themselves impose no stronger structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Sprint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintState {
    Active,
    Future,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub name: String,
    pub state: SprintState,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub complete_date: Option<DateTime<Utc>>,
    pub goal: Option<String>,
    pub board_id: String,
}

impl Sprint {
    /// `Sprint.endDate >= Sprint.startDate` when both are present.
    pub fn has_valid_window(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "1")]
    T1,
    #[serde(rename = "2")]
    T2,
    #[serde(rename = "3")]
    T3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Canonical `PROJECT-NUMBER` key, e.g. `"SCNT-4945"`.
    pub key: String,
    pub id: String,
    pub summary: String,
    pub status: String,
    pub issue_type: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub story_points: Option<f64>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub resolved: Option<DateTime<Utc>>,
    pub sprint_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    pub epic_link: Option<String>,
    pub parent_key: Option<String>,
    pub tier: Option<Tier>,
    /// Changelog transitions, when the upstream `expand=changelog` data was
    /// requested. Used only to derive cycle time and burndown; absent by
    /// default.
    #[serde(default)]
    pub transitions: Vec<StatusTransition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from_status: String,
    pub to_status: String,
    pub at: DateTime<Utc>,
}

impl Issue {
    /// True if `status` denotes the issue as completed. The set of
    /// "completed" statuses is deployment-specific; this treats any of the
    /// common terminal names as completed, matching the way a tracker's own
    /// "resolved" field already signals completion.
    pub fn is_completed(&self) -> bool {
        self.resolved.is_some()
            || matches!(
                self.status.to_ascii_lowercase().as_str(),
                "done" | "closed" | "resolved" | "complete" | "completed"
            )
    }

    /// First transition into an "in progress"-like status, used for cycle
    /// time. `None` when no changelog was fetched for this issue.
    pub fn first_in_progress_at(&self) -> Option<DateTime<Utc>> {
        self.transitions
            .iter()
            .filter(|t| {
                let s = t.to_status.to_ascii_lowercase();
                s.contains("progress") || s.contains("in review") || s.contains("development")
            })
            .map(|t| t.at)
            .min()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub login: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: CommitAuthor,
    pub committed_at: DateTime<Utc>,
    pub url: String,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    #[serde(default)]
    pub issue_keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pull request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrReview {
    pub reviewer: String,
    pub state: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: PrState,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
    pub commits: u64,
    #[serde(default)]
    pub reviews: Vec<PrReview>,
    pub comments: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub issue_keys: Vec<String>,
    /// True once reviews + timing have been fetched via the enhancement
    /// pipeline; false means only the REST/GraphQL listing fields are
    /// populated.
    #[serde(default)]
    pub enhanced: bool,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardType {
    Scrum,
    Kanban,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardInfo {
    pub id: String,
    pub name: String,
    pub project_key: Option<String>,
    pub project_name: Option<String>,
    pub board_type: BoardType,
}

// ---------------------------------------------------------------------------
// Sprint report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprintMetrics {
    pub total_issues: u64,
    pub completed_issues: u64,
    pub completion_rate: f64,
    pub total_story_points: f64,
    pub completed_story_points: f64,
    pub velocity: f64,
    pub velocity_percentage: f64,
    pub by_status: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub by_priority: HashMap<String, u64>,
    pub by_assignee: HashMap<String, u64>,
    /// Cycle time (resolved − first "in progress" transition), in hours
    /// (§4.D "Cycle time per issue").
    pub cycle_time: CycleTimeStats,
    /// `bugsResolved / bugsCreated` within the sprint window, clamped to
    /// `[0, 1]` (§4.D "Bug resolution rate").
    pub bug_resolution_rate: f64,
}

/// Cycle time distribution across a sprint's resolved issues (§4.D).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CycleTimeStats {
    pub median_hours: f64,
    pub p90_hours: f64,
    pub average_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintVelocityPoint {
    pub id: String,
    pub name: String,
    pub commitment: f64,
    pub completed: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityReport {
    pub sprints: Vec<SprintVelocityPoint>,
    pub average: f64,
    pub trend: VelocityTrend,
}

/// Per-assignee completion stats over the sprints considered (§4.D
/// `teamPerformance`), distinct from [`SprintMetrics::by_assignee`]'s
/// current-sprint issue counts: this looks across `lastN` closed sprints
/// and adds cycle time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMemberPerformance {
    pub assignee: String,
    pub completed_issues: u64,
    pub completed_story_points: f64,
    /// Mean hours from `created` to `resolved` across this member's
    /// completed issues with a resolution timestamp; `None` if none had one.
    pub average_cycle_time_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPerformanceReport {
    pub sprints_considered: Vec<String>,
    pub members: Vec<TeamMemberPerformance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurndownPoint {
    pub date: DateTime<Utc>,
    pub remaining: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitActivity {
    pub total_commits: u64,
    pub unique_authors: u64,
    pub additions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestStats {
    pub total_prs: u64,
    pub merged_prs: u64,
    pub merge_rate: f64,
    pub average_time_to_merge_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeChangeStats {
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_reviews: u64,
    pub average_reviews_per_pr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Traceability {
    /// `|PRs with >=1 issueKey| / |PRs total|`.
    pub pr_traceability_rate: f64,
    /// issue key -> (commit shas, PR numbers) referencing it.
    pub issue_index: HashMap<String, IssueReferences>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueReferences {
    pub commits: Vec<String>,
    pub pull_requests: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancedGitHub {
    pub commit_activity: CommitActivity,
    pub pull_request_stats: PullRequestStats,
    pub code_changes: CodeChangeStats,
    pub review_stats: ReviewStats,
    pub traceability: Traceability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarryoverReason {
    Complexity,
    Dependencies,
    Scope,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryoverItem {
    pub issue_key: String,
    pub reason: CarryoverReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardLooking {
    pub forecasted_velocity: f64,
    pub confidence_level: ConfidenceLevel,
    pub available_capacity: f64,
    pub carryover_items: Vec<CarryoverItem>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub generator_version: String,
    pub cache_hits: u64,
    pub upstream_latency_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintReport {
    pub sprint: Sprint,
    pub metrics: SprintMetrics,
    #[serde(default)]
    pub tier1_issues: Vec<Issue>,
    #[serde(default)]
    pub tier2_issues: Vec<Issue>,
    #[serde(default)]
    pub tier3_issues: Vec<Issue>,
    pub commits: Vec<Commit>,
    pub pull_requests: Vec<PullRequest>,
    pub velocity: VelocityReport,
    pub burndown: Option<Vec<BurndownPoint>>,
    pub enhanced_github: Option<EnhancedGitHub>,
    pub forward_looking: Option<ForwardLooking>,
    #[serde(default)]
    pub team_performance: Option<TeamPerformanceReport>,
    pub metadata: ReportMetadata,
}

// ---------------------------------------------------------------------------
// Cache entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub ttl_seconds: u64,
    pub stored_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}
