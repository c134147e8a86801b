//! Deterministic sprint metric computations (§4.D).

use std::collections::HashMap;

use sprint_core::types::{CycleTimeStats, Issue, Sprint, SprintMetrics};

pub fn compute_metrics(sprint: &Sprint, issues: &[Issue]) -> SprintMetrics {
    let total_issues = issues.len() as u64;
    let completed_issues = issues.iter().filter(|i| i.is_completed()).count() as u64;
    let completion_rate = ratio(completed_issues, total_issues);

    let total_story_points: f64 = issues.iter().filter_map(|i| i.story_points).sum();
    let completed_story_points: f64 = issues
        .iter()
        .filter(|i| i.is_completed())
        .filter_map(|i| i.story_points)
        .sum();

    let velocity = velocity_for_window(sprint, issues);
    let velocity_percentage = if total_story_points > 0.0 {
        velocity / total_story_points
    } else {
        0.0
    };

    let mut by_status = HashMap::new();
    let mut by_type = HashMap::new();
    let mut by_priority = HashMap::new();
    let mut by_assignee = HashMap::new();

    for issue in issues {
        *by_status.entry(issue.status.clone()).or_insert(0) += 1;
        *by_type.entry(issue.issue_type.clone()).or_insert(0) += 1;
        if let Some(priority) = &issue.priority {
            *by_priority.entry(priority.clone()).or_insert(0) += 1;
        }
        let assignee = issue.assignee.clone().unwrap_or_else(|| "Unassigned".to_string());
        *by_assignee.entry(assignee).or_insert(0) += 1;
    }

    SprintMetrics {
        total_issues,
        completed_issues,
        completion_rate,
        total_story_points,
        completed_story_points,
        velocity,
        velocity_percentage,
        by_status,
        by_type,
        by_priority,
        by_assignee,
        cycle_time: cycle_time_stats(issues),
        bug_resolution_rate: bug_resolution_rate(sprint, issues),
    }
}

/// `Σ storyPoints for issues with resolved && resolved ∈ [sprint.start, sprint.end]`.
fn velocity_for_window(sprint: &Sprint, issues: &[Issue]) -> f64 {
    issues
        .iter()
        .filter_map(|issue| {
            let resolved = issue.resolved?;
            let in_window = match (sprint.start_date, sprint.end_date) {
                (Some(start), Some(end)) => resolved >= start && resolved <= end,
                _ => true,
            };
            if in_window {
                issue.story_points
            } else {
                None
            }
        })
        .sum()
}

pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Cycle time per issue = `resolved - firstInProgressTransition`; issues
/// missing either timestamp are excluded (no changelog was fetched, or the
/// issue never resolved).
pub fn cycle_time_stats(issues: &[Issue]) -> CycleTimeStats {
    let mut hours: Vec<f64> = issues
        .iter()
        .filter_map(|issue| {
            let resolved = issue.resolved?;
            let started = issue.first_in_progress_at()?;
            let delta = resolved.signed_duration_since(started);
            Some(delta.num_minutes() as f64 / 60.0)
        })
        .filter(|h| *h >= 0.0)
        .collect();

    if hours.is_empty() {
        return CycleTimeStats::default();
    }

    hours.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let average_hours = hours.iter().sum::<f64>() / hours.len() as f64;
    let median_hours = percentile(&hours, 0.5);
    let p90_hours = percentile(&hours, 0.9);

    CycleTimeStats {
        median_hours,
        p90_hours,
        average_hours,
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// `bugsResolved / bugsCreated` within the sprint window, clamped to
/// `[0, 1]` since a bug resolved from a prior window still counts as
/// resolved but is not itself "created" in this one.
pub fn bug_resolution_rate(sprint: &Sprint, issues: &[Issue]) -> f64 {
    let is_bug = |i: &&Issue| i.issue_type.eq_ignore_ascii_case("bug");
    let bugs_created = issues
        .iter()
        .filter(is_bug)
        .filter(|i| match (sprint.start_date, sprint.end_date) {
            (Some(start), Some(end)) => i.created >= start && i.created <= end,
            _ => true,
        })
        .count();
    let bugs_resolved = issues.iter().filter(is_bug).filter(|i| i.is_completed()).count();

    if bugs_created == 0 {
        0.0
    } else {
        (bugs_resolved as f64 / bugs_created as f64).clamp(0.0, 1.0)
    }
}
