//! Burndown derivation from issue changelogs (§4.D).
//!
//! Per Open Question 3 (§9), the upstream changelog shape is provider
//! specific; this only requires accepting transition data when present and
//! omitting the series otherwise.

use chrono::{DateTime, Utc};
use sprint_core::types::{BurndownPoint, Issue, Sprint};

/// One point per calendar day of the sprint window, showing remaining story
/// points. Returns `None` when the sprint has no window or none of its
/// issues carry changelog transitions.
pub fn compute_burndown(sprint: &Sprint, issues: &[Issue]) -> Option<Vec<BurndownPoint>> {
    let (start, end) = match (sprint.start_date, sprint.end_date) {
        (Some(s), Some(e)) => (s, e),
        _ => return None,
    };
    if issues.iter().all(|i| i.transitions.is_empty()) {
        return None;
    }

    let total_points: f64 = issues.iter().filter_map(|i| i.story_points).sum();

    let mut completions: Vec<(DateTime<Utc>, f64)> = issues
        .iter()
        .filter_map(|issue| completion_time(issue).map(|at| (at, issue.story_points.unwrap_or(0.0))))
        .collect();
    completions.sort_by_key(|(at, _)| *at);

    let mut points = Vec::new();
    let mut remaining = total_points;
    let mut event_idx = 0;
    let mut day = start.date_naive();
    let end_day = end.date_naive();

    while day <= end_day {
        let day_end = day
            .and_hms_opt(23, 59, 59)
            .expect("valid time")
            .and_utc();
        while event_idx < completions.len() && completions[event_idx].0 <= day_end {
            remaining -= completions[event_idx].1;
            event_idx += 1;
        }
        points.push(BurndownPoint {
            date: day.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
            remaining: remaining.max(0.0),
        });
        day = day.succ_opt().expect("day within sprint window");
    }

    Some(points)
}

/// Earliest transition into a terminal status, falling back to `resolved`
/// when the changelog lacks an explicit terminal transition.
fn completion_time(issue: &Issue) -> Option<DateTime<Utc>> {
    let from_changelog = issue
        .transitions
        .iter()
        .filter(|t| is_terminal_status(&t.to_status))
        .map(|t| t.at)
        .min();
    from_changelog.or(issue.resolved)
}

fn is_terminal_status(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "done" | "closed" | "resolved" | "complete" | "completed"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprint_core::types::{SprintState, StatusTransition};

    fn sprint() -> Sprint {
        Sprint {
            id: "1".into(),
            name: "Sprint 1".into(),
            state: SprintState::Closed,
            start_date: Some(Utc::now() - chrono::Duration::days(3)),
            end_date: Some(Utc::now()),
            complete_date: None,
            goal: None,
            board_id: "b1".into(),
        }
    }

    fn issue(story_points: f64, transitions: Vec<StatusTransition>) -> Issue {
        Issue {
            key: "PROJ-1".into(),
            id: "1".into(),
            summary: "x".into(),
            status: "Done".into(),
            issue_type: "Story".into(),
            priority: None,
            assignee: None,
            reporter: None,
            story_points: Some(story_points),
            created: Utc::now() - chrono::Duration::days(5),
            updated: Utc::now(),
            resolved: None,
            sprint_id: None,
            labels: vec![],
            components: vec![],
            epic_link: None,
            parent_key: None,
            tier: None,
            transitions,
        }
    }

    #[test]
    fn omitted_when_no_issue_has_a_changelog() {
        let i = issue(5.0, vec![]);
        assert!(compute_burndown(&sprint(), &[i]).is_none());
    }

    #[test]
    fn remaining_drops_after_completion_transition() {
        let s = sprint();
        let i = issue(
            5.0,
            vec![StatusTransition {
                from_status: "In Progress".into(),
                to_status: "Done".into(),
                at: s.start_date.unwrap() + chrono::Duration::days(1),
            }],
        );
        let points = compute_burndown(&s, &[i]).unwrap();
        assert_eq!(points.first().unwrap().remaining, 5.0);
        assert_eq!(points.last().unwrap().remaining, 0.0);
    }
}
