//! The forward-looking forecast block (§4.D): next-sprint velocity
//! forecast, confidence, carryover detection, and recommendations.

use sprint_core::types::{CarryoverItem, CarryoverReason, ConfidenceLevel, ForwardLooking, Issue, Sprint};

use crate::velocity::{stddev, weighted_forecast};

/// `velocity_history` is the completed-story-points series for up to the
/// last 5 sprints, oldest first (same series `velocity::build_velocity_report`
/// consumes).
pub fn build_forward_looking(
    sprint: &Sprint,
    issues: &[Issue],
    velocity_history: &[f64],
    available_capacity: f64,
) -> ForwardLooking {
    let forecasted_velocity = weighted_forecast(velocity_history);
    let confidence_level = confidence_for(velocity_history);
    let carryover_items = carryover_items(sprint, issues);
    let recommendations = recommendations(forecasted_velocity, &carryover_items, available_capacity);

    ForwardLooking {
        forecasted_velocity,
        confidence_level,
        available_capacity,
        carryover_items,
        recommendations,
    }
}

fn confidence_for(values: &[f64]) -> ConfidenceLevel {
    if values.len() < 3 {
        return ConfidenceLevel::Low;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return ConfidenceLevel::Low;
    }
    let cv = stddev(values) / mean;
    if cv < 0.15 {
        ConfidenceLevel::High
    } else if cv < 0.30 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

fn carryover_items(sprint: &Sprint, issues: &[Issue]) -> Vec<CarryoverItem> {
    issues
        .iter()
        .filter(|issue| issue.sprint_id.as_deref() == Some(sprint.id.as_str()) && !issue.is_completed())
        .map(|issue| CarryoverItem {
            issue_key: issue.key.clone(),
            reason: classify_carryover(issue),
        })
        .collect()
}

/// Heuristic reason classification. The issue model carries no link graph
/// (§9: "no graph structure is persisted"), so a "blocks"/"blocked" label is
/// treated as the dependency signal a tracker-native `Blocks` link would
/// otherwise provide.
fn classify_carryover(issue: &Issue) -> CarryoverReason {
    if issue.story_points.map(|p| p > 8.0).unwrap_or(false) {
        return CarryoverReason::Complexity;
    }

    let labels: Vec<String> = issue.labels.iter().map(|l| l.to_ascii_lowercase()).collect();
    if labels.iter().any(|l| l.contains("block") || l.contains("depend")) {
        return CarryoverReason::Dependencies;
    }
    if labels.iter().any(|l| l.contains("scope")) {
        return CarryoverReason::Scope;
    }
    CarryoverReason::Unknown
}

fn recommendations(
    forecasted_velocity: f64,
    carryover: &[CarryoverItem],
    available_capacity: f64,
) -> Vec<String> {
    let mut recs = vec![format!("Plan for {:.0} points next sprint", forecasted_velocity)];

    let dependencies = carryover
        .iter()
        .filter(|c| c.reason == CarryoverReason::Dependencies)
        .count();
    if dependencies > 0 {
        recs.push(format!("Resolve {dependencies} dependencies first"));
    }

    let complexity = carryover
        .iter()
        .filter(|c| c.reason == CarryoverReason::Complexity)
        .count();
    if complexity > 0 {
        recs.push(format!(
            "Break down {complexity} high-complexity carryover item(s) before re-committing"
        ));
    }

    if available_capacity > 0.0 && forecasted_velocity > available_capacity {
        recs.push("Forecasted velocity exceeds available capacity; consider descoping".to_string());
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sprint_core::types::SprintState;

    fn sprint() -> Sprint {
        Sprint {
            id: "sprint-1".into(),
            name: "Sprint 1".into(),
            state: SprintState::Active,
            start_date: Some(Utc::now() - chrono::Duration::days(7)),
            end_date: Some(Utc::now() + chrono::Duration::days(7)),
            complete_date: None,
            goal: None,
            board_id: "b1".into(),
        }
    }

    fn incomplete_issue(key: &str, story_points: Option<f64>, labels: Vec<&str>) -> Issue {
        Issue {
            key: key.into(),
            id: key.into(),
            summary: "x".into(),
            status: "In Progress".into(),
            issue_type: "Story".into(),
            priority: None,
            assignee: None,
            reporter: None,
            story_points,
            created: Utc::now(),
            updated: Utc::now(),
            resolved: None,
            sprint_id: Some("sprint-1".into()),
            labels: labels.into_iter().map(String::from).collect(),
            components: vec![],
            epic_link: None,
            parent_key: None,
            tier: None,
            transitions: vec![],
        }
    }

    #[test]
    fn carryover_reasons_follow_the_documented_scenario() {
        let issues = vec![
            incomplete_issue("PROJ-1", Some(13.0), vec![]),
            incomplete_issue("PROJ-2", Some(3.0), vec!["blocked"]),
            incomplete_issue("PROJ-3", Some(2.0), vec!["blocks"]),
        ];
        let items = carryover_items(&sprint(), &issues);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].reason, CarryoverReason::Complexity);
        assert_eq!(items[1].reason, CarryoverReason::Dependencies);
        assert_eq!(items[2].reason, CarryoverReason::Dependencies);
    }

    #[test]
    fn fewer_than_three_samples_is_always_low_confidence() {
        assert_eq!(confidence_for(&[10.0, 12.0]), ConfidenceLevel::Low);
    }

    #[test]
    fn tight_series_is_high_confidence() {
        assert_eq!(confidence_for(&[20.0, 21.0, 19.0, 20.0]), ConfidenceLevel::High);
    }
}
