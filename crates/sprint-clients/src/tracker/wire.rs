//! JSON shapes returned by the issue tracker's REST API, and their
//! conversion into the domain types from `sprint_core::types` (§3).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sprint_core::types::{BoardInfo, BoardType, Issue, Sprint, SprintState, StatusTransition};

#[derive(Debug, Deserialize)]
pub struct BoardSearchResponse {
    pub values: Vec<WireBoard>,
}

#[derive(Debug, Deserialize)]
pub struct WireBoard {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: String,
    #[serde(default)]
    pub location: Option<WireBoardLocation>,
}

#[derive(Debug, Deserialize)]
pub struct WireBoardLocation {
    #[serde(rename = "projectKey")]
    pub project_key: Option<String>,
    #[serde(rename = "projectName")]
    pub project_name: Option<String>,
}

impl From<WireBoard> for BoardInfo {
    fn from(b: WireBoard) -> Self {
        BoardInfo {
            id: b.id.to_string(),
            name: b.name,
            project_key: b.location.as_ref().and_then(|l| l.project_key.clone()),
            project_name: b.location.as_ref().and_then(|l| l.project_name.clone()),
            board_type: if b.board_type.eq_ignore_ascii_case("kanban") {
                BoardType::Kanban
            } else {
                BoardType::Scrum
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SprintSearchResponse {
    pub values: Vec<WireSprint>,
}

#[derive(Debug, Deserialize)]
pub struct WireSprint {
    pub id: u64,
    pub name: String,
    pub state: String,
    #[serde(rename = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "completeDate")]
    pub complete_date: Option<DateTime<Utc>>,
    pub goal: Option<String>,
    #[serde(rename = "originBoardId")]
    pub origin_board_id: u64,
}

impl From<WireSprint> for Sprint {
    fn from(s: WireSprint) -> Self {
        Sprint {
            id: s.id.to_string(),
            name: s.name,
            state: match s.state.to_ascii_lowercase().as_str() {
                "active" => SprintState::Active,
                "future" => SprintState::Future,
                _ => SprintState::Closed,
            },
            start_date: s.start_date,
            end_date: s.end_date,
            complete_date: s.complete_date,
            goal: s.goal,
            board_id: s.origin_board_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueSearchResponse {
    pub issues: Vec<WireIssue>,
}

#[derive(Debug, Deserialize)]
pub struct WireIssue {
    pub key: String,
    pub id: String,
    pub fields: WireIssueFields,
    #[serde(default)]
    pub changelog: Option<WireChangelog>,
}

#[derive(Debug, Deserialize)]
pub struct WireIssueFields {
    pub summary: String,
    pub status: WireNamed,
    pub issuetype: WireNamed,
    pub priority: Option<WireNamed>,
    pub assignee: Option<WireUser>,
    pub reporter: Option<WireUser>,
    /// Story points live on a customfield whose id varies by deployment;
    /// the tracker normalizes it onto this stable field name before it
    /// reaches this client.
    #[serde(default, rename = "storyPoints")]
    pub story_points: Option<f64>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub resolutiondate: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<WireNamed>,
    #[serde(default)]
    pub epic: Option<WireNamed>,
    #[serde(default)]
    pub parent: Option<WireParent>,
    #[serde(default)]
    pub sprint: Option<WireSprintRef>,
}

#[derive(Debug, Deserialize)]
pub struct WireNamed {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WireUser {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct WireParent {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct WireSprintRef {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct WireChangelog {
    pub histories: Vec<WireHistory>,
}

#[derive(Debug, Deserialize)]
pub struct WireHistory {
    pub created: DateTime<Utc>,
    pub items: Vec<WireHistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct WireHistoryItem {
    pub field: String,
    #[serde(rename = "fromString")]
    pub from_string: Option<String>,
    #[serde(rename = "toString")]
    pub to_string: Option<String>,
}

impl From<WireIssue> for Issue {
    fn from(w: WireIssue) -> Self {
        let transitions = w
            .changelog
            .map(|c| {
                c.histories
                    .into_iter()
                    .flat_map(|h| {
                        let created = h.created;
                        h.items
                            .into_iter()
                            .filter(|i| i.field == "status")
                            .map(move |i| StatusTransition {
                                from_status: i.from_string.unwrap_or_default(),
                                to_status: i.to_string.unwrap_or_default(),
                                at: created,
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Issue {
            key: w.key,
            id: w.id,
            summary: w.fields.summary,
            status: w.fields.status.name,
            issue_type: w.fields.issuetype.name,
            priority: w.fields.priority.map(|p| p.name),
            assignee: w.fields.assignee.map(|u| u.display_name),
            reporter: w.fields.reporter.map(|u| u.display_name),
            story_points: w.fields.story_points,
            created: w.fields.created,
            updated: w.fields.updated,
            resolved: w.fields.resolutiondate,
            sprint_id: w.fields.sprint.map(|s| s.id.to_string()),
            labels: w.fields.labels,
            components: w.fields.components.into_iter().map(|c| c.name).collect(),
            epic_link: w.fields.epic.map(|e| e.name),
            parent_key: w.fields.parent.map(|p| p.key),
            tier: None,
            transitions,
        }
    }
}
