//! Tool definitions: name, description, and JSON-Schema input shape for
//! each of the fourteen required tools (§4.E), each declared as a
//! `serde_json::json!` literal.

use serde_json::json;

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: serde_json::Value,
}

/// The complete set of tools the registry exposes, in the order named by
/// §4.E's "Required tools" list.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        search_boards(),
        get_sprints(),
        get_sprint_issues(),
        get_issue_details(),
        search_issues_jql(),
        get_commits(),
        get_pull_requests(),
        search_commits_by_message(),
        find_commits_with_issue_refs(),
        generate_sprint_report(),
        generate_comprehensive_report(),
        get_sprint_metrics(),
        health_check(),
        cache_stats(),
    ]
}

fn search_boards() -> ToolDefinition {
    ToolDefinition {
        name: "search_boards",
        description: "Search tracker boards by name or project key.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Name or project-key fragment to search for" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 200, "description": "Maximum boards to return (default 50)" }
            }
        }),
    }
}

fn get_sprints() -> ToolDefinition {
    ToolDefinition {
        name: "get_sprints",
        description: "List sprints on a board, filtered by state.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "board_id": { "type": "string", "description": "Board identifier" },
                "state": { "type": "string", "enum": ["active", "future", "closed"], "description": "Sprint state filter (default active)" }
            },
            "required": ["board_id"]
        }),
    }
}

fn get_sprint_issues() -> ToolDefinition {
    ToolDefinition {
        name: "get_sprint_issues",
        description: "List issues assigned to a sprint.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "sprint_id": { "type": "string", "description": "Sprint identifier" },
                "fields": { "type": "array", "items": { "type": "string" }, "description": "Optional field projection" },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 1000, "description": "Maximum issues to return (default 100)" }
            },
            "required": ["sprint_id"]
        }),
    }
}

fn get_issue_details() -> ToolDefinition {
    ToolDefinition {
        name: "get_issue_details",
        description: "Fetch a single issue, optionally with its changelog expanded.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Issue key, e.g. PROJ-123" },
                "expand_changelog": { "type": "boolean", "description": "Include status-transition history (default false)" }
            },
            "required": ["key"]
        }),
    }
}

fn search_issues_jql() -> ToolDefinition {
    ToolDefinition {
        name: "search_issues_jql",
        description: "Search issues with a JQL query. Mutation and script-invocation tokens are rejected.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "jql": { "type": "string", "description": "JQL search expression" },
                "fields": { "type": "array", "items": { "type": "string" } },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 1000 }
            },
            "required": ["jql"]
        }),
    }
}

fn get_commits() -> ToolDefinition {
    ToolDefinition {
        name: "get_commits",
        description: "List commits to a repository within a date window.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "since": { "type": "string", "description": "RFC3339 instant" },
                "until": { "type": "string", "description": "RFC3339 instant" },
                "max_pages": { "type": "integer", "minimum": 1, "maximum": 50 }
            },
            "required": ["owner", "repo", "since", "until"]
        }),
    }
}

fn get_pull_requests() -> ToolDefinition {
    ToolDefinition {
        name: "get_pull_requests",
        description: "Search pull requests created within a date window (GraphQL when available, REST fallback otherwise).",
        input_schema: json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "since": { "type": "string", "description": "RFC3339 instant" },
                "until": { "type": "string", "description": "RFC3339 instant" }
            },
            "required": ["owner", "repo", "since", "until"]
        }),
    }
}

fn search_commits_by_message() -> ToolDefinition {
    ToolDefinition {
        name: "search_commits_by_message",
        description: "Find commits in a date window whose message contains a substring.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "since": { "type": "string" },
                "until": { "type": "string" },
                "query": { "type": "string", "description": "Case-insensitive substring to search commit messages for" }
            },
            "required": ["owner", "repo", "since", "until", "query"]
        }),
    }
}

fn find_commits_with_issue_refs() -> ToolDefinition {
    ToolDefinition {
        name: "find_commits_with_issue_refs",
        description: "Find commits in a date window whose message references at least one issue key.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "since": { "type": "string" },
                "until": { "type": "string" }
            },
            "required": ["owner", "repo", "since", "until"]
        }),
    }
}

fn generate_sprint_report() -> ToolDefinition {
    ToolDefinition {
        name: "generate_sprint_report",
        description: "Generate a basic sprint report: metrics, velocity, burndown, and correlated commits/PRs when a repo is configured.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "sprint_id": { "type": "string" },
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "no_cache": { "type": "boolean" }
            },
            "required": ["sprint_id"]
        }),
    }
}

fn generate_comprehensive_report() -> ToolDefinition {
    ToolDefinition {
        name: "generate_comprehensive_report",
        description: "Generate a full sprint report including tiered issue breakdowns, enhanced GitHub stats, and the forward-looking forecast.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "sprint_id": { "type": "string" },
                "owner": { "type": "string" },
                "repo": { "type": "string" },
                "include_tier1": { "type": "boolean" },
                "include_tier2": { "type": "boolean" },
                "include_tier3": { "type": "boolean" },
                "include_forward_looking": { "type": "boolean" },
                "include_enhanced_scm": { "type": "boolean" },
                "no_cache": { "type": "boolean" }
            },
            "required": ["sprint_id"]
        }),
    }
}

fn get_sprint_metrics() -> ToolDefinition {
    ToolDefinition {
        name: "get_sprint_metrics",
        description: "Compute just the metrics block for a sprint, without fetching SCM data or building a full report.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "sprint_id": { "type": "string" }
            },
            "required": ["sprint_id"]
        }),
    }
}

fn health_check() -> ToolDefinition {
    ToolDefinition {
        name: "health_check",
        description: "Report circuit-breaker state for each upstream provider and a cache summary.",
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}

fn cache_stats() -> ToolDefinition {
    ToolDefinition {
        name: "cache_stats",
        description: "Report cache engine statistics: hits, misses, evictions, hit rate.",
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}
