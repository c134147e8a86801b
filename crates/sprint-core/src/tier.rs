//! Tier classification (§4.D): business-impact bucketing of issues into
//! T1 (customer-impacting), T2 (internal), T3 (technical debt).
//!
//! The rule set is deployment-specific (Open Question 1 in §9), so it is
//! modeled as a configurable [`TierRules`] rather than a hardcoded match.

use crate::types::{Issue, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRules {
    /// label -> tier, checked first (rule precedence 1).
    pub label_rules: HashMap<String, Tier>,
    /// component -> tier, checked second (rule precedence 2).
    pub component_rules: HashMap<String, Tier>,
    /// issue type -> tier, checked last (rule precedence 3). `Bug` with a
    /// "high"/"highest" priority is handled separately before this map is
    /// consulted.
    pub type_rules: HashMap<String, Tier>,
}

impl Default for TierRules {
    fn default() -> Self {
        let mut label_rules = HashMap::new();
        label_rules.insert("customer-impacting".to_string(), Tier::T1);
        label_rules.insert("internal".to_string(), Tier::T2);
        label_rules.insert("tech-debt".to_string(), Tier::T3);
        label_rules.insert("refactor".to_string(), Tier::T3);

        let mut type_rules = HashMap::new();
        type_rules.insert("task".to_string(), Tier::T2);
        type_rules.insert("sub-task".to_string(), Tier::T3);
        type_rules.insert("subtask".to_string(), Tier::T3);

        Self {
            label_rules,
            component_rules: HashMap::new(),
            type_rules,
        }
    }
}

impl TierRules {
    /// Classify an issue by rule precedence: label match, then component
    /// match, then issue type (with the Bug+high-priority special case).
    /// Ties within a precedence level resolve to whichever rule is matched
    /// first in the issue's own label/component ordering.
    pub fn classify(&self, issue: &Issue) -> Option<Tier> {
        for label in &issue.labels {
            if let Some(tier) = self.label_rules.get(label) {
                return Some(*tier);
            }
        }

        for component in &issue.components {
            if let Some(tier) = self.component_rules.get(component) {
                return Some(*tier);
            }
        }

        let issue_type = issue.issue_type.to_ascii_lowercase();
        let is_high_priority = issue
            .priority
            .as_deref()
            .map(|p| {
                let p = p.to_ascii_lowercase();
                p == "high" || p == "highest"
            })
            .unwrap_or(false);

        if issue_type == "bug" && is_high_priority {
            return Some(Tier::T1);
        }

        self.type_rules.get(&issue_type).copied()
    }
}
