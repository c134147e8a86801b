//! The aggregation service's input contract (§4.D).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub sprint_id: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub include_tier1: bool,
    pub include_tier2: bool,
    pub include_tier3: bool,
    pub include_forward_looking: bool,
    pub include_enhanced_scm: bool,
    /// Skips the cache read but still writes the freshly generated report.
    pub no_cache: bool,
}

impl ReportRequest {
    pub fn new(sprint_id: impl Into<String>) -> Self {
        Self {
            sprint_id: sprint_id.into(),
            owner: None,
            repo: None,
            include_tier1: false,
            include_tier2: false,
            include_tier3: false,
            include_forward_looking: false,
            include_enhanced_scm: false,
            no_cache: false,
        }
    }

    pub fn has_scm_target(&self) -> bool {
        self.owner.is_some() && self.repo.is_some()
    }

    /// Stable hash of the flags that change report content, used as the
    /// `<flagsHash>` component of the `report:<sprintId>:<flagsHash>` cache
    /// key (§6). `no_cache` is a read policy, not part of report identity,
    /// so it is deliberately excluded.
    pub fn flags_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.owner.hash(&mut hasher);
        self.repo.hash(&mut hasher);
        self.include_tier1.hash(&mut hasher);
        self.include_tier2.hash(&mut hasher);
        self.include_tier3.hash(&mut hasher);
        self.include_forward_looking.hash(&mut hasher);
        self.include_enhanced_scm.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    pub fn cache_key(&self) -> String {
        format!("report:{}:{}", self.sprint_id, self.flags_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_hash_is_stable_for_identical_requests() {
        let a = ReportRequest {
            include_tier1: true,
            ..ReportRequest::new("1")
        };
        let b = ReportRequest {
            include_tier1: true,
            ..ReportRequest::new("1")
        };
        assert_eq!(a.flags_hash(), b.flags_hash());
    }

    #[test]
    fn flags_hash_differs_when_flags_differ() {
        let a = ReportRequest::new("1");
        let b = ReportRequest {
            include_forward_looking: true,
            ..ReportRequest::new("1")
        };
        assert_ne!(a.flags_hash(), b.flags_hash());
    }

    #[test]
    fn no_cache_does_not_affect_the_cache_key() {
        let a = ReportRequest::new("1");
        let b = ReportRequest {
            no_cache: true,
            ..ReportRequest::new("1")
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
