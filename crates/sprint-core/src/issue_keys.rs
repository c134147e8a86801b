//! Pure issue-key extraction (§4.C `extractIssueKeys`, §8 scenario 5).

use once_cell::sync::Lazy;
use regex::Regex;

/// `[A-Z][A-Z0-9]+-\d+` — uppercase project prefix only; lowercase variants
/// (`scnt-123`) are intentionally excluded.
static ISSUE_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z][A-Z0-9]+-\d+").unwrap());

/// Extract issue keys referenced in free text, deduplicated while
/// preserving first-seen order. Idempotent: re-running extraction over the
/// joined output yields the same set (§8 invariant).
pub fn extract_issue_keys(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in ISSUE_KEY_RE.find_iter(text) {
        let key = m.as_str().to_string();
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_uppercase_keys_only() {
        let text = "Fix SCNT-4945 and SCNT-4946: cleanup (see also scnt-4947)";
        assert_eq!(extract_issue_keys(text), vec!["SCNT-4945", "SCNT-4946"]);
    }

    #[test]
    fn dedupes_preserving_order() {
        let text = "PROJ-1 touches PROJ-2, and again PROJ-1";
        assert_eq!(extract_issue_keys(text), vec!["PROJ-1", "PROJ-2"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "Fix SCNT-4945 and SCNT-4946";
        let once = extract_issue_keys(text);
        let twice = extract_issue_keys(&once.join(" "));
        assert_eq!(once, twice);
    }

    #[test]
    fn no_match_returns_empty() {
        assert!(extract_issue_keys("nothing to see here").is_empty());
    }

    #[test]
    fn alphanumeric_project_prefix() {
        assert_eq!(extract_issue_keys("see AB12-99"), vec!["AB12-99"]);
    }
}
