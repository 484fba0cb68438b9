//! Topic selection policy.
//!
//! Maps the raw topic list reported by the source cluster to the set of
//! topics the mirror actually replicates. Pure function, no side effects.

use crate::config::MirrorOptions;

/// Apply the inclusion/exclusion policy to the source cluster's topic list.
///
/// The whitelist (`topics_only`) takes priority over the blacklist
/// (`excluded_topics`) when both are non-empty. Input order is preserved
/// in all branches; an empty input yields an empty output.
#[must_use]
pub fn select_topics(all_topics: &[String], opts: &MirrorOptions) -> Vec<String> {
    if !opts.topics_only.is_empty() {
        all_topics
            .iter()
            .filter(|t| opts.topics_only.contains(t.as_str()))
            .cloned()
            .collect()
    } else if !opts.excluded_topics.is_empty() {
        all_topics
            .iter()
            .filter(|t| !opts.excluded_topics.contains(t.as_str()))
            .cloned()
            .collect()
    } else {
        all_topics.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn opts(only: &[&str], excluded: &[&str]) -> MirrorOptions {
        MirrorOptions {
            topics_only: only.iter().map(|s| (*s).to_string()).collect(),
            excluded_topics: excluded.iter().map(|s| (*s).to_string()).collect(),
            ..MirrorOptions::default()
        }
    }

    #[test]
    fn test_identity_when_no_policy() {
        let all = topics(&["t1", "t2", "t3"]);
        assert_eq!(select_topics(&all, &opts(&[], &[])), all);
        assert!(select_topics(&[], &opts(&[], &[])).is_empty());
    }

    #[test]
    fn test_exclusion() {
        let all = topics(&["t1", "t2"]);
        assert_eq!(select_topics(&all, &opts(&[], &["t1"])), topics(&["t2"]));
    }

    #[test]
    fn test_whitelist() {
        let all = topics(&["t1", "t2"]);
        assert_eq!(select_topics(&all, &opts(&["t1"], &[])), topics(&["t1"]));
    }

    #[test]
    fn test_whitelist_wins_over_blacklist() {
        // t1 is both whitelisted and blacklisted: the whitelist wins.
        let all = topics(&["t1", "t2", "t3"]);
        let selected = select_topics(&all, &opts(&["t1"], &["t1", "t2"]));
        assert_eq!(selected, topics(&["t1"]));
    }

    #[test]
    fn test_whitelist_preserves_input_order() {
        let all = topics(&["c", "a", "b"]);
        let selected = select_topics(&all, &opts(&["a", "b", "c"], &[]));
        assert_eq!(selected, topics(&["c", "a", "b"]));
    }

    #[test]
    fn test_whitelist_entry_absent_from_input() {
        let all = topics(&["t1"]);
        let selected = select_topics(&all, &opts(&["t1", "ghost"], &[]));
        assert_eq!(selected, topics(&["t1"]));
    }

    #[test]
    fn test_exclusion_of_everything_yields_empty() {
        let all = topics(&["t1", "t2"]);
        assert!(select_topics(&all, &opts(&[], &["t1", "t2"])).is_empty());
    }
}
