//! Finding aggregation
//!
//! Merges findings that share a detector id and ranks the result by impact.

use indexmap::IndexMap;
use plancheck_core::Finding;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Merges raw findings by id and sorts them by impact, highest first.
///
/// The first finding of each id is kept whole. Later findings contribute
/// only evidence at locations the group has not seen yet, and raise the
/// group's impact if theirs is higher. Groups of equal impact keep the
/// order in which their ids first appeared, so the output is deterministic
/// and aggregating it again returns it unchanged.
pub fn aggregate(raw: Vec<Finding>) -> Vec<Finding> {
    let mut groups: IndexMap<String, Finding> = IndexMap::new();

    for finding in raw {
        match groups.get_mut(&finding.id) {
            Some(group) => merge_into(group, finding),
            None => {
                groups.insert(finding.id.clone(), finding);
            }
        }
    }

    let mut findings: Vec<Finding> = groups.into_values().collect();
    findings.sort_by_key(|f| Reverse(f.impact));
    findings
}

fn merge_into(group: &mut Finding, other: Finding) {
    let seen: HashSet<String> = group.evidence.iter().map(|e| e.location.clone()).collect();
    group.evidence.extend(
        other
            .evidence
            .into_iter()
            .filter(|e| !seen.contains(&e.location)),
    );
    group.impact = group.impact.max(other.impact);
}
