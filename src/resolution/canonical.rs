//! Canonical name assignment per equivalence class.

use serde::{Deserialize, Serialize};

use crate::mention::MentionIdx;
use crate::resolution::NameTable;

/// Counters of one canonical assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReport {
    /// Classes with at least two members.
    pub classes: usize,
    /// Mentions whose name changed.
    pub renamed: usize,
}

/// Picks the representative of a set of names: the longest by character
/// count, ties broken by the lexicographically smallest.
#[must_use]
pub fn representative<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates.into_iter().min_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    })
}

/// Propagates each class's representative name to all of its members.
pub fn assign_canonical(names: &mut NameTable, classes: &[Vec<usize>]) -> CanonicalReport {
    let mut report = CanonicalReport::default();
    for class in classes.iter().filter(|c| c.len() > 1) {
        report.classes += 1;
        let Some(winner) = representative(class.iter().map(|&i| names.get(MentionIdx::new(i))))
            .map(str::to_string)
        else {
            continue;
        };
        for &member in class {
            if names.set(MentionIdx::new(member), &winner) {
                report.renamed += 1;
            }
        }
        tracing::debug!(members = class.len(), name = %winner, "canonical name assigned");
    }
    report
}
