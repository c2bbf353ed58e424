//! Proximity resolution of surname-only Person mentions.
//!
//! A diary entry names a person in full once ("George E. Hale") and by
//! surname afterwards ("Hale"), often continuing onto the next page. Two rules
//! propagate the full name:
//!
//! - same page: `B` takes `A`'s name when `A` ends with `" " + B`
//! - adjacent page: the same, with `A` on page `i` and `B` on page `i + 1` of
//!   the same file
//!
//! Each rule pass evaluates every candidate against a snapshot of the names
//! and applies all assignments at once. When several full names qualify, the
//! last one in mention order wins and the mention is counted as ambiguous.
//! Rules repeat until neither changes anything; every assignment lengthens a
//! name, so the loop terminates.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::mention::MentionIdx;
use crate::resolution::NameTable;

/// Names of at most this many characters never take part in a match.
pub const MIN_NAME_CHARS: usize = 2;

/// Counters of one proximity resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityReport {
    /// Assignments made by the same-page rule.
    pub same_page: usize,
    /// Assignments made by the adjacent-page rule.
    pub adjacent_page: usize,
    /// Mentions that had more than one distinct full-name candidate.
    pub ambiguous: usize,
    /// Rounds run until the fixed point.
    pub rounds: usize,
}

/// Mentions on one side of a rule: `sources` may lend their name to `targets`.
#[derive(Debug)]
struct Scope {
    sources: Vec<MentionIdx>,
    targets: Vec<MentionIdx>,
}

fn person_mentions(corpus: &Corpus, page_id: &str) -> Vec<MentionIdx> {
    corpus
        .mentions_on_page(page_id)
        .iter()
        .copied()
        .filter(|&idx| corpus.mention(idx).is_some_and(|m| m.is_person()))
        .collect()
}

fn same_page_scopes(corpus: &Corpus) -> Vec<Scope> {
    corpus
        .pages()
        .iter()
        .map(|page| person_mentions(corpus, &page.id))
        .filter(|persons| persons.len() > 1)
        .map(|persons| Scope {
            sources: persons.clone(),
            targets: persons,
        })
        .collect()
}

fn adjacent_page_scopes(corpus: &Corpus) -> Vec<Scope> {
    let mut files: BTreeMap<&str, BTreeMap<u32, Vec<MentionIdx>>> = BTreeMap::new();
    for page in corpus.pages() {
        let persons = person_mentions(corpus, &page.id);
        files
            .entry(page.file_id.as_str())
            .or_default()
            .entry(page.page_index)
            .or_default()
            .extend(persons);
    }

    let mut scopes = Vec::new();
    for pages in files.values() {
        for (&index, sources) in pages {
            let Some(next) = index.checked_add(1) else {
                continue;
            };
            if let Some(targets) = pages.get(&next) {
                if !sources.is_empty() && !targets.is_empty() {
                    scopes.push(Scope {
                        sources: sources.clone(),
                        targets: targets.clone(),
                    });
                }
            }
        }
    }
    scopes
}

/// Returns the name `target` should take, if any, and whether more than one
/// distinct name qualified.
fn pick_full_name<'a>(names: &'a NameTable, scope: &Scope, target: MentionIdx) -> (Option<&'a str>, bool) {
    let short = names.get(target);
    if short.chars().count() <= MIN_NAME_CHARS {
        return (None, false);
    }
    let suffix = format!(" {short}");

    let mut chosen: Option<&str> = None;
    let mut ambiguous = false;
    for &source in &scope.sources {
        if source == target {
            continue;
        }
        let full = names.get(source);
        if full.ends_with(&suffix) {
            if chosen.is_some_and(|c| c != full) {
                ambiguous = true;
            }
            chosen = Some(full);
        }
    }
    (chosen, ambiguous)
}

fn apply_rule(names: &mut NameTable, scopes: &[Scope], ambiguous: &mut HashSet<MentionIdx>) -> usize {
    let mut assignments: Vec<(MentionIdx, String)> = Vec::new();
    for scope in scopes {
        for &target in &scope.targets {
            let (chosen, is_ambiguous) = pick_full_name(names, scope, target);
            if is_ambiguous {
                ambiguous.insert(target);
            }
            if let Some(full) = chosen {
                assignments.push((target, full.to_string()));
            }
        }
    }

    let mut changed = 0;
    for (target, full) in assignments {
        if names.set(target, &full) {
            tracing::debug!(mention = %target, to = %full, "surname resolved by proximity");
            changed += 1;
        }
    }
    changed
}

/// Runs the same-page and adjacent-page rules to a fixed point.
pub fn resolve_proximity(corpus: &Corpus, names: &mut NameTable) -> ProximityReport {
    let same_page = same_page_scopes(corpus);
    let adjacent = adjacent_page_scopes(corpus);
    let mut ambiguous = HashSet::new();
    let mut report = ProximityReport::default();

    loop {
        report.rounds += 1;
        let mut round_changes = 0;
        loop {
            let changed = apply_rule(names, &same_page, &mut ambiguous);
            report.same_page += changed;
            round_changes += changed;
            if changed == 0 {
                break;
            }
        }
        let changed = apply_rule(names, &adjacent, &mut ambiguous);
        report.adjacent_page += changed;
        round_changes += changed;
        if round_changes == 0 {
            break;
        }
    }

    report.ambiguous = ambiguous.len();
    report
}
