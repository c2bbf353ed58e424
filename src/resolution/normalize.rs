//! Name normalization.
//!
//! Person names lose leading honorifics ("Dr. George E. Hale" becomes
//! "George E. Hale"); Occupation names are lower-cased. Other labels keep
//! their surface name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::NormalizerConfig;
use crate::corpus::Corpus;
use crate::mention::{Label, MentionIdx};
use crate::resolution::NameTable;

/// Counters of one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Person names that lost an honorific.
    pub persons_stripped: usize,
    /// Occupation names that changed case.
    pub occupations_lowered: usize,
}

/// Case-insensitive honorific matcher. A trailing `.` is optional on both
/// sides, so `dr.` also matches `Dr`.
#[derive(Debug, Clone)]
pub struct Honorifics {
    bare: HashSet<String>,
}

impl Honorifics {
    /// Builds a matcher from configured tokens.
    #[must_use]
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self {
            bare: tokens
                .iter()
                .map(|t| bare(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Returns true if `token` is an honorific.
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        self.bare.contains(&bare(token))
    }

    /// Strips leading honorific tokens, always keeping the last token.
    ///
    /// Returns `None` when the name has no leading honorific.
    #[must_use]
    pub fn strip(&self, name: &str) -> Option<String> {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        let mut start = 0;
        while tokens.len() - start > 1 && self.matches(tokens[start]) {
            start += 1;
        }
        (start > 0).then(|| tokens[start..].join(" "))
    }
}

fn bare(token: &str) -> String {
    token.trim().trim_end_matches('.').to_lowercase()
}

/// Rewrites every Person and Occupation name in `names`.
///
/// Stripping reads the current normalized name, so a second pass over its
/// own output changes nothing.
pub fn normalize(corpus: &Corpus, names: &mut NameTable, config: &NormalizerConfig) -> NormalizeReport {
    let honorifics = Honorifics::new(&config.honorifics);
    let mut report = NormalizeReport::default();

    for (i, mention) in corpus.mentions().iter().enumerate() {
        let idx = MentionIdx::new(i);
        match mention.label {
            Label::Person => {
                if let Some(stripped) = honorifics.strip(names.get(idx)) {
                    if names.set(idx, &stripped) {
                        tracing::debug!(mention = %mention.id, from = %mention.name, to = %stripped, "stripped honorific");
                        report.persons_stripped += 1;
                    }
                }
            }
            Label::Occupation => {
                let lowered = names.get(idx).to_lowercase();
                if names.set(idx, &lowered) {
                    report.occupations_lowered += 1;
                }
            }
            _ => {}
        }
    }

    report
}
