//! The mention corpus: pages, mentions and mention-relations.
//!
//! `Corpus` is the in-process form of the mention store. Mentions and
//! relations live in dense arenas addressed by [`MentionIdx`] and
//! [`RelationIdx`]; lookups by stable id and by page are rebuilt whenever the
//! corpus is deserialized or cleansed.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::extraction::Extraction;
use crate::mention::{
    add_run, Label, Mention, MentionId, MentionIdx, MentionRelation, Provenance, RelationId,
    RelationIdx,
};

/// Relation type linking a Person mention to each of its `titles`.
pub const HAS_TITLE: &str = "HAS_TITLE";

/// Derives the file id of a page: the page id without its last `_` segment.
///
/// `"rac_ww_1939_17"` belongs to file `"rac_ww_1939"`. A page id without any
/// underscore is its own file.
#[must_use]
pub fn file_id_from_page_id(page_id: &str) -> String {
    match page_id.rsplit_once('_') {
        Some((file, _)) => file.to_string(),
        None => page_id.to_string(),
    }
}

/// One segmented page as produced by document ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page id; the file id is this id without its last `_` segment.
    pub id: String,
    /// Position of the page within its file.
    pub page_idx: u32,
    /// Scanned page text.
    #[serde(default)]
    pub text: String,
}

/// Extraction status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Not yet sent to the extractor.
    #[default]
    Pending,
    /// Extraction output was parsed and stored.
    Processed,
    /// Extraction output was unusable; the page is retried by a later run.
    Failed,
}

/// Which pages an extraction run sends to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSelection {
    /// Pages without a usable extraction yet (pending or failed).
    #[default]
    Pending,
    /// Every page with text, including processed ones. A second run over
    /// all pages is what stability cleansing compares against.
    All,
}

/// A page of a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page id.
    pub id: String,
    /// Id of the file the page belongs to.
    pub file_id: String,
    /// Position of the page within its file.
    pub page_index: u32,
    /// Page text, absent for pages only known from mention provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Extraction status.
    #[serde(default)]
    pub status: PageStatus,
    /// Number of extractor calls made for this page.
    #[serde(default)]
    pub attempts: u32,
    /// Error of the latest failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Page {
    /// Provenance record for mentions extracted from this page.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        Provenance {
            page_id: self.id.clone(),
            file_id: self.file_id.clone(),
            page_index: self.page_index,
        }
    }
}

/// Optional properties of a mention-relation.
#[derive(Debug, Clone, Default)]
pub struct RelationProps {
    /// Sentiment reported by the extractor.
    pub sentiment: Option<String>,
    /// The extractor's `type` property (e.g. `meeting`, `phone`).
    pub conversation_type: Option<String>,
    /// Passthrough properties.
    pub extra: BTreeMap<String, String>,
}

/// Counters produced by [`Corpus::record_extraction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Mentions new to the corpus.
    pub mentions_added: usize,
    /// Mentions that already existed and gained the run.
    pub mentions_reproduced: usize,
    /// Relations new to the corpus.
    pub relations_added: usize,
    /// Relations that already existed and gained the run.
    pub relations_reproduced: usize,
    /// Relations whose endpoints are not entities of the same payload.
    pub dangling_relations: usize,
    /// Entities skipped because their name was blank.
    pub blank_entities: usize,
}

/// Counters produced by [`Corpus::cleanse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanseReport {
    /// Mentions not reproduced by the kept run.
    pub mentions_removed: usize,
    /// Relations dropped with a mention or not reproduced.
    pub relations_removed: usize,
}

#[derive(Debug, Deserialize)]
struct CorpusData {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    mentions: Vec<Mention>,
    #[serde(default)]
    relations: Vec<MentionRelation>,
}

/// Pages, mentions and mention-relations of one corpus snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CorpusData")]
pub struct Corpus {
    pages: Vec<Page>,
    mentions: Vec<Mention>,
    relations: Vec<MentionRelation>,

    #[serde(skip)]
    page_lookup: HashMap<String, usize>,
    #[serde(skip)]
    page_mentions: HashMap<String, Vec<MentionIdx>>,
    #[serde(skip)]
    mention_lookup: HashMap<MentionId, MentionIdx>,
    #[serde(skip)]
    relation_lookup: HashMap<RelationId, RelationIdx>,
}

impl From<CorpusData> for Corpus {
    fn from(data: CorpusData) -> Self {
        let mut corpus = Self {
            pages: data.pages,
            mentions: data.mentions,
            relations: data.relations,
            ..Self::default()
        };
        corpus.reindex();
        corpus
    }
}

impl Corpus {
    /// Creates an empty corpus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex(&mut self) {
        self.page_lookup = self
            .pages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        self.page_mentions.clear();
        self.mention_lookup.clear();
        for (i, m) in self.mentions.iter().enumerate() {
            let idx = MentionIdx::new(i);
            self.mention_lookup.insert(m.id.clone(), idx);
            self.page_mentions
                .entry(m.provenance.page_id.clone())
                .or_default()
                .push(idx);
        }
        self.relation_lookup = self
            .relations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), RelationIdx::new(i)))
            .collect();
    }

    /// Adds a page, or refreshes the index and text of an existing page.
    ///
    /// # Errors
    /// Returns `MissingField` when the page id is blank.
    pub fn add_page(&mut self, record: PageRecord) -> Result<(), ValidationError> {
        if record.id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "page.id".to_string(),
            });
        }
        let file_id = file_id_from_page_id(&record.id);
        if let Some(&i) = self.page_lookup.get(&record.id) {
            let page = &mut self.pages[i];
            page.page_index = record.page_idx;
            page.file_id = file_id;
            page.text = Some(record.text);
            return Ok(());
        }
        self.page_lookup.insert(record.id.clone(), self.pages.len());
        self.pages.push(Page {
            id: record.id,
            file_id,
            page_index: record.page_idx,
            text: Some(record.text),
            status: PageStatus::Pending,
            attempts: 0,
            last_error: None,
        });
        Ok(())
    }

    fn ensure_page(&mut self, provenance: &Provenance) {
        if self.page_lookup.contains_key(&provenance.page_id) {
            return;
        }
        self.page_lookup
            .insert(provenance.page_id.clone(), self.pages.len());
        self.pages.push(Page {
            id: provenance.page_id.clone(),
            file_id: provenance.file_id.clone(),
            page_index: provenance.page_index,
            text: None,
            status: PageStatus::Processed,
            attempts: 0,
            last_error: None,
        });
    }

    /// Returns all pages in insertion order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Looks up a page by id.
    #[must_use]
    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.page_lookup.get(page_id).map(|&i| &self.pages[i])
    }

    /// Returns the pages with text that `selection` picks, ordered by page
    /// index.
    #[must_use]
    pub fn select_pages(&self, selection: PageSelection) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self
            .pages
            .iter()
            .filter(|p| p.text.is_some())
            .filter(|p| selection == PageSelection::All || p.status != PageStatus::Processed)
            .collect();
        pages.sort_by(|a, b| (a.page_index, &a.id).cmp(&(b.page_index, &b.id)));
        pages
    }

    /// Records a failed extraction attempt.
    ///
    /// # Errors
    /// Returns `UnknownPage` when the page does not exist.
    pub fn mark_failed(&mut self, page_id: &str, reason: &str) -> Result<(), ValidationError> {
        let page = self.page_mut(page_id)?;
        page.status = PageStatus::Failed;
        page.attempts += 1;
        page.last_error = Some(reason.to_string());
        Ok(())
    }

    fn page_mut(&mut self, page_id: &str) -> Result<&mut Page, ValidationError> {
        let i = *self
            .page_lookup
            .get(page_id)
            .ok_or_else(|| ValidationError::UnknownPage {
                page_id: page_id.to_string(),
            })?;
        Ok(&mut self.pages[i])
    }

    /// Returns all mentions, indexable by [`MentionIdx::index`].
    #[must_use]
    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }

    /// Looks up a mention by arena index.
    #[must_use]
    pub fn mention(&self, idx: MentionIdx) -> Option<&Mention> {
        self.mentions.get(idx.index())
    }

    /// Looks up a mention by stable id.
    #[must_use]
    pub fn mention_by_id(&self, id: &MentionId) -> Option<MentionIdx> {
        self.mention_lookup.get(id).copied()
    }

    /// Returns the mentions of a page in insertion order.
    #[must_use]
    pub fn mentions_on_page(&self, page_id: &str) -> &[MentionIdx] {
        self.page_mentions
            .get(page_id)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Returns all mention-relations, indexable by [`RelationIdx::index`].
    #[must_use]
    pub fn relations(&self) -> &[MentionRelation] {
        &self.relations
    }

    /// Number of mentions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// Returns true if the corpus holds no mentions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// Adds a mention, merging it with an existing mention of the same id.
    ///
    /// The mention's page is created from its provenance if unknown. Runs of
    /// the incoming mention are unioned into the stored one.
    pub fn add_mention(&mut self, mention: Mention) -> MentionIdx {
        if let Some(&idx) = self.mention_lookup.get(&mention.id) {
            let stored = &mut self.mentions[idx.index()];
            for run in &mention.runs {
                add_run(&mut stored.runs, run);
            }
            if stored.entity_type.is_none() {
                stored.entity_type = mention.entity_type;
            }
            return idx;
        }
        self.ensure_page(&mention.provenance);
        let idx = MentionIdx::new(self.mentions.len());
        self.mention_lookup.insert(mention.id.clone(), idx);
        self.page_mentions
            .entry(mention.provenance.page_id.clone())
            .or_default()
            .push(idx);
        self.mentions.push(mention);
        idx
    }

    /// Adds a mention-relation, merging by `(source, rel_type, target)`.
    ///
    /// Returns `None` when either endpoint is not a mention of this corpus.
    /// Properties of a reproduced relation are overwritten by the newest
    /// values when present.
    pub fn add_relation(
        &mut self,
        source: MentionIdx,
        rel_type: &str,
        target: MentionIdx,
        props: RelationProps,
        run: Option<&str>,
    ) -> Option<RelationIdx> {
        let source_id = self.mention(source)?.id.clone();
        let target_id = self.mention(target)?.id.clone();
        let id = RelationId::derive(&source_id, rel_type, &target_id);

        if let Some(&idx) = self.relation_lookup.get(&id) {
            let stored = &mut self.relations[idx.index()];
            if let Some(run) = run {
                add_run(&mut stored.runs, run);
            }
            if props.sentiment.is_some() {
                stored.sentiment = props.sentiment;
            }
            if props.conversation_type.is_some() {
                stored.conversation_type = props.conversation_type;
            }
            stored.extra.extend(props.extra);
            return Some(idx);
        }

        let idx = RelationIdx::new(self.relations.len());
        self.relation_lookup.insert(id.clone(), idx);
        self.relations.push(MentionRelation {
            id,
            source,
            target,
            rel_type: rel_type.to_string(),
            sentiment: props.sentiment,
            conversation_type: props.conversation_type,
            runs: run.map(|r| vec![r.to_string()]).unwrap_or_default(),
            extra: props.extra,
        });
        Some(idx)
    }

    /// Stores one parsed extraction payload for a page under `run`.
    ///
    /// Entity titles become Title mentions on the same page linked by a
    /// `HAS_TITLE` relation. Relations whose endpoints are not entities of
    /// this payload are dropped and counted. The page is marked processed.
    ///
    /// # Errors
    /// Returns `UnknownPage` when the page was never added.
    pub fn record_extraction(
        &mut self,
        page_id: &str,
        extraction: &Extraction,
        run: &str,
    ) -> Result<RecordOutcome, ValidationError> {
        let provenance = self
            .page(page_id)
            .ok_or_else(|| ValidationError::UnknownPage {
                page_id: page_id.to_string(),
            })?
            .provenance();

        let mut outcome = RecordOutcome::default();
        let mut local: HashMap<&str, MentionIdx> = HashMap::new();

        for entity in &extraction.entities {
            if entity.name.trim().is_empty() {
                outcome.blank_entities += 1;
                tracing::warn!(page = page_id, local_id = %entity.local_id, "skipping entity with blank name");
                continue;
            }

            let mut mention = Mention::new(
                entity.local_id.clone(),
                entity.name.trim(),
                entity.label.clone(),
                provenance.clone(),
            );
            mention.titles.clone_from(&entity.titles);
            mention.entity_type.clone_from(&entity.entity_type);
            mention.extra.clone_from(&entity.extra);
            mention.runs.push(run.to_string());

            let existed = self.mention_lookup.contains_key(&mention.id);
            let idx = self.add_mention(mention);
            if existed {
                outcome.mentions_reproduced += 1;
            } else {
                outcome.mentions_added += 1;
            }
            local.insert(entity.local_id.as_str(), idx);

            for (n, title) in entity.titles.iter().enumerate() {
                let title = title.trim();
                if title.is_empty() {
                    continue;
                }
                let mut title_mention = Mention::new(
                    format!("{}#title{n}", entity.local_id),
                    title,
                    Label::Title,
                    provenance.clone(),
                );
                title_mention.runs.push(run.to_string());
                let title_idx = self.add_mention(title_mention);
                self.add_relation(idx, HAS_TITLE, title_idx, RelationProps::default(), Some(run));
            }
        }

        for relation in &extraction.relations {
            let (Some(&source), Some(&target)) = (
                local.get(relation.source_id.as_str()),
                local.get(relation.target_id.as_str()),
            ) else {
                outcome.dangling_relations += 1;
                tracing::debug!(
                    page = page_id,
                    source = %relation.source_id,
                    target = %relation.target_id,
                    rel_type = %relation.rel_type,
                    "dropping relation with unknown endpoint"
                );
                continue;
            };

            let existed = self
                .relation_lookup
                .contains_key(&RelationId::derive(
                    &self.mentions[source.index()].id,
                    &relation.rel_type,
                    &self.mentions[target.index()].id,
                ));
            let props = RelationProps {
                sentiment: relation.sentiment.clone(),
                conversation_type: relation.conversation_type.clone(),
                extra: relation.extra.clone(),
            };
            if self
                .add_relation(source, &relation.rel_type, target, props, Some(run))
                .is_some()
            {
                if existed {
                    outcome.relations_reproduced += 1;
                } else {
                    outcome.relations_added += 1;
                }
            }
        }

        let page = self.page_mut(page_id)?;
        page.status = PageStatus::Processed;
        page.attempts += 1;
        page.last_error = None;
        Ok(outcome)
    }

    /// Removes everything not reproduced by `keep_run`.
    ///
    /// Mentions missing `keep_run` are deleted together with every relation
    /// touching them; relations missing `keep_run` are deleted even when both
    /// endpoints survive. Arena indices are reassigned.
    pub fn cleanse(&mut self, keep_run: &str) -> CleanseReport {
        let mut remap: Vec<Option<MentionIdx>> = Vec::with_capacity(self.mentions.len());
        let mut kept = Vec::with_capacity(self.mentions.len());
        for mention in std::mem::take(&mut self.mentions) {
            if mention.seen_in(keep_run) {
                remap.push(Some(MentionIdx::new(kept.len())));
                kept.push(mention);
            } else {
                remap.push(None);
            }
        }
        let mentions_removed = remap.iter().filter(|m| m.is_none()).count();
        self.mentions = kept;

        let before = self.relations.len();
        self.relations = std::mem::take(&mut self.relations)
            .into_iter()
            .filter_map(|mut r| {
                let source = remap.get(r.source.index()).copied().flatten()?;
                let target = remap.get(r.target.index()).copied().flatten()?;
                if !r.seen_in(keep_run) {
                    return None;
                }
                r.source = source;
                r.target = target;
                Some(r)
            })
            .collect();
        let relations_removed = before - self.relations.len();

        self.reindex();
        CleanseReport {
            mentions_removed,
            relations_removed,
        }
    }
}
