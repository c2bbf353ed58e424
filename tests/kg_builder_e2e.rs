//! KG Builder tests over resolved corpora: schema filtering, count
//! accumulation and containment similarity.

use kyrokg::corpus::{file_id_from_page_id, Corpus, RelationProps};
use kyrokg::kg::{BuildReport, KgBuilder, SimilarityKind};
use kyrokg::resolution::{resolve, NameTable};
use kyrokg::{GraphStore, InMemoryGraphStore, KnowledgeGraph, Label, Mention, MentionIdx, PipelineConfig, Provenance};

struct Page<'a> {
    corpus: &'a mut Corpus,
    id: String,
    index: u32,
    next: usize,
}

impl<'a> Page<'a> {
    fn new(corpus: &'a mut Corpus, id: &str, index: u32) -> Self {
        Self {
            corpus,
            id: id.to_string(),
            index,
            next: 0,
        }
    }

    fn mention(&mut self, name: &str, label: Label) -> MentionIdx {
        self.next += 1;
        let prov = Provenance {
            page_id: self.id.clone(),
            file_id: file_id_from_page_id(&self.id),
            page_index: self.index,
        };
        self.corpus
            .add_mention(Mention::new(self.next.to_string(), name, label, prov))
    }

    fn relate(&mut self, source: MentionIdx, rel_type: &str, target: MentionIdx) {
        self.corpus
            .add_relation(source, rel_type, target, RelationProps::default(), Some("run-1"))
            .unwrap();
    }
}

fn build(corpus: &Corpus) -> (KnowledgeGraph, BuildReport) {
    let config = PipelineConfig::default();
    let mut names = NameTable::seed(corpus);
    resolve(corpus, &mut names, &config);
    let store = InMemoryGraphStore::new();
    let report = KgBuilder::new(&store, &config).build(corpus, &names).unwrap();
    (store.snapshot().unwrap(), report)
}

#[test]
fn test_mentions_becomes_talked_with() {
    let mut corpus = Corpus::new();
    let mut page = Page::new(&mut corpus, "ww_1933_2", 2);
    let mason = page.mention("Max Mason", Label::Person);
    let fosdick = page.mention("Raymond Fosdick", Label::Person);
    page.relate(mason, "MENTIONS", fosdick);

    let (graph, report) = build(&corpus);
    assert_eq!(report.relations_merged, 1);
    assert_eq!(graph.relations_of_type("MENTIONS").count(), 0);
    let talked: Vec<_> = graph.relations_of_type("TALKED_WITH").collect();
    assert_eq!(talked.len(), 1);
    assert_eq!(talked[0].key.source.name, "max mason");
}

#[test]
fn test_occupation_title_is_dropped() {
    let mut corpus = Corpus::new();
    let mut page = Page::new(&mut corpus, "ww_1933_3", 3);
    let physics = page.mention("Physics", Label::Occupation);
    let professor = page.mention("Professor", Label::Title);
    page.relate(physics, "HAS_TITLE", professor);

    let (graph, report) = build(&corpus);
    assert_eq!(report.schema_dropped, 1);
    assert!(graph.relations.is_empty());
    assert!(graph.nodes.is_empty());
}

#[test]
fn test_count_accumulates_across_pages() {
    let mut corpus = Corpus::new();
    for index in 1..=3 {
        let mut page = Page::new(&mut corpus, &format!("ww_1934_{index}"), index);
        let compton = page.mention("Karl T. Compton", Label::Person);
        let mit = page.mention("MIT", Label::Organization);
        page.relate(compton, "WORKS_FOR", mit);
    }

    let (graph, report) = build(&corpus);
    assert_eq!(report.relations_merged, 3);
    let works_for: Vec<_> = graph.relations_of_type("WORKS_FOR").collect();
    assert_eq!(works_for.len(), 1);
    assert_eq!(works_for[0].count, 3);
    assert_eq!(works_for[0].orig_ids.len(), 3);
    assert_eq!(graph.node(&Label::Person, "Karl T. Compton").unwrap().count, 3);
    assert_eq!(graph.node(&Label::Organization, "mit").unwrap().count, 3);
}

#[test]
fn test_occupation_containment_is_directional() {
    let mut corpus = Corpus::new();
    let mut page = Page::new(&mut corpus, "ww_1935_8", 8);
    let lawrence = page.mention("Ernest Lawrence", Label::Person);
    for occupation in ["Cyclotron Research", "cyclotron", "Research"] {
        let occ = page.mention(occupation, Label::Occupation);
        page.relate(lawrence, "WORKS_ON", occ);
    }

    let (graph, report) = build(&corpus);
    assert_eq!(report.similarity_edges, 1);
    let edge = &graph.similarities[0];
    assert_eq!(edge.kind, SimilarityKind::SimilarOccupation);
    assert_eq!(edge.from.name, "cyclotron research");
    assert_eq!(edge.to.name, "cyclotron");
    assert!(graph.node(&Label::Occupation, "research").is_some());
}

#[test]
fn test_organization_stopwords() {
    let mut corpus = Corpus::new();
    let mut page = Page::new(&mut corpus, "ww_1936_1", 1);
    let conant = page.mention("James B. Conant", Label::Person);
    for org in ["Harvard University", "Harvard", "University"] {
        let o = page.mention(org, Label::Organization);
        page.relate(conant, "WORKS_FOR", o);
    }

    let (graph, _) = build(&corpus);
    let edges: Vec<(&str, &str)> = graph
        .similarities
        .iter()
        .map(|e| (e.from.name.as_str(), e.to.name.as_str()))
        .collect();
    assert_eq!(edges, vec![("harvard university", "harvard")]);
}

#[test]
fn test_technology_renamed_to_occupation() {
    let mut corpus = Corpus::new();
    let mut page = Page::new(&mut corpus, "ww_1937_5", 5);
    let bush = page.mention("Vannevar Bush", Label::Person);
    let analyzer = page.mention("Differential Analyzer", Label::Other("Technology".to_string()));
    page.relate(bush, "WORKS_ON", analyzer);

    let (graph, report) = build(&corpus);
    assert_eq!(report.schema_dropped, 0);
    assert!(graph.node(&Label::Occupation, "differential analyzer").is_some());
    assert_eq!(graph.nodes_with_label(&Label::Other("Technology".to_string())).count(), 0);
}

#[test]
fn test_cross_page_relation_is_dangling() {
    let mut corpus = Corpus::new();
    let weaver = Page::new(&mut corpus, "ww_1938_1", 1).mention("Warren Weaver", Label::Person);
    let mason = Page::new(&mut corpus, "ww_1938_2", 2).mention("Max Mason", Label::Person);
    corpus
        .add_relation(weaver, "TALKED_WITH", mason, RelationProps::default(), None)
        .unwrap();

    let (graph, report) = build(&corpus);
    assert_eq!(report.dangling, 1);
    assert!(graph.relations.is_empty());
}
