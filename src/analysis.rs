//! Graph analysis over the canonical Person interaction graph.
//!
//! The interaction graph keeps Person-Person relations of the configured
//! types, minus the excluded names. Weakly connected components come from
//! the graph store; PageRank then runs on the largest component, treating
//! every relation as undirected.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::KgResult;
use crate::kg::NodeKey;
use crate::mention::Label;
use crate::storage::GraphStore;

/// A node of the largest component with its PageRank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    /// Canonical node key.
    pub key: NodeKey,
    /// Display name of the node.
    pub name: String,
    /// PageRank score; scores of the component sum to one.
    pub score: f64,
}

/// Result of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Interaction relations that entered the graph.
    pub interaction_edges: usize,
    /// Weakly connected components of the interaction graph.
    pub components: usize,
    /// Node count of the component that was ranked.
    pub largest_component_size: usize,
    /// PageRank iterations actually run.
    pub iterations: usize,
    /// Members of the largest component, highest score first.
    pub ranks: Vec<RankedNode>,
}

/// Computes components and PageRank for the graph held by `store`.
///
/// # Errors
/// Returns storage errors from reading the graph.
pub fn analyze(store: &dyn GraphStore, config: &AnalysisConfig) -> KgResult<AnalysisReport> {
    let _span = tracing::info_span!("analysis").entered();

    let excluded: HashSet<String> = config
        .excluded_names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .collect();
    let keep = |key: &NodeKey| key.label == Label::Person && !excluded.contains(&key.name);

    let edges: Vec<(NodeKey, NodeKey)> = store
        .relations()?
        .into_iter()
        .filter(|r| config.interaction_types.iter().any(|t| *t == r.key.rel_type))
        .filter(|r| keep(&r.key.source) && keep(&r.key.target))
        .map(|r| (r.key.source, r.key.target))
        .collect();

    let components = store.connected_components(&edges)?;
    let mut sizes: Vec<usize> = Vec::new();
    for &c in components.values() {
        if c >= sizes.len() {
            sizes.resize(c + 1, 0);
        }
        sizes[c] += 1;
    }

    let mut report = AnalysisReport {
        interaction_edges: edges.len(),
        components: sizes.len(),
        ..AnalysisReport::default()
    };

    // Ties go to the component holding the smallest key.
    let Some(largest) = sizes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
    else {
        tracing::info!("interaction graph is empty");
        return Ok(report);
    };

    let mut members: Vec<&NodeKey> = components
        .iter()
        .filter(|(_, &c)| c == largest)
        .map(|(k, _)| k)
        .collect();
    members.sort();
    let index: HashMap<&NodeKey, usize> = members.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut adjacency = vec![Vec::new(); members.len()];
    for (a, b) in &edges {
        if let (Some(&i), Some(&j)) = (index.get(a), index.get(b)) {
            if i != j {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let (scores, iterations) = pagerank(&adjacency, config.damping, config.max_iterations, config.tolerance);

    let names: HashMap<NodeKey, String> = store
        .nodes()?
        .into_iter()
        .map(|n| (n.key, n.name))
        .collect();
    let mut ranks: Vec<RankedNode> = members
        .iter()
        .zip(scores)
        .map(|(key, score)| RankedNode {
            key: (*key).clone(),
            name: names.get(*key).cloned().unwrap_or_else(|| key.name.clone()),
            score,
        })
        .collect();
    ranks.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));

    report.largest_component_size = members.len();
    report.iterations = iterations;
    report.ranks = ranks;

    tracing::info!(
        edges = report.interaction_edges,
        components = report.components,
        largest = report.largest_component_size,
        iterations = report.iterations,
        "interaction graph analyzed"
    );
    Ok(report)
}

/// PageRank over an undirected adjacency list.
///
/// Scores start uniform and sum to 1. Nodes without neighbours spread their
/// score evenly over all nodes. Iteration stops after `max_iterations` or
/// once the L1 change of a step falls below `tolerance`. Returns the scores
/// and the number of iterations run.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pagerank(adjacency: &[Vec<usize>], damping: f64, max_iterations: usize, tolerance: f64) -> (Vec<f64>, usize) {
    let n = adjacency.len();
    if n == 0 {
        return (Vec::new(), 0);
    }
    let nf = n as f64;
    let mut scores = vec![1.0 / nf; n];
    let mut iterations = 0;

    for _ in 0..max_iterations {
        iterations += 1;
        let dangling: f64 = adjacency
            .iter()
            .zip(&scores)
            .filter(|(neighbours, _)| neighbours.is_empty())
            .map(|(_, s)| s)
            .sum();
        let base = (1.0 - damping) / nf + damping * dangling / nf;

        let mut next = vec![base; n];
        for (i, neighbours) in adjacency.iter().enumerate() {
            if neighbours.is_empty() {
                continue;
            }
            let share = damping * scores[i] / neighbours.len() as f64;
            for &j in neighbours {
                next[j] += share;
            }
        }

        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        if delta < tolerance {
            break;
        }
    }
    (scores, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kg::{CanonicalEntity, CanonicalRelation, RelationKey};
    use crate::storage::InMemoryGraphStore;

    fn person(name: &str) -> NodeKey {
        NodeKey::new(Label::Person, name)
    }

    fn store_with(edges: &[(&str, &str, &str)]) -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        for (a, rel, b) in edges {
            for name in [a, b] {
                let key = person(name);
                store
                    .merge_node(&key, CanonicalEntity::new(key.clone(), *name), &mut |_| {})
                    .unwrap();
            }
            let key = RelationKey {
                source: person(a),
                rel_type: (*rel).to_string(),
                target: person(b),
            };
            store
                .merge_relation(&key, CanonicalRelation::new(key.clone()), &mut |r| r.count += 1)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_pagerank_star() {
        let adjacency = vec![vec![1, 2, 3], vec![0], vec![0], vec![0]];
        let (scores, _) = pagerank(&adjacency, 0.85, 100, 1e-9);
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(scores[0] > scores[1]);
        assert!((scores[1] - scores[2]).abs() < 1e-12);
    }

    #[test]
    fn test_pagerank_dangling_keeps_mass() {
        let adjacency = vec![vec![1], vec![0], vec![]];
        let (scores, _) = pagerank(&adjacency, 0.85, 100, 0.0);
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(scores[2] < scores[0]);
    }

    #[test]
    fn test_pagerank_empty() {
        let (scores, iterations) = pagerank(&[], 0.85, 100, 1e-7);
        assert!(scores.is_empty());
        assert_eq!(iterations, 0);
    }

    #[test]
    fn test_analyze_largest_component() {
        let store = store_with(&[
            ("Vannevar Bush", "TALKED_WITH", "Karl T. Compton"),
            ("Karl T. Compton", "WORKS_WITH", "Ernest Lawrence"),
            ("Vannevar Bush", "TALKED_ABOUT", "Ernest Lawrence"),
            ("James B. Conant", "TALKED_WITH", "George E. Hale"),
            ("Max Mason", "STUDENT_OF", "Vannevar Bush"),
        ]);
        let report = analyze(&store, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.interaction_edges, 4);
        assert_eq!(report.components, 2);
        assert_eq!(report.largest_component_size, 3);

        let names: Vec<&str> = report.ranks.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"Karl T. Compton"));
        assert!(!names.contains(&"Max Mason"));
        for r in &report.ranks {
            assert!((r.score - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_analyze_excludes_author() {
        let store = store_with(&[
            ("Warren Weaver", "TALKED_WITH", "Max Mason"),
            ("Warren Weaver", "TALKED_WITH", "Frank Aydelotte"),
            ("Max Mason", "TALKED_WITH", "Raymond Fosdick"),
        ]);
        let report = analyze(&store, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.interaction_edges, 1);
        assert_eq!(report.largest_component_size, 2);
        assert!(report.ranks.iter().all(|r| r.key != person("Warren Weaver")));
    }

    #[test]
    fn test_analyze_ranks_hub_first() {
        let store = store_with(&[
            ("A Hub", "TALKED_WITH", "B One"),
            ("A Hub", "TALKED_WITH", "C Two"),
            ("D Three", "TALKED_ABOUT", "A Hub"),
        ]);
        let report = analyze(&store, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.ranks[0].name, "A Hub");
        assert!(report.iterations <= 100);
    }

    #[test]
    fn test_analyze_empty_graph() {
        let store = InMemoryGraphStore::new();
        let report = analyze(&store, &AnalysisConfig::default()).unwrap();
        assert_eq!(report, AnalysisReport::default());
    }
}
