//! Bounded multi-hop traversal.
//!
//! Breadth-first expansion over whitelisted relationship types, one store
//! round trip per level. The first time a document is reached is along a
//! shortest path, so `hop_count` is the shortest distance from any matched
//! entity. Every edge leaving the frontier is examined, so a busy node never
//! hides a shorter path. Nodes are visited once per start entity and each
//! level's frontier is capped.

use super::RetrievalStrategy;
use crate::domain::graph::{Edge, RelationType};
use crate::domain::retrieval::{Strategy, StrategyEvidence, StrategyHit};
use crate::error::RetrievalError;
use crate::store::{EdgeFilter, GraphStore, QueryShape, resolve_entities};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

pub const MIN_TRAVERSAL_DEPTH: u8 = 1;
pub const MAX_TRAVERSAL_DEPTH: u8 = 5;

/// Entity labels / edge types kept in a reported path.
pub const MAX_PATH_ENTRIES: usize = 5;

/// Paths carried from one level to the next.
const MAX_FRONTIER: usize = 256;

// =============================================================================
// Traversal Depth
// =============================================================================

/// A traversal depth validated to lie in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraversalDepth(u8);

impl TraversalDepth {
    pub fn new(depth: u8) -> Result<Self, RetrievalError> {
        if (MIN_TRAVERSAL_DEPTH..=MAX_TRAVERSAL_DEPTH).contains(&depth) {
            Ok(Self(depth))
        } else {
            Err(RetrievalError::InvalidDepth(depth))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TraversalDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Strategy
// =============================================================================

#[derive(Debug, Clone)]
pub struct MultihopTraversal {
    depth: TraversalDepth,
    limit: usize,
    timeout: Duration,
}

impl MultihopTraversal {
    pub fn new(depth: TraversalDepth, limit: usize, timeout: Duration) -> Self {
        Self {
            depth,
            limit,
            timeout,
        }
    }
}

/// A partial path from one start entity.
#[derive(Debug, Clone)]
struct PathState {
    start: usize,
    node: String,
    labels: Vec<String>,
    relations: Vec<RelationType>,
    score: f32,
}

#[async_trait]
impl RetrievalStrategy for MultihopTraversal {
    fn kind(&self) -> Strategy {
        Strategy::Multihop
    }

    fn shape(&self) -> QueryShape {
        QueryShape::MultihopTraversal
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn retrieve(
        &self,
        store: &dyn GraphStore,
        entities: &[String],
    ) -> Result<Vec<StrategyHit>> {
        let matches = resolve_entities(store, entities, self.limit).await?;

        let mut visited: HashSet<(usize, String)> = HashSet::new();
        let mut frontier: Vec<PathState> = matches
            .iter()
            .enumerate()
            .map(|(start, m)| {
                visited.insert((start, m.entity.id.clone()));
                PathState {
                    start,
                    node: m.entity.id.clone(),
                    labels: vec![m.entity.text.clone()],
                    relations: Vec::new(),
                    score: m.score,
                }
            })
            .collect();

        let mut order: Vec<String> = Vec::new();
        let mut documents: HashMap<String, StrategyEvidence> = HashMap::new();

        for hop in 1..=usize::from(self.depth.get()) {
            if frontier.is_empty() {
                break;
            }

            let mut ids: Vec<String> = Vec::new();
            for state in &frontier {
                if !ids.contains(&state.node) {
                    ids.push(state.node.clone());
                }
            }

            let edges = store
                .outgoing_edges(&ids, &RelationType::TRAVERSABLE, EdgeFilter::all())
                .await?;
            let mut by_source: HashMap<&str, Vec<&Edge>> = HashMap::new();
            for edge in &edges {
                by_source.entry(edge.source_id.as_str()).or_default().push(edge);
            }

            let mut next: Vec<PathState> = Vec::new();
            for state in &frontier {
                let Some(out) = by_source.get(state.node.as_str()) else {
                    continue;
                };
                for edge in out {
                    if !visited.insert((state.start, edge.target.id.clone())) {
                        continue;
                    }

                    let mut labels = state.labels.clone();
                    labels.push(edge.target.text.clone());
                    let mut relations = state.relations.clone();
                    relations.push(edge.relation);

                    for chunk_id in &edge.target.chunk_ids {
                        documents.entry(chunk_id.clone()).or_insert_with(|| {
                            order.push(chunk_id.clone());
                            StrategyEvidence::Multihop {
                                traversal_path: labels
                                    .iter()
                                    .take(MAX_PATH_ENTRIES)
                                    .cloned()
                                    .collect(),
                                relationship_types: relations
                                    .iter()
                                    .take(MAX_PATH_ENTRIES)
                                    .copied()
                                    .collect(),
                                hop_count: hop,
                                match_score: state.score,
                            }
                        });
                    }

                    if next.len() < MAX_FRONTIER {
                        next.push(PathState {
                            start: state.start,
                            node: edge.target.id.clone(),
                            labels,
                            relations,
                            score: state.score,
                        });
                    }
                }
            }
            frontier = next;
        }

        let mut hits: Vec<StrategyHit> = order
            .into_iter()
            .filter_map(|id| {
                let evidence = documents.remove(&id)?;
                Some(StrategyHit {
                    document_id: id,
                    evidence,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            hop_count(a)
                .cmp(&hop_count(b))
                .then_with(|| b.evidence.match_score().total_cmp(&a.evidence.match_score()))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(self.limit);
        Ok(hits)
    }
}

fn hop_count(hit: &StrategyHit) -> usize {
    match &hit.evidence {
        StrategyEvidence::Multihop { hop_count, .. } => *hop_count,
        _ => usize::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Entity, Relationship};
    use crate::store::MemoryGraphStore;

    fn entity(id: &str, text: &str, chunks: &[&str]) -> Entity {
        Entity {
            id: id.into(),
            text: text.into(),
            labels: vec![],
            chunk_ids: chunks.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    fn rel(source: &str, relation: RelationType, target: &str) -> Relationship {
        Relationship {
            source_id: source.into(),
            target_id: target.into(),
            relation_type: relation,
        }
    }

    /// sw -> eng -> ielts -> centre, plus a shortcut sw -> ielts and a cycle back to sw.
    fn store() -> MemoryGraphStore {
        MemoryGraphStore::new(
            vec![
                entity("sw", "Skilled Worker visa", &["c_sw"]),
                entity("eng", "English language test", &["c_eng"]),
                entity("ielts", "IELTS", &["c_ielts"]),
                entity("centre", "Approved test centre", &["c_centre"]),
            ],
            vec![
                rel("sw", RelationType::Requires, "eng"),
                rel("eng", RelationType::SatisfiedBy, "ielts"),
                rel("sw", RelationType::DependsOn, "ielts"),
                rel("ielts", RelationType::AppliesIf, "centre"),
                rel("centre", RelationType::CanTransitionTo, "sw"),
            ],
        )
    }

    fn strategy(depth: u8) -> MultihopTraversal {
        MultihopTraversal::new(
            TraversalDepth::new(depth).unwrap(),
            20,
            Duration::from_secs(10),
        )
    }

    fn find<'a>(hits: &'a [StrategyHit], id: &str) -> &'a StrategyEvidence {
        &hits.iter().find(|h| h.document_id == id).unwrap().evidence
    }

    #[test]
    fn test_depth_bounds() {
        assert!(matches!(
            TraversalDepth::new(0),
            Err(RetrievalError::InvalidDepth(0))
        ));
        assert!(matches!(
            TraversalDepth::new(6),
            Err(RetrievalError::InvalidDepth(6))
        ));
        for depth in 1..=5 {
            assert_eq!(TraversalDepth::new(depth).unwrap().get(), depth);
        }
    }

    #[tokio::test]
    async fn test_keeps_shortest_path() {
        let hits = strategy(3)
            .retrieve(&store(), &["Skilled Worker visa".to_string()])
            .await
            .unwrap();

        match find(&hits, "c_ielts") {
            StrategyEvidence::Multihop {
                hop_count,
                traversal_path,
                relationship_types,
                ..
            } => {
                assert_eq!(*hop_count, 1);
                assert_eq!(traversal_path, &vec!["Skilled Worker visa", "IELTS"]);
                assert_eq!(relationship_types, &vec![RelationType::DependsOn]);
            }
            other => panic!("unexpected evidence {other:?}"),
        }

        match find(&hits, "c_centre") {
            StrategyEvidence::Multihop { hop_count, .. } => assert_eq!(*hop_count, 2),
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_results_ordered_by_hop_count() {
        let hits = strategy(5)
            .retrieve(&store(), &["Skilled Worker visa".to_string()])
            .await
            .unwrap();

        let hops: Vec<usize> = hits.iter().map(hop_count).collect();
        let mut sorted = hops.clone();
        sorted.sort_unstable();
        assert_eq!(hops, sorted);
        // The cycle back to the start entity is not revisited.
        assert!(hits.iter().all(|h| h.document_id != "c_sw"));
    }

    #[tokio::test]
    async fn test_depth_limits_traversal() {
        let store = store();
        let hits = strategy(1)
            .retrieve(&store, &["Skilled Worker visa".to_string()])
            .await
            .unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["c_eng", "c_ielts"]);
        // One lookup plus one edge query per level.
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_busy_node_does_not_hide_direct_edge() {
        let mut entities: Vec<Entity> = (0..20)
            .map(|i| entity(&format!("a{i}"), &format!("Node a{i}"), &[]))
            .collect();
        entities.push(entity("s", "Node s", &[]));
        entities.push(entity("b", "Node b", &["c_b"]));
        let mut relationships: Vec<Relationship> = (0..20)
            .map(|i| rel("s", RelationType::Requires, &format!("a{i}")))
            .collect();
        relationships.push(rel("s", RelationType::Requires, "b"));
        relationships.push(rel("a0", RelationType::Requires, "b"));
        let store = MemoryGraphStore::new(entities, relationships);

        let hits = MultihopTraversal::new(TraversalDepth::new(3).unwrap(), 2, Duration::from_secs(10))
            .retrieve(&store, &["Node s".to_string()])
            .await
            .unwrap();

        match find(&hits, "c_b") {
            StrategyEvidence::Multihop {
                hop_count,
                traversal_path,
                ..
            } => {
                assert_eq!(*hop_count, 1);
                assert_eq!(traversal_path, &vec!["Node s", "Node b"]);
            }
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_paths_are_capped() {
        let entities: Vec<Entity> = (0..7)
            .map(|i| entity(&format!("n{i}"), &format!("Node {i}"), &[&format!("c{i}")]))
            .collect();
        let relationships: Vec<Relationship> = (0..6)
            .map(|i| rel(&format!("n{i}"), RelationType::DependsOn, &format!("n{}", i + 1)))
            .collect();
        let store = MemoryGraphStore::new(entities, relationships);

        let hits = strategy(5)
            .retrieve(&store, &["Node 0".to_string()])
            .await
            .unwrap();

        assert_eq!(hits.len(), 5);
        match find(&hits, "c5") {
            StrategyEvidence::Multihop {
                hop_count,
                traversal_path,
                relationship_types,
                ..
            } => {
                assert_eq!(*hop_count, 5);
                assert_eq!(traversal_path.len(), MAX_PATH_ENTRIES);
                assert_eq!(relationship_types.len(), 5);
            }
            other => panic!("unexpected evidence {other:?}"),
        }
    }
}
