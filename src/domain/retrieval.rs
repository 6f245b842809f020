//! Retrieval Domain Models
//!
//! Strategy results, fused documents, and the explanation records returned to
//! callers. All of these are transient and owned by a single retrieval call
//! (or by the query cache, in serialized form).

use super::graph::RelationType;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Strategy
// =============================================================================

/// The retrieval strategy that produced a result.
///
/// Declaration order is the tie-break priority used by fusion
/// (direct before expanded before multihop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Direct,
    Expanded,
    Multihop,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Expanded => "expanded",
            Self::Multihop => "multihop",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Strategy Evidence
// =============================================================================

/// Strategy-specific evidence attached to a retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum StrategyEvidence {
    /// The passage mentions an entity matched by the query.
    Direct {
        /// Matched entity texts, capped
        matched_entities: Vec<String>,
        /// Number of distinct matched entities (uncapped)
        entity_count: usize,
        /// Best full-text score among the matches
        match_score: f32,
    },
    /// The passage mentions an entity one directed hop away from a match.
    Expanded {
        source_entity: String,
        relationship: RelationType,
        target_entity: String,
        /// Other hop targets that also lead to this passage, capped
        related_entities: Vec<String>,
        match_score: f32,
    },
    /// The passage is reachable over a bounded directed path.
    Multihop {
        /// Entity labels along the shortest path, capped
        traversal_path: Vec<String>,
        /// Edge types along the shortest path, capped
        relationship_types: Vec<RelationType>,
        /// Length of the shortest path (>= 1)
        hop_count: usize,
        match_score: f32,
    },
}

impl StrategyEvidence {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Direct { .. } => Strategy::Direct,
            Self::Expanded { .. } => Strategy::Expanded,
            Self::Multihop { .. } => Strategy::Multihop,
        }
    }

    /// Full-text score of the entity the evidence starts from.
    pub fn match_score(&self) -> f32 {
        match self {
            Self::Direct { match_score, .. }
            | Self::Expanded { match_score, .. }
            | Self::Multihop { match_score, .. } => *match_score,
        }
    }
}

/// One document produced by a single strategy, before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyHit {
    pub document_id: String,
    pub evidence: StrategyEvidence,
}

// =============================================================================
// Retrieved Document
// =============================================================================

/// A fused, scored source passage.
///
/// `id` is unique within one result set. When several strategies found the
/// same passage, `evidence` holds one entry per contributing strategy (in
/// priority order) and `graph_score` is the sum of their base scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Source passage (chunk) identifier
    pub id: String,
    /// Passage text, when the store provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Highest-priority contributing strategy
    pub retrieval_strategy: Strategy,
    /// Accumulated fusion score
    pub graph_score: f64,
    /// Evidence from every contributing strategy
    pub evidence: Vec<StrategyEvidence>,
}

impl RetrievedDocument {
    /// All strategies that contributed to this document, in priority order.
    pub fn strategies(&self) -> Vec<Strategy> {
        self.evidence.iter().map(StrategyEvidence::strategy).collect()
    }

    pub fn evidence_for(&self, strategy: Strategy) -> Option<&StrategyEvidence> {
        self.evidence.iter().find(|e| e.strategy() == strategy)
    }

    /// Shortest path length, if multi-hop traversal reached this passage.
    pub fn hop_count(&self) -> Option<usize> {
        match self.evidence_for(Strategy::Multihop) {
            Some(StrategyEvidence::Multihop { hop_count, .. }) => Some(*hop_count),
            _ => None,
        }
    }
}

// =============================================================================
// Graph Path (explanation)
// =============================================================================

/// Strategy-specific part of an explanation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathExplanation {
    Direct {
        matched_entities: Vec<String>,
    },
    Expanded {
        source_entity: String,
        relationship: RelationType,
        target_entity: String,
        related_entities: Vec<String>,
    },
    Multihop {
        traversal_path: Vec<String>,
        relationship_types: Vec<RelationType>,
        hop_count: usize,
    },
}

/// Audit trail explaining why a document was retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub document_id: String,
    pub strategy: Strategy,
    pub graph_score: f64,
    #[serde(flatten)]
    pub explanation: PathExplanation,
    /// Every strategy that found the document
    pub contributing_strategies: Vec<Strategy>,
    /// Human-readable summary of the path
    pub description: String,
}

// =============================================================================
// Retrieval Output
// =============================================================================

/// Payload of one retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub documents: Vec<RetrievedDocument>,
    pub graph_paths: Vec<GraphPath>,
    /// Entity strings the strategies were run with
    #[serde(default)]
    pub entities: Vec<String>,
    /// True when at least one strategy failed or timed out
    #[serde(default)]
    pub degraded: bool,
}

impl RetrievalOutput {
    pub fn empty(entities: Vec<String>) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_priority_order() {
        assert!(Strategy::Direct < Strategy::Expanded);
        assert!(Strategy::Expanded < Strategy::Multihop);
    }

    #[test]
    fn test_evidence_serializes_with_strategy_tag() {
        let evidence = StrategyEvidence::Multihop {
            traversal_path: vec!["A".into(), "B".into()],
            relationship_types: vec![RelationType::Requires],
            hop_count: 1,
            match_score: 1.0,
        };
        let value = serde_json::to_value(&evidence).unwrap();
        assert_eq!(value["strategy"], "multihop");
        assert_eq!(value["relationship_types"][0], "REQUIRES");
    }

    #[test]
    fn test_graph_path_flattens_explanation() {
        let path = GraphPath {
            document_id: "chunk_001".into(),
            strategy: Strategy::Expanded,
            graph_score: 0.8,
            explanation: PathExplanation::Expanded {
                source_entity: "Skilled Worker visa".into(),
                relationship: RelationType::Requires,
                target_entity: "English language test".into(),
                related_entities: vec!["English language test".into()],
            },
            contributing_strategies: vec![Strategy::Expanded],
            description: "Skilled Worker visa -[REQUIRES]-> English language test".into(),
        };

        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["strategy"], "expanded");
        assert_eq!(value["source_entity"], "Skilled Worker visa");
        assert_eq!(value["relationship"], "REQUIRES");

        let back: GraphPath = serde_json::from_value(value).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_hop_count_comes_from_multihop_evidence() {
        let doc = RetrievedDocument {
            id: "d".into(),
            content: None,
            retrieval_strategy: Strategy::Direct,
            graph_score: 1.3,
            evidence: vec![
                StrategyEvidence::Direct {
                    matched_entities: vec!["A".into()],
                    entity_count: 1,
                    match_score: 1.0,
                },
                StrategyEvidence::Multihop {
                    traversal_path: vec!["A".into(), "B".into(), "C".into()],
                    relationship_types: vec![RelationType::Requires, RelationType::DependsOn],
                    hop_count: 2,
                    match_score: 1.0,
                },
            ],
        };
        assert_eq!(doc.hop_count(), Some(2));
        assert_eq!(doc.strategies(), vec![Strategy::Direct, Strategy::Multihop]);
    }
}
