//! Explanation records.
//!
//! Built purely from evidence already attached during fusion; no graph access.
//! The path shown is the one found by the document's primary strategy.

use crate::domain::graph::RelationType;
use crate::domain::retrieval::{GraphPath, PathExplanation, RetrievedDocument, StrategyEvidence};

/// One explanation per document, in ranking order.
pub fn explain(documents: &[RetrievedDocument]) -> Vec<GraphPath> {
    documents.iter().filter_map(explain_document).collect()
}

pub fn explain_document(document: &RetrievedDocument) -> Option<GraphPath> {
    let primary = document.evidence_for(document.retrieval_strategy)?;
    let explanation = to_explanation(primary);
    let description = describe(&explanation);

    Some(GraphPath {
        document_id: document.id.clone(),
        strategy: document.retrieval_strategy,
        graph_score: document.graph_score,
        explanation,
        contributing_strategies: document.strategies(),
        description,
    })
}

fn to_explanation(evidence: &StrategyEvidence) -> PathExplanation {
    match evidence {
        StrategyEvidence::Direct {
            matched_entities, ..
        } => PathExplanation::Direct {
            matched_entities: matched_entities.clone(),
        },
        StrategyEvidence::Expanded {
            source_entity,
            relationship,
            target_entity,
            related_entities,
            ..
        } => PathExplanation::Expanded {
            source_entity: source_entity.clone(),
            relationship: *relationship,
            target_entity: target_entity.clone(),
            related_entities: related_entities.clone(),
        },
        StrategyEvidence::Multihop {
            traversal_path,
            relationship_types,
            hop_count,
            ..
        } => PathExplanation::Multihop {
            traversal_path: traversal_path.clone(),
            relationship_types: relationship_types.clone(),
            hop_count: *hop_count,
        },
    }
}

/// Human-readable summary, e.g. `A -[REQUIRES]-> B`.
pub fn describe(explanation: &PathExplanation) -> String {
    match explanation {
        PathExplanation::Direct { matched_entities } => {
            format!("Mentions {}", matched_entities.join(", "))
        }
        PathExplanation::Expanded {
            source_entity,
            relationship,
            target_entity,
            ..
        } => edge(source_entity, *relationship, target_entity),
        PathExplanation::Multihop {
            traversal_path,
            relationship_types,
            hop_count,
        } => {
            let mut out = traversal_path.first().cloned().unwrap_or_default();
            for (relation, label) in relationship_types.iter().zip(traversal_path.iter().skip(1)) {
                out.push_str(&format!(" -[{relation}]-> {label}"));
            }
            // Capped paths end early.
            if traversal_path.len() < hop_count + 1 {
                out.push_str(" -> ...");
            }
            let unit = if *hop_count == 1 { "hop" } else { "hops" };
            format!("{out} ({hop_count} {unit})")
        }
    }
}

fn edge(source: &str, relation: RelationType, target: &str) -> String {
    format!("{source} -[{relation}]-> {target}")
}
