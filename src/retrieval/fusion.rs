//! Result fusion.
//!
//! Each strategy hit contributes a base score (direct 1.0, expanded 0.8,
//! multihop 0.6 / hop_count). Hits for the same document are merged and their
//! scores summed, so convergent evidence from independent strategies outranks
//! any single strategy. The sum is deliberately unbounded.
//!
//! Ranking: score descending, then best contributing strategy
//! (direct > expanded > multihop), then document id.

use crate::domain::retrieval::{RetrievedDocument, Strategy, StrategyEvidence, StrategyHit};
use std::collections::HashMap;

pub const DIRECT_BASE_SCORE: f64 = 1.0;
pub const EXPANDED_BASE_SCORE: f64 = 0.8;
pub const MULTIHOP_BASE_SCORE: f64 = 0.6;

/// Score one strategy contributes for a document.
#[allow(clippy::cast_precision_loss)]
pub fn base_score(evidence: &StrategyEvidence) -> f64 {
    match evidence {
        StrategyEvidence::Direct { .. } => DIRECT_BASE_SCORE,
        StrategyEvidence::Expanded { .. } => EXPANDED_BASE_SCORE,
        StrategyEvidence::Multihop { hop_count, .. } => {
            MULTIHOP_BASE_SCORE / (*hop_count).max(1) as f64
        }
    }
}

/// Merge strategy hits into one deduplicated, ranked document list.
pub fn fuse<I>(hits: I) -> Vec<RetrievedDocument>
where
    I: IntoIterator<Item = StrategyHit>,
{
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<StrategyEvidence>> = HashMap::new();

    for hit in hits {
        let evidence = grouped.entry(hit.document_id.clone()).or_insert_with(|| {
            order.push(hit.document_id.clone());
            Vec::new()
        });
        // One contribution per strategy.
        if evidence
            .iter()
            .all(|e| e.strategy() != hit.evidence.strategy())
        {
            evidence.push(hit.evidence);
        }
    }

    let mut documents: Vec<RetrievedDocument> = order
        .into_iter()
        .filter_map(|id| {
            let mut evidence = grouped.remove(&id)?;
            evidence.sort_by_key(StrategyEvidence::strategy);
            let graph_score = evidence.iter().map(base_score).sum();
            let retrieval_strategy = evidence
                .first()
                .map_or(Strategy::Multihop, StrategyEvidence::strategy);
            Some(RetrievedDocument {
                id,
                content: None,
                retrieval_strategy,
                graph_score,
                evidence,
            })
        })
        .collect();

    documents.sort_by(|a, b| {
        b.graph_score
            .total_cmp(&a.graph_score)
            .then_with(|| a.retrieval_strategy.cmp(&b.retrieval_strategy))
            .then_with(|| a.id.cmp(&b.id))
    });
    documents
}
