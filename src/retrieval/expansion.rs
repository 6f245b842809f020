//! Relationship expansion.
//!
//! Follows exactly one directed, whitelisted edge from each matched entity and
//! returns the documents of the targets.

use super::{EDGE_FANOUT, RetrievalStrategy};
use crate::domain::graph::{Edge, RelationType};
use crate::domain::retrieval::{Strategy, StrategyEvidence, StrategyHit};
use crate::store::{EdgeFilter, GraphStore, QueryShape, resolve_entities};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Context entities kept per document.
pub const MAX_RELATED_ENTITIES: usize = 3;

#[derive(Debug, Clone)]
pub struct RelationshipExpansion {
    limit: usize,
    timeout: Duration,
}

impl RelationshipExpansion {
    pub fn new(limit: usize, timeout: Duration) -> Self {
        Self { limit, timeout }
    }
}

#[async_trait]
impl RetrievalStrategy for RelationshipExpansion {
    fn kind(&self) -> Strategy {
        Strategy::Expanded
    }

    fn shape(&self) -> QueryShape {
        QueryShape::RelationshipExpansion
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
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let sources: HashMap<&str, (&str, f32)> = matches
            .iter()
            .map(|m| (m.entity.id.as_str(), (m.entity.text.as_str(), m.score)))
            .collect();
        let ids: Vec<String> = matches.iter().map(|m| m.entity.id.clone()).collect();

        let mut edges = store
            .outgoing_edges(
                &ids,
                &RelationType::TRAVERSABLE,
                EdgeFilter::documented(self.limit.saturating_mul(EDGE_FANOUT)),
            )
            .await?;
        // Strongest source first, so it describes each document.
        let score_of = |edge: &Edge| sources.get(edge.source_id.as_str()).map_or(0.0, |s| s.1);
        edges.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));

        let mut order: Vec<String> = Vec::new();
        let mut documents: HashMap<String, StrategyEvidence> = HashMap::new();

        for edge in &edges {
            let Some(&(source_text, score)) = sources.get(edge.source_id.as_str()) else {
                continue;
            };
            for chunk_id in &edge.target.chunk_ids {
                let evidence = documents.entry(chunk_id.clone()).or_insert_with(|| {
                    order.push(chunk_id.clone());
                    StrategyEvidence::Expanded {
                        source_entity: source_text.to_string(),
                        relationship: edge.relation,
                        target_entity: edge.target.text.clone(),
                        related_entities: Vec::new(),
                        match_score: score,
                    }
                });
                if let StrategyEvidence::Expanded {
                    related_entities, ..
                } = evidence
                {
                    if related_entities.len() < MAX_RELATED_ENTITIES
                        && !related_entities.contains(&edge.target.text)
                    {
                        related_entities.push(edge.target.text.clone());
                    }
                }
            }
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
            b.evidence
                .match_score()
                .total_cmp(&a.evidence.match_score())
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(self.limit);
        Ok(hits)
    }
}
