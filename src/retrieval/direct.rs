//! Direct entity search.
//!
//! Documents that mention an entity whose text full-text matches one of the
//! query entity strings.

use super::RetrievalStrategy;
use crate::domain::retrieval::{Strategy, StrategyEvidence, StrategyHit};
use crate::store::{GraphStore, QueryShape, resolve_entities};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Matched entity texts kept per document.
pub const MAX_MATCHED_ENTITIES: usize = 5;

#[derive(Debug, Clone)]
pub struct DirectSearch {
    limit: usize,
    timeout: Duration,
}

impl DirectSearch {
    pub fn new(limit: usize, timeout: Duration) -> Self {
        Self { limit, timeout }
    }
}

#[derive(Debug, Default)]
struct DocumentMatches {
    matched_entities: Vec<String>,
    entity_ids: HashSet<String>,
    best_score: f32,
}

#[async_trait]
impl RetrievalStrategy for DirectSearch {
    fn kind(&self) -> Strategy {
        Strategy::Direct
    }

    fn shape(&self) -> QueryShape {
        QueryShape::DirectSearch
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

        let mut order: Vec<String> = Vec::new();
        let mut documents: HashMap<String, DocumentMatches> = HashMap::new();

        for m in matches.iter().filter(|m| m.entity.has_documents()) {
            for chunk_id in &m.entity.chunk_ids {
                let doc = documents.entry(chunk_id.clone()).or_insert_with(|| {
                    order.push(chunk_id.clone());
                    DocumentMatches::default()
                });
                if !doc.entity_ids.insert(m.entity.id.clone()) {
                    continue;
                }
                if doc.matched_entities.len() < MAX_MATCHED_ENTITIES {
                    doc.matched_entities.push(m.entity.text.clone());
                }
                doc.best_score = doc.best_score.max(m.score);
            }
        }

        let mut hits: Vec<StrategyHit> = order
            .into_iter()
            .filter_map(|id| {
                let doc = documents.remove(&id)?;
                Some(StrategyHit {
                    document_id: id,
                    evidence: StrategyEvidence::Direct {
                        matched_entities: doc.matched_entities,
                        entity_count: doc.entity_ids.len(),
                        match_score: doc.best_score,
                    },
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.evidence
                .match_score()
                .total_cmp(&a.evidence.match_score())
                .then_with(|| entity_count(b).cmp(&entity_count(a)))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(self.limit);
        Ok(hits)
    }
}

fn entity_count(hit: &StrategyHit) -> usize {
    match &hit.evidence {
        StrategyEvidence::Direct { entity_count, .. } => *entity_count,
        _ => 0,
    }
}
