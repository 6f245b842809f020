//! Graph Store
//!
//! Read-only access to the property graph populated by the extraction
//! pipeline. Stores expose two primitives (full-text entity lookup and typed
//! outgoing edges); the traversal strategies compose them into the direct,
//! expansion and multi-hop query shapes.

use crate::domain::graph::{Edge, Entity, EntityMatch, RelationType};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::time::Duration;

pub mod memory;
pub mod surreal;

pub use memory::MemoryGraphStore;
pub use surreal::SurrealGraphStore;

#[async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    /// Case-insensitive full-text lookup of entities by display text, best match first.
    async fn search_entities(&self, term: &str, limit: usize) -> Result<Vec<EntityMatch>>;

    /// Directed edges leaving `entity_ids` whose type is one of `relations`,
    /// narrowed by `filter`.
    async fn outgoing_edges(
        &self,
        entity_ids: &[String],
        relations: &[RelationType],
        filter: EdgeFilter,
    ) -> Result<Vec<Edge>>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;
}

// =============================================================================
// Edge Filter
// =============================================================================

/// Narrows an edge lookup. Limits apply per source entity, so a busy node
/// never crowds out the edges of another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    /// Most edges returned per source entity; `None` returns all of them.
    pub per_source_limit: Option<usize>,
    /// Only edges whose target is mentioned by at least one document.
    pub documented_targets: bool,
}

impl EdgeFilter {
    /// Every edge, for traversals that must walk through undocumented nodes.
    pub fn all() -> Self {
        Self::default()
    }

    /// Edges to documented targets, at most `per_source_limit` per source.
    pub fn documented(per_source_limit: usize) -> Self {
        Self {
            per_source_limit: Some(per_source_limit),
            documented_targets: true,
        }
    }

    pub fn admits(&self, target: &Entity) -> bool {
        !self.documented_targets || target.has_documents()
    }

    /// Apply the per-source limit, keeping edge order.
    pub fn cap(&self, edges: Vec<Edge>) -> Vec<Edge> {
        let Some(limit) = self.per_source_limit else {
            return edges;
        };
        let mut taken: HashMap<String, usize> = HashMap::new();
        edges
            .into_iter()
            .filter(|edge| {
                let count = taken.entry(edge.source_id.clone()).or_default();
                *count += 1;
                *count <= limit
            })
            .collect()
    }
}

// =============================================================================
// Query Shapes
// =============================================================================

/// Query shapes issued against the store, each with its own time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    DirectSearch,
    RelationshipExpansion,
    MultihopTraversal,
}

impl QueryShape {
    /// Recommended timeout; path exploration gets a longer budget.
    pub fn recommended_timeout(self) -> Duration {
        match self {
            Self::DirectSearch | Self::RelationshipExpansion => Duration::from_millis(5_000),
            Self::MultihopTraversal => Duration::from_millis(10_000),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DirectSearch => "direct_entity_search",
            Self::RelationshipExpansion => "relationship_expansion",
            Self::MultihopTraversal => "multihop_traversal",
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Resolve query strings to graph entities.
///
/// Lookups run concurrently; entities matched by several strings are kept
/// once with their best score. Order is best score first, then first seen.
pub async fn resolve_entities(
    store: &dyn GraphStore,
    terms: &[String],
    limit: usize,
) -> Result<Vec<EntityMatch>> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let lookups = try_join_all(terms.iter().map(|t| store.search_entities(t, limit))).await?;

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, EntityMatch> = HashMap::new();
    for m in lookups.into_iter().flatten() {
        match best.get_mut(&m.entity.id) {
            Some(existing) => {
                if m.score > existing.score {
                    existing.score = m.score;
                }
            }
            None => {
                order.push(m.entity.id.clone());
                best.insert(m.entity.id.clone(), m);
            }
        }
    }

    let mut resolved: Vec<EntityMatch> = order
        .into_iter()
        .filter_map(|id| best.remove(&id))
        .collect();
    // Stable sort keeps first-seen order among equal scores.
    resolved.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(resolved)
}
