//! In-process graph store.
//!
//! Holds a complete property graph in memory. Used for fixtures, the CLI demo
//! provider, and tests (it supports fault and latency injection).

use super::{EdgeFilter, GraphStore};
use crate::domain::graph::{Edge, Entity, EntityMatch, RelationType, Relationship};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Serialized graph: `{ entities: [...], relationships: [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphFixture {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Default)]
struct Faults {
    all: Option<String>,
    edges: Option<String>,
    delay: Option<Duration>,
    edge_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct MemoryGraphStore {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
    adjacency: HashMap<String, Vec<(RelationType, String)>>,
    faults: Mutex<Faults>,
    calls: AtomicUsize,
}

impl MemoryGraphStore {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        let index = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        let mut adjacency: HashMap<String, Vec<(RelationType, String)>> = HashMap::new();
        for rel in relationships {
            adjacency
                .entry(rel.source_id)
                .or_default()
                .push((rel.relation_type, rel.target_id));
        }

        Self {
            entities,
            index,
            adjacency,
            faults: Mutex::new(Faults::default()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_fixture(fixture: GraphFixture) -> Self {
        Self::new(fixture.entities, fixture.relationships)
    }

    /// Load a JSON or YAML fixture file (chosen by extension).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph fixture {}", path.display()))?;

        let fixture: GraphFixture = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };

        tracing::info!(
            entities = fixture.entities.len(),
            relationships = fixture.relationships.len(),
            path = %path.display(),
            "Loaded in-memory graph fixture"
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Make every subsequent store call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.faults().all = Some(message.into());
    }

    /// Make only edge lookups fail with `message`.
    pub fn fail_edges_with(&self, message: impl Into<String>) {
        self.faults().edges = Some(message.into());
    }

    /// Delay every store call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.faults().delay = Some(delay);
    }

    /// Delay only edge lookups by `delay`.
    pub fn set_edge_delay(&self, delay: Duration) {
        self.faults().edge_delay = Some(delay);
    }

    pub fn clear_faults(&self) {
        *self.faults() = Faults::default();
    }

    /// Number of primitive calls served so far (pings excluded).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, apply injected latency, and return an injected failure if any.
    async fn enter(&self, edges: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, failure) = {
            let faults = self.faults();
            let failure = faults
                .all
                .clone()
                .or_else(|| if edges { faults.edges.clone() } else { None });
            let delay = faults
                .delay
                .or_else(|| if edges { faults.edge_delay } else { None });
            (delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            bail!(message);
        }
        Ok(())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Every term token must occur in the entity text; exact matches score 1.0.
fn full_text_score(term: &HashSet<String>, text: &str) -> Option<f32> {
    if term.is_empty() {
        return None;
    }
    let entity_tokens = tokens(text);
    if !term.is_subset(&entity_tokens) {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(term.len() as f32 / entity_tokens.len() as f32)
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn search_entities(&self, term: &str, limit: usize) -> Result<Vec<EntityMatch>> {
        self.enter(false).await?;

        let term_tokens = tokens(term);
        let mut matches: Vec<EntityMatch> = self
            .entities
            .iter()
            .filter_map(|e| {
                full_text_score(&term_tokens, &e.text).map(|score| EntityMatch {
                    entity: e.clone(),
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn outgoing_edges(
        &self,
        entity_ids: &[String],
        relations: &[RelationType],
        filter: EdgeFilter,
    ) -> Result<Vec<Edge>> {
        self.enter(true).await?;

        let mut edges = Vec::new();
        for source_id in entity_ids {
            let Some(out) = self.adjacency.get(source_id) else {
                continue;
            };
            for (relation, target_id) in out {
                if !relations.contains(relation) {
                    continue;
                }
                let Some(target) = self.index.get(target_id).map(|&i| &self.entities[i]) else {
                    continue;
                };
                if !filter.admits(target) {
                    continue;
                }
                edges.push(Edge {
                    source_id: source_id.clone(),
                    relation: *relation,
                    target: target.clone(),
                });
            }
        }
        Ok(filter.cap(edges))
    }

    async fn ping(&self) -> Result<()> {
        if let Some(message) = self.faults().all.clone() {
            bail!(message);
        }
        Ok(())
    }
}
