//! SurrealDB-backed graph store.
//!
//! Expected layout (provisioned by the extraction pipeline):
//!
//! - table `entity` with fields `text`, `labels`, `chunk_ids` and a full-text
//!   search index on `text` (lowercasing analyzer);
//! - one edge table per relationship type, named in snake case
//!   (`requires`, `satisfied_by`, ...), created with `RELATE`.

use super::{EdgeFilter, GraphStore};
use crate::config::GraphStoreConfig;
use crate::domain::graph::{Edge, Entity, EntityMatch, RelationType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;

const SEARCH_ENTITIES: &str = "\
    SELECT record::id(id) AS id, text, labels, chunk_ids, search::score(1) AS score \
    FROM entity WHERE text @1@ $term \
    ORDER BY score DESC LIMIT $limit";

#[derive(Debug)]
pub struct SurrealGraphStore {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    id: String,
    text: String,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    chunk_ids: Option<Vec<String>>,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
    relation: String,
    source_id: String,
    target_id: String,
    target_text: Option<String>,
    #[serde(default)]
    target_labels: Option<Vec<String>>,
    #[serde(default)]
    target_chunk_ids: Option<Vec<String>>,
}

impl SurrealGraphStore {
    /// Connect, authenticate (when credentials are configured), and select namespace/database.
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let db = tokio::time::timeout(timeout, connect(config.url.as_str()))
            .await
            .context("Timed out connecting to graph store")?
            .with_context(|| format!("Failed to connect to graph store at {}", config.url))?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await
            .context("Graph store sign-in failed")?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        tracing::info!(
            name: "graph_store.connected",
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Graph store connected"
        );
        Ok(Self { db })
    }

    /// Underlying client, for provisioning and maintenance queries.
    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Edge query over the edge tables of `relations`. Table names come from
    /// the closed [`RelationType`] set, never from caller input. The
    /// per-source limit is applied to the rows afterwards.
    fn edge_query(relations: &[RelationType], filter: EdgeFilter) -> String {
        let tables: Vec<&str> = relations.iter().map(|r| r.table_name()).collect();
        let documented = if filter.documented_targets {
            " AND array::len(out.chunk_ids ?? []) > 0"
        } else {
            ""
        };
        format!(
            "SELECT record::tb(id) AS relation, record::id(in) AS source_id, \
             record::id(out) AS target_id, out.text AS target_text, \
             out.labels AS target_labels, out.chunk_ids AS target_chunk_ids \
             FROM {} WHERE record::id(in) INSIDE $ids{documented}",
            tables.join(", ")
        )
    }
}

fn bound_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn search_entities(&self, term: &str, limit: usize) -> Result<Vec<EntityMatch>> {
        let mut response = self
            .db
            .query(SEARCH_ENTITIES)
            .bind(("term", term.to_string()))
            .bind(("limit", bound_limit(limit)))
            .await?;
        let rows: Vec<EntityRow> = response.take(0)?;

        Ok(rows
            .into_iter()
            .map(|row| EntityMatch {
                score: row.score.unwrap_or(0.0),
                entity: Entity {
                    id: row.id,
                    text: row.text,
                    labels: row.labels.unwrap_or_default(),
                    chunk_ids: row.chunk_ids.unwrap_or_default(),
                },
            })
            .collect())
    }

    async fn outgoing_edges(
        &self,
        entity_ids: &[String],
        relations: &[RelationType],
        filter: EdgeFilter,
    ) -> Result<Vec<Edge>> {
        if entity_ids.is_empty() || relations.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .query(Self::edge_query(relations, filter))
            .bind(("ids", entity_ids.to_vec()))
            .await?;
        let rows: Vec<EdgeRow> = response.take(0)?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(relation) = RelationType::from_table_name(&row.relation) else {
                tracing::warn!(relation = %row.relation, "Skipping edge of unknown type");
                continue;
            };
            edges.push(Edge {
                source_id: row.source_id,
                relation,
                target: Entity {
                    text: row.target_text.unwrap_or_else(|| row.target_id.clone()),
                    id: row.target_id,
                    labels: row.target_labels.unwrap_or_default(),
                    chunk_ids: row.target_chunk_ids.unwrap_or_default(),
                },
            });
        }
        Ok(filter.cap(edges))
    }

    async fn ping(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}
