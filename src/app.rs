//! Application wiring.
//!
//! Connects the graph store and the query cache once, injects them into a
//! [`GraphRetriever`], and executes CLI commands against them.

use crate::cache::{QueryCache, WarmEntry};
use crate::config::{AppConfig, Command, GraphStoreConfig};
use crate::retrieval::{ExternalNlpRecognizer, GraphRetriever, RetrievalRequest};
use crate::store::{GraphStore, MemoryGraphStore, SurrealGraphStore};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

pub const PROVIDER_SURREAL: &str = "surreal";
pub const PROVIDER_MEMORY: &str = "memory";

/// Long-lived handles shared by every request.
#[derive(Debug, Clone)]
pub struct App {
    pub retriever: GraphRetriever,
    pub cache: Arc<QueryCache>,
}

impl App {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let store = connect_store(&config.graph_store).await;
        let cache = Arc::new(QueryCache::connect(&config.cache).await);

        let mut retriever =
            GraphRetriever::new(store, Arc::clone(&cache), config.retrieval.clone())?;

        if config.ner.enabled {
            match ExternalNlpRecognizer::from_config(&config.ner) {
                Ok(recognizer) => {
                    tracing::info!(base_url = %config.ner.base_url, "NER recognizer enabled");
                    retriever = retriever.with_recognizer(Arc::new(recognizer));
                }
                Err(e) => tracing::error!(error = %e, "Failed to create NER client, continuing without"),
            }
        }

        Ok(Self { retriever, cache })
    }

    /// Run one CLI command, returning its JSON result.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        match command {
            Command::Query {
                text,
                entities,
                top_k,
                depth,
            } => {
                let mut request = RetrievalRequest::new(text);
                if !entities.is_empty() {
                    request = request.with_entities(entities);
                }
                request.top_k = top_k;
                request.max_depth = depth;

                let output = self.retriever.run(request).await?;
                Ok(serde_json::to_value(output)?)
            }
            Command::Invalidate { pattern } => {
                let deleted = self.cache.invalidate_pattern(&pattern).await;
                Ok(json!({ "pattern": pattern, "deleted": deleted }))
            }
            Command::Clear => {
                let deleted = self.cache.clear_all().await;
                Ok(json!({ "namespace": self.cache.namespace(), "deleted": deleted }))
            }
            Command::Stats => Ok(serde_json::to_value(self.cache.stats().await)?),
            Command::ResetStats => {
                self.cache.reset_stats().await;
                Ok(json!({ "reset": self.cache.is_enabled() }))
            }
            Command::Warm { file } => {
                let entries = load_warm_entries(&file)?;
                let written = self.cache.warm(&entries).await;
                Ok(json!({ "requested": entries.len(), "written": written }))
            }
        }
    }
}

/// Connect the configured graph store and probe it. `None` means the
/// connection could not be established; queries then fail fast instead of
/// degrading.
pub async fn connect_store(config: &GraphStoreConfig) -> Option<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.provider.as_str() {
        PROVIDER_MEMORY => match &config.fixture_path {
            Some(path) => match MemoryGraphStore::from_path(path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(name: "store.unavailable", error = %e, "Failed to load graph fixture");
                    return None;
                }
            },
            None => {
                tracing::warn!("Memory graph store has no fixture, starting empty");
                Arc::new(MemoryGraphStore::new(Vec::new(), Vec::new()))
            }
        },
        _ => match SurrealGraphStore::connect(config).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(
                    name: "store.unavailable",
                    url = %config.url,
                    error = %e,
                    "Failed to connect to graph store"
                );
                return None;
            }
        },
    };

    if let Err(e) = store.ping().await {
        tracing::error!(name: "store.unavailable", error = %e, "Graph store health check failed");
        return None;
    }
    Some(store)
}

/// Read warm entries from a JSON or YAML file (chosen by extension).
pub fn load_warm_entries(path: &Path) -> Result<Vec<WarmEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read warm file {}", path.display()))?;

    let entries = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)?,
        _ => serde_json::from_str(&raw)?,
    };
    Ok(entries)
}
