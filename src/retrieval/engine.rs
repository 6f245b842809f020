//! Retrieval Orchestrator
//!
//! `GraphRetriever::run` drives one retrieval call:
//!
//! 1. fail fast when the graph store was never connected;
//! 2. validate the request;
//! 3. consult the query cache;
//! 4. extract entities (empty ⇒ empty result, no store access);
//! 5. run the three strategies as concurrent tasks under one deadline;
//! 6. fuse, truncate to `top_k`, explain;
//! 7. cache the output unless a strategy degraded.

use super::entities::EntityExtractor;
use super::recognizer::{EntityRecognizer, RecognizedEntity};
use super::{
    DirectSearch, MultihopTraversal, RelationshipExpansion, RetrievalStrategy, StrategyOutcome,
    StrategyStatus, TraversalDepth, explain, fusion,
};
use crate::cache::QueryCache;
use crate::config::RetrievalConfig;
use crate::domain::retrieval::{RetrievalOutput, Strategy};
use crate::error::RetrievalError;
use crate::store::GraphStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, instrument};
use uuid::Uuid;

/// Most entity strings accepted in one request.
pub const MAX_QUERY_ENTITIES: usize = 32;

/// Cache method name for whole-pipeline results.
const RUN_METHOD: &str = "run";

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    /// Pre-extracted entities; extraction runs when absent or empty
    #[serde(default)]
    pub entities: Option<Vec<String>>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<u8>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

// =============================================================================
// Graph Retriever
// =============================================================================

#[derive(Debug, Clone)]
pub struct GraphRetriever {
    store: Option<Arc<dyn GraphStore>>,
    cache: Arc<QueryCache>,
    recognizer: Option<Arc<dyn EntityRecognizer>>,
    extractor: EntityExtractor,
    config: RetrievalConfig,
}

impl GraphRetriever {
    /// `store` is `None` when the graph connection could not be established;
    /// every `run` then fails with [`RetrievalError::StoreNotConnected`].
    pub fn new(
        store: Option<Arc<dyn GraphStore>>,
        cache: Arc<QueryCache>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        TraversalDepth::new(config.max_depth)?;
        let extractor = EntityExtractor::with_patterns(&config.extra_patterns)?;
        Ok(Self {
            store,
            cache,
            recognizer: None,
            extractor,
            config,
        })
    }

    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    #[instrument(
        skip(self, request),
        fields(
            query_len = request.query.len(),
            top_k = request.top_k.unwrap_or(self.config.top_k),
            run_id = tracing::field::Empty
        )
    )]
    pub async fn run(&self, request: RetrievalRequest) -> Result<RetrievalOutput, RetrievalError> {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", &run_id);
        let started = Instant::now();
        let deadline = started + self.config.request_timeout();

        let Some(store) = self.store.as_ref().map(Arc::clone) else {
            tracing::error!(name: "retrieval.run.not_connected", "Graph store not initialized");
            return Err(RetrievalError::StoreNotConnected);
        };

        let top_k = request.top_k.unwrap_or(self.config.top_k);
        if top_k > self.config.max_top_k {
            return Err(RetrievalError::InvalidRequest(format!(
                "top_k {top_k} exceeds the maximum of {}",
                self.config.max_top_k
            )));
        }
        let depth = TraversalDepth::new(request.max_depth.unwrap_or(self.config.max_depth))?;
        if let Some(entities) = &request.entities {
            validate_entities(entities)?;
        }

        let cache_key = self.cache_key(&request, top_k, depth);
        if let Some(cached) = self.cache.get::<RetrievalOutput>(&cache_key).await {
            tracing::info!(
                name: "retrieval.run.cache_hit",
                documents = cached.documents.len(),
                "Returning cached retrieval result"
            );
            return Ok(cached);
        }

        let entities = match request.entities {
            Some(entities) if !entities.is_empty() => entities,
            _ => self.extract_entities_until(&request.query, deadline).await,
        };
        if entities.is_empty() {
            tracing::info!(name: "retrieval.run.no_entities", "No entities found in query");
            return Ok(RetrievalOutput::empty(entities));
        }
        tracing::debug!(?entities, "Entities resolved");

        let outcomes = self.run_strategies(store, &entities, depth, deadline).await;
        let degraded = outcomes.iter().any(StrategyOutcome::is_degraded);
        let strategy_hits: Vec<(Strategy, usize, u128)> = outcomes
            .iter()
            .map(|o| (o.strategy, o.hits.len(), o.elapsed.as_millis()))
            .collect();

        let mut documents = fusion::fuse(outcomes.into_iter().flat_map(|o| o.hits));
        documents.truncate(top_k);
        let graph_paths = explain::explain(&documents);

        let output = RetrievalOutput {
            documents,
            graph_paths,
            entities,
            degraded,
        };

        if !degraded {
            let ttl = Duration::from_secs(self.config.cache_ttl_secs);
            self.cache.set(&cache_key, &output, Some(ttl), false).await;
        }

        tracing::info!(
            name: "retrieval.run.completed",
            documents = output.documents.len(),
            ?strategy_hits,
            degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval completed"
        );
        Ok(output)
    }

    /// NER spans (when a recognizer is configured) merged with pattern matches.
    pub async fn extract_entities(&self, query: &str) -> Vec<String> {
        let deadline = Instant::now() + self.config.request_timeout();
        self.extract_entities_until(query, deadline).await
    }

    async fn extract_entities_until(&self, query: &str, deadline: Instant) -> Vec<String> {
        let recognized = match &self.recognizer {
            Some(recognizer) => recognize(recognizer.as_ref(), query, deadline).await,
            None => Vec::new(),
        };
        self.extractor.extract(query, &recognized)
    }

    fn cache_key(&self, request: &RetrievalRequest, top_k: usize, depth: TraversalDepth) -> String {
        let mut kwargs = Map::new();
        kwargs.insert("entities".to_string(), json!(request.entities));
        kwargs.insert("max_depth".to_string(), json!(depth.get()));
        kwargs.insert("top_k".to_string(), json!(top_k));
        self.cache
            .cache_key(RUN_METHOD, &[Value::String(request.query.clone())], &kwargs)
    }

    fn strategies(&self, depth: TraversalDepth) -> Vec<Box<dyn RetrievalStrategy>> {
        let limit = self.config.strategy_limit;
        vec![
            Box::new(DirectSearch::new(limit, self.config.direct_timeout())),
            Box::new(RelationshipExpansion::new(
                limit,
                self.config.expansion_timeout(),
            )),
            Box::new(MultihopTraversal::new(
                depth,
                limit,
                self.config.multihop_timeout(),
            )),
        ]
    }

    /// Spawn every strategy and join them before the request deadline.
    /// Strategies still running at the deadline are aborted.
    async fn run_strategies(
        &self,
        store: Arc<dyn GraphStore>,
        entities: &[String],
        depth: TraversalDepth,
        deadline: Instant,
    ) -> Vec<StrategyOutcome> {
        let started = Instant::now();
        let entities: Arc<[String]> = entities.into();

        let handles: Vec<_> = self
            .strategies(depth)
            .into_iter()
            .map(|strategy| {
                let kind = strategy.kind();
                let store = Arc::clone(&store);
                let entities = Arc::clone(&entities);
                let task = async move { strategy.execute(store.as_ref(), &entities).await };
                (kind, tokio::spawn(task.instrument(tracing::Span::current())))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (kind, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    tracing::error!(strategy = %kind, error = %e, "Strategy task aborted");
                    outcomes.push(StrategyOutcome::failed(
                        kind,
                        StrategyStatus::Failed,
                        started.elapsed(),
                    ));
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        name: "retrieval.strategy.cancelled",
                        strategy = %kind,
                        "Request deadline reached, abandoning strategy"
                    );
                    outcomes.push(StrategyOutcome::failed(
                        kind,
                        StrategyStatus::Cancelled,
                        started.elapsed(),
                    ));
                }
            }
        }
        outcomes
    }
}

/// Bounded by the request deadline; failures fall back to surface patterns.
async fn recognize(
    recognizer: &dyn EntityRecognizer,
    query: &str,
    deadline: Instant,
) -> Vec<RecognizedEntity> {
    match tokio::time::timeout_at(deadline, recognizer.recognize(query)).await {
        Ok(Ok(recognized)) => recognized,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Entity recognizer failed, using surface patterns only");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("Entity recognizer timed out, using surface patterns only");
            Vec::new()
        }
    }
}

fn validate_entities(entities: &[String]) -> Result<(), RetrievalError> {
    if entities.len() > MAX_QUERY_ENTITIES {
        return Err(RetrievalError::InvalidRequest(format!(
            "{} entities supplied, at most {MAX_QUERY_ENTITIES} are allowed",
            entities.len()
        )));
    }
    if entities.iter().any(|e| e.trim().is_empty()) {
        return Err(RetrievalError::InvalidRequest(
            "entity strings must not be blank".to_string(),
        ));
    }
    Ok(())
}
