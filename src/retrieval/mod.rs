//! Multi-Strategy Graph Retrieval
//!
//! Three independent strategies (direct entity match, one-hop relationship
//! expansion, bounded multi-hop traversal) run against the graph store, then
//! fusion merges their hits into one ranked list and the explanation step
//! records why each document was chosen.
//!
//! Strategies never fail their caller: [`RetrievalStrategy::execute`] applies
//! the per-strategy timeout and turns store errors into an empty, flagged
//! outcome.

pub mod direct;
pub mod engine;
pub mod entities;
pub mod expansion;
pub mod explain;
pub mod fusion;
pub mod multihop;
pub mod recognizer;

pub use direct::DirectSearch;
pub use engine::{GraphRetriever, RetrievalRequest};
pub use entities::EntityExtractor;
pub use expansion::RelationshipExpansion;
pub use multihop::{MultihopTraversal, TraversalDepth};
pub use recognizer::{EntityRecognizer, ExternalNlpRecognizer, RecognizedEntity};

use crate::domain::retrieval::{Strategy, StrategyHit};
use crate::store::{GraphStore, QueryShape};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Documented edges fetched per source entity, per requested result.
pub(crate) const EDGE_FANOUT: usize = 10;

// =============================================================================
// Strategy Outcome
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyStatus {
    Completed,
    Failed,
    TimedOut,
    /// Abandoned because the request deadline passed first
    Cancelled,
}

/// Result of one strategy invocation, after the failure boundary.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy: Strategy,
    pub status: StrategyStatus,
    pub hits: Vec<StrategyHit>,
    pub elapsed: Duration,
}

impl StrategyOutcome {
    pub fn failed(strategy: Strategy, status: StrategyStatus, elapsed: Duration) -> Self {
        Self {
            strategy,
            status,
            hits: Vec::new(),
            elapsed,
        }
    }

    /// True when the strategy did not run to completion.
    pub fn is_degraded(&self) -> bool {
        self.status != StrategyStatus::Completed
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

#[async_trait]
pub trait RetrievalStrategy: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> Strategy;

    /// Store query shape this strategy issues.
    fn shape(&self) -> QueryShape;

    /// Time budget for one invocation.
    fn timeout(&self) -> Duration {
        self.shape().recommended_timeout()
    }

    /// Run the strategy. Errors propagate; use [`Self::execute`] at call sites.
    async fn retrieve(&self, store: &dyn GraphStore, entities: &[String])
    -> Result<Vec<StrategyHit>>;

    /// Run the strategy inside its failure boundary: timeouts and store
    /// errors are logged and produce an empty outcome.
    async fn execute(&self, store: &dyn GraphStore, entities: &[String]) -> StrategyOutcome {
        let strategy = self.kind();
        let started = Instant::now();

        match tokio::time::timeout(self.timeout(), self.retrieve(store, entities)).await {
            Ok(Ok(hits)) => {
                tracing::debug!(
                    name: "retrieval.strategy.completed",
                    strategy = %strategy,
                    query_shape = self.shape().name(),
                    hits = hits.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Strategy completed"
                );
                StrategyOutcome {
                    strategy,
                    status: StrategyStatus::Completed,
                    hits,
                    elapsed: started.elapsed(),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    name: "retrieval.strategy.failed",
                    strategy = %strategy,
                    query_shape = self.shape().name(),
                    error = %e,
                    "Strategy failed, contributing no documents"
                );
                StrategyOutcome::failed(strategy, StrategyStatus::Failed, started.elapsed())
            }
            Err(_) => {
                tracing::warn!(
                    name: "retrieval.strategy.timeout",
                    strategy = %strategy,
                    query_shape = self.shape().name(),
                    timeout_ms = self.timeout().as_millis() as u64,
                    "Strategy timed out, contributing no documents"
                );
                StrategyOutcome::failed(strategy, StrategyStatus::TimedOut, started.elapsed())
            }
        }
    }
}
