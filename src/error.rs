//! Caller-visible errors of the retrieval engine.
//!
//! Only configuration and validation failures surface here. Transient store
//! failures are absorbed at the strategy boundary and cache failures at the
//! cache boundary.

use crate::retrieval::multihop::{MAX_TRAVERSAL_DEPTH, MIN_TRAVERSAL_DEPTH};

/// Errors returned by [`crate::retrieval::engine::GraphRetriever`] and its setup.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The graph store connection was never established.
    #[error("Graph store not initialized: no connection was established")]
    StoreNotConnected,

    /// Multi-hop depth outside the supported range.
    #[error(
        "Invalid traversal depth {0}: must be between {MIN_TRAVERSAL_DEPTH} and {MAX_TRAVERSAL_DEPTH}"
    )]
    InvalidDepth(u8),

    /// Malformed request input (entity list, `top_k`).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A configured entity surface pattern failed to compile.
    #[error("Invalid entity pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl RetrievalError {
    /// Whether the error is caused by caller input rather than system wiring.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidDepth(_) | Self::InvalidRequest(_))
    }
}
