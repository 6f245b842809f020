//! Graph Retriever
//!
//! Multi-strategy retrieval over a knowledge graph: entities found in a
//! question are resolved in the graph, three traversal strategies collect
//! candidate passages, and their results are fused into one ranked,
//! explained list. Whole-pipeline results are memoized in a shared cache
//! that the graph writer invalidates after each extraction run.
//!
//! # Architecture
//!
//! - **Store**: read-only graph primitives (`SurrealDB` or in-memory)
//! - **Retrieval**: entity extraction, direct/expansion/multi-hop strategies, fusion, explanations
//! - **Cache**: Redis-backed query cache with pattern invalidation and warming
//! - **App**: wiring used by the CLI binary
//!
//! # Modules
//!
//! - [`retrieval`]: strategies and the [`retrieval::GraphRetriever`] orchestrator
//! - [`store`]: graph store trait and providers
//! - [`cache`]: query cache and its backends
//! - [`domain`]: graph and result types
//! - [`config`]: layered configuration and CLI

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod retrieval;
pub mod store;
pub mod telemetry;

pub use error::RetrievalError;
pub use retrieval::{GraphRetriever, RetrievalRequest};
