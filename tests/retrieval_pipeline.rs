//! End-to-end retrieval over the in-memory visa graph fixture.
//!
//! Covers ranking, truncation, the empty-entity short circuit, degradation on
//! store failures and timeouts, fail-fast without a store, and cache-aside.

use graph_retriever::cache::{MemoryBackend, QueryCache};
use graph_retriever::config::{CacheConfig, RetrievalConfig};
use graph_retriever::domain::graph::RelationType;
use graph_retriever::domain::retrieval::{PathExplanation, Strategy, StrategyEvidence};
use graph_retriever::retrieval::{EntityRecognizer, RecognizedEntity};
use graph_retriever::store::{GraphStore, MemoryGraphStore};
use graph_retriever::{GraphRetriever, RetrievalError, RetrievalRequest};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Utilities
// =============================================================================

const FIXTURE: &str = "tests/fixtures/visa_graph.json";

fn fixture_store() -> Arc<MemoryGraphStore> {
    Arc::new(MemoryGraphStore::from_path(FIXTURE).expect("fixture should load"))
}

fn uncached() -> Arc<QueryCache> {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    Arc::new(QueryCache::disabled(&config))
}

fn in_memory_cache() -> Arc<QueryCache> {
    Arc::new(QueryCache::with_backend(
        Arc::new(MemoryBackend::new()),
        &CacheConfig::default(),
    ))
}

fn retriever_with(
    store: &Arc<MemoryGraphStore>,
    cache: Arc<QueryCache>,
    config: RetrievalConfig,
) -> GraphRetriever {
    let store: Arc<dyn GraphStore> = Arc::clone(store) as Arc<dyn GraphStore>;
    GraphRetriever::new(Some(store), cache, config).expect("valid config")
}

fn retriever(store: &Arc<MemoryGraphStore>) -> GraphRetriever {
    retriever_with(store, uncached(), RetrievalConfig::default())
}

fn ids(output: &graph_retriever::domain::retrieval::RetrievalOutput) -> Vec<&str> {
    output.documents.iter().map(|d| d.id.as_str()).collect()
}

// =============================================================================
// Ranking
// =============================================================================

#[tokio::test]
async fn test_skilled_worker_ranking() {
    let store = fixture_store();
    let output = retriever(&store)
        .run(RetrievalRequest::new(
            "What are the requirements for Skilled Worker visa?",
        ))
        .await
        .unwrap();

    assert!(!output.degraded);
    assert_eq!(output.entities, vec!["Skilled Worker visa"]);
    assert_eq!(
        ids(&output),
        vec![
            "chunk_sw_requirements",
            "chunk_cos",
            "chunk_english",
            "chunk_salary",
            "chunk_sw_overview",
            "chunk_ielts",
            "chunk_payslips",
        ]
    );

    let top = &output.documents[0];
    assert!((top.graph_score - 2.4).abs() < 1e-9);
    assert_eq!(top.retrieval_strategy, Strategy::Direct);
    assert_eq!(
        top.strategies(),
        vec![Strategy::Direct, Strategy::Expanded, Strategy::Multihop]
    );

    // CONTAINS_ENTITY is never traversed
    assert!(!ids(&output).contains(&"chunk_guidance"));
}

#[tokio::test]
async fn test_ids_are_unique() {
    let store = fixture_store();
    let output = retriever(&store)
        .run(RetrievalRequest::new("Student visa and Skilled Worker visa"))
        .await
        .unwrap();

    let mut seen = ids(&output);
    let total = seen.len();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), total);
}

#[tokio::test]
async fn test_multihop_only_results_ordered_by_hops() {
    let store = fixture_store();
    let config = RetrievalConfig {
        max_depth: 5,
        ..RetrievalConfig::default()
    };
    let output = retriever_with(&store, uncached(), config)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    let hops: Vec<usize> = output
        .documents
        .iter()
        .filter(|d| d.strategies() == vec![Strategy::Multihop])
        .filter_map(|d| d.hop_count())
        .collect();
    assert!(!hops.is_empty());
    assert!(hops.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_explanations_follow_documents() {
    let store = fixture_store();
    let output = retriever(&store)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert_eq!(output.graph_paths.len(), output.documents.len());
    for (path, doc) in output.graph_paths.iter().zip(&output.documents) {
        assert_eq!(path.document_id, doc.id);
        assert_eq!(path.strategy, doc.retrieval_strategy);
    }

    let english = output
        .graph_paths
        .iter()
        .find(|p| p.document_id == "chunk_english")
        .unwrap();
    assert_eq!(
        english.description,
        "Skilled Worker visa -[REQUIRES]-> English language requirement"
    );

    let ielts = output
        .graph_paths
        .iter()
        .find(|p| p.document_id == "chunk_ielts")
        .unwrap();
    match &ielts.explanation {
        PathExplanation::Multihop {
            traversal_path,
            relationship_types,
            hop_count,
        } => {
            assert_eq!(*hop_count, 2);
            assert_eq!(
                traversal_path,
                &vec!["Skilled Worker visa", "English language requirement", "IELTS"]
            );
            assert_eq!(
                relationship_types,
                &vec![RelationType::Requires, RelationType::SatisfiedBy]
            );
        }
        other => panic!("unexpected explanation {other:?}"),
    }
}

#[tokio::test]
async fn test_supplied_entities_skip_extraction() {
    let store = fixture_store();
    let output = retriever(&store)
        .run(
            RetrievalRequest::new("Tell me about student visas")
                .with_entities(["Student visa", "Tier 4"]),
        )
        .await
        .unwrap();

    assert_eq!(output.entities, vec!["Student visa", "Tier 4"]);
    assert_eq!(
        ids(&output),
        vec![
            "chunk_cas",
            "chunk_funds",
            "chunk_graduate",
            "chunk_passport",
            "chunk_student_overview",
            "chunk_bank",
        ]
    );

    let cas = &output.documents[0];
    match cas.evidence_for(Strategy::Expanded) {
        Some(StrategyEvidence::Expanded {
            source_entity,
            relationship,
            ..
        }) => {
            assert_eq!(source_entity, "Student visa");
            assert_eq!(*relationship, RelationType::Requires);
        }
        other => panic!("unexpected evidence {other:?}"),
    }
}

// =============================================================================
// Truncation and short circuit
// =============================================================================

#[tokio::test]
async fn test_top_k_law() {
    let store = fixture_store();
    let retriever = retriever(&store);

    for k in 0..=10 {
        let output = retriever
            .run(RetrievalRequest::new("Skilled Worker visa").with_top_k(k))
            .await
            .unwrap();
        assert!(output.documents.len() <= k, "k = {k}");
        assert_eq!(output.graph_paths.len(), output.documents.len());
    }
}

#[tokio::test]
async fn test_no_entities_returns_empty_without_store_calls() {
    let store = fixture_store();
    let output = retriever(&store)
        .run(RetrievalRequest::new("Hello, how are you?"))
        .await
        .unwrap();

    assert!(output.documents.is_empty());
    assert!(output.graph_paths.is_empty());
    assert!(!output.degraded);
    assert_eq!(store.call_count(), 0);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_store_not_connected_fails_fast() {
    let retriever = GraphRetriever::new(None, uncached(), RetrievalConfig::default()).unwrap();
    let err = retriever
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap_err();

    assert!(matches!(err, RetrievalError::StoreNotConnected));
    assert!(!err.is_validation());
}

#[tokio::test]
async fn test_validation_happens_before_store_access() {
    let store = fixture_store();
    let retriever = retriever(&store);

    for depth in [0, 6] {
        let err = retriever
            .run(RetrievalRequest::new("Skilled Worker visa").with_max_depth(depth))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidDepth(d) if d == depth));
    }
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_edge_failures_degrade_to_direct_results() {
    let store = fixture_store();
    store.fail_edges_with("connection reset by peer");

    let output = retriever(&store)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert!(output.degraded);
    assert_eq!(
        ids(&output),
        vec!["chunk_sw_overview", "chunk_sw_requirements"]
    );
    assert!(
        output
            .documents
            .iter()
            .all(|d| d.retrieval_strategy == Strategy::Direct)
    );
}

#[tokio::test]
async fn test_total_store_failure_returns_empty_output() {
    let store = fixture_store();
    store.fail_with("graph store unavailable");

    let output = retriever(&store)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert!(output.degraded);
    assert!(output.documents.is_empty());
    assert!(output.graph_paths.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out_per_strategy() {
    let store = fixture_store();
    store.set_delay(Duration::from_secs(30));

    let output = retriever(&store)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert!(output.degraded);
    assert!(output.documents.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_abandons_strategies() {
    let store = fixture_store();
    store.set_delay(Duration::from_secs(2));
    let config = RetrievalConfig {
        request_timeout_ms: 500,
        ..RetrievalConfig::default()
    };

    let started = tokio::time::Instant::now();
    let output = retriever_with(&store, uncached(), config)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(output.degraded);
    assert!(output.documents.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_keeps_completed_strategies() {
    let store = fixture_store();
    store.set_edge_delay(Duration::from_secs(2));
    let config = RetrievalConfig {
        request_timeout_ms: 500,
        ..RetrievalConfig::default()
    };

    let output = retriever_with(&store, uncached(), config)
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    assert!(output.degraded);
    assert_eq!(
        ids(&output),
        vec!["chunk_sw_overview", "chunk_sw_requirements"]
    );
    assert!(
        output
            .documents
            .iter()
            .all(|d| d.retrieval_strategy == Strategy::Direct)
    );
}

/// Answers after a fixed delay, recognizing nothing.
#[derive(Debug)]
struct SlowRecognizer(Duration);

#[async_trait::async_trait]
impl EntityRecognizer for SlowRecognizer {
    async fn recognize(&self, _text: &str) -> anyhow::Result<Vec<RecognizedEntity>> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_covers_entity_recognition() {
    let store = fixture_store();
    store.set_edge_delay(Duration::from_millis(200));
    let config = RetrievalConfig {
        request_timeout_ms: 500,
        ..RetrievalConfig::default()
    };
    let retriever = retriever_with(&store, uncached(), config)
        .with_recognizer(Arc::new(SlowRecognizer(Duration::from_millis(450))));

    let started = tokio::time::Instant::now();
    let output = retriever
        .run(RetrievalRequest::new("Skilled Worker visa"))
        .await
        .unwrap();

    // Recognition used most of the budget, so edge strategies miss the deadline
    assert!(started.elapsed() <= Duration::from_millis(500));
    assert!(output.degraded);
    assert_eq!(
        ids(&output),
        vec!["chunk_sw_overview", "chunk_sw_requirements"]
    );
}

// =============================================================================
// Cache-aside
// =============================================================================

#[tokio::test]
async fn test_results_are_served_from_cache() {
    let store = fixture_store();
    let cache = in_memory_cache();
    let retriever = retriever_with(&store, Arc::clone(&cache), RetrievalConfig::default());
    let request = RetrievalRequest::new("Skilled Worker visa").with_top_k(3);

    let first = retriever.run(request.clone()).await.unwrap();
    let calls = store.call_count();
    let second = retriever.run(request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.call_count(), calls);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_request_parameters_change_the_key() {
    let store = fixture_store();
    let cache = in_memory_cache();
    let retriever = retriever_with(&store, Arc::clone(&cache), RetrievalConfig::default());

    let three = retriever
        .run(RetrievalRequest::new("Skilled Worker visa").with_top_k(3))
        .await
        .unwrap();
    let five = retriever
        .run(RetrievalRequest::new("Skilled Worker visa").with_top_k(5))
        .await
        .unwrap();

    assert_eq!(three.documents.len(), 3);
    assert_eq!(five.documents.len(), 5);
    assert_eq!(cache.stats().await.hits, 0);
}

#[tokio::test]
async fn test_degraded_results_are_not_cached() {
    let store = fixture_store();
    let cache = in_memory_cache();
    let retriever = retriever_with(&store, Arc::clone(&cache), RetrievalConfig::default());
    let request = RetrievalRequest::new("Skilled Worker visa");

    store.fail_edges_with("transient");
    let degraded = retriever.run(request.clone()).await.unwrap();
    assert!(degraded.degraded);

    store.clear_faults();
    let recovered = retriever.run(request).await.unwrap();
    assert!(!recovered.degraded);
    assert_eq!(recovered.documents.len(), 7);
}

#[tokio::test]
async fn test_invalidation_forces_recomputation() {
    let store = fixture_store();
    let cache = in_memory_cache();
    let retriever = retriever_with(&store, Arc::clone(&cache), RetrievalConfig::default());
    let request = RetrievalRequest::new("Skilled Worker visa");

    retriever.run(request.clone()).await.unwrap();
    assert_eq!(cache.invalidate_pattern("graph:query:run:*").await, 1);

    let calls = store.call_count();
    retriever.run(request).await.unwrap();
    assert!(store.call_count() > calls);
}
