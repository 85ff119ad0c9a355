//! Hybrid retriever behaviour against stub index backends.

mod common;

use std::sync::Arc;

use hybrid_rag::{HybridRetriever, PointId, QueryVector, RetrievalConfig, RetrievalError};
use serde_json::json;

use common::{RecordingIndex, StalledIndex, UnreachableIndex, bundle, hit};

fn config() -> RetrievalConfig {
    RetrievalConfig::builder().collection_name("docs").timeout_secs(5).build().unwrap()
}

#[tokio::test]
async fn request_prefetches_dense_and_sparse_then_reranks() {
    let index = Arc::new(RecordingIndex::default());
    let retriever = HybridRetriever::new(index.clone(), &config());

    retriever.search_documents(&bundle(), 3).await.unwrap();

    let requests = index.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.collection, "docs");
    assert_eq!(request.limit, 3);
    assert!(request.with_payload);
    assert_eq!(request.using, "colbertv2.0");
    assert!(matches!(request.query, QueryVector::Multi(_)));

    assert_eq!(request.prefetch.len(), 2);
    assert_eq!(request.prefetch[0].using, "dense");
    assert!(matches!(request.prefetch[0].query, QueryVector::Dense(_)));
    assert_eq!(request.prefetch[1].using, "sparse");
    assert!(matches!(request.prefetch[1].query, QueryVector::Sparse(_)));
    assert!(request.prefetch.iter().all(|p| p.limit == 25));
}

#[tokio::test]
async fn zero_limit_returns_empty_without_querying() {
    let index = Arc::new(RecordingIndex::with_hits(vec![hit(1, 0.9, "a")]));
    let retriever = HybridRetriever::new(index.clone(), &config());

    let documents = retriever.search_documents(&bundle(), 0).await.unwrap();

    assert!(documents.is_empty());
    assert!(index.requests().is_empty());
}

#[tokio::test]
async fn no_hits_is_an_empty_success() {
    let retriever = HybridRetriever::new(Arc::new(RecordingIndex::default()), &config());
    let documents = retriever.search_documents(&bundle(), 5).await.unwrap();
    assert!(documents.is_empty());
}

#[tokio::test]
async fn hits_are_deduplicated_sorted_and_truncated() {
    let index = RecordingIndex::with_hits(vec![
        hit(1, 0.3, "low"),
        hit(2, 0.8, "high"),
        hit(2, 0.99, "duplicate of high"),
        hit(3, 0.5, "middle"),
        hit(4, 0.1, "lowest"),
    ]);
    let retriever = HybridRetriever::new(Arc::new(index), &config());

    let scored = retriever.search_scored(&bundle(), 3).await.unwrap();

    let ids: Vec<_> = scored.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, [PointId::Num(2), PointId::Num(3), PointId::Num(1)]);
    assert_eq!(scored[0].document.page_content, "high");
    assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn missing_fields_project_to_defaults() {
    let mut point = hit(1, 0.5, "ignored");
    point.payload.clear();
    let retriever =
        HybridRetriever::new(Arc::new(RecordingIndex::with_hits(vec![point])), &config());

    let documents = retriever.search_documents(&bundle(), 1).await.unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].page_content, "");
    assert!(documents[0].metadata.is_empty());
}

#[tokio::test]
async fn malformed_payload_is_internal() {
    let mut point = hit(1, 0.5, "text");
    point.payload.insert("metadata".into(), json!("not an object"));
    let retriever =
        HybridRetriever::new(Arc::new(RecordingIndex::with_hits(vec![point])), &config());

    let err = retriever.search_documents(&bundle(), 1).await.unwrap_err();

    assert!(matches!(err, RetrievalError::RetrievalInternalError { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn transport_failure_is_unavailable() {
    let retriever = HybridRetriever::new(Arc::new(UnreachableIndex), &config());

    let err = retriever.search_documents(&bundle(), 5).await.unwrap_err();

    assert!(matches!(err, RetrievalError::RetrievalUnavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn slow_index_times_out_as_unavailable() {
    let retriever = HybridRetriever::new(Arc::new(StalledIndex), &config());

    let err = retriever.search_documents(&bundle(), 5).await.unwrap_err();

    match err {
        RetrievalError::RetrievalUnavailable { backend, message } => {
            assert_eq!(backend, "stalled");
            assert!(message.contains("timed out"));
        }
        other => panic!("expected RetrievalUnavailable, got {other:?}"),
    }
}
