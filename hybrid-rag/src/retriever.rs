//! The hybrid retriever: two-stage search and projection into documents.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::{RetrievalConfig, VectorSpaces};
use crate::document::{Document, ScoredDocument, ScoredPoint};
use crate::embedding::QueryEmbeddingBundle;
use crate::error::{RetrievalError, Result};
use crate::index::{HybridQuery, Prefetch, QueryVector, VectorIndex};

/// Runs prefetch-then-rerank searches against a [`VectorIndex`].
///
/// The dense and sparse query vectors each prefetch up to `prefetch_limit`
/// candidates; the pooled candidates are reranked with the late-interaction
/// vector (MAX-SIM) and the best `limit` are projected into [`Document`]s.
///
/// No retries are performed. [`RetrievalError::is_retryable`] tells the
/// caller which failures are worth retrying.
#[derive(Clone)]
pub struct HybridRetriever {
    index: Arc<dyn VectorIndex>,
    collection: String,
    prefetch_limit: u64,
    spaces: VectorSpaces,
    timeout: Duration,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("index", &self.index.name())
            .field("collection", &self.collection)
            .field("prefetch_limit", &self.prefetch_limit)
            .field("spaces", &self.spaces)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HybridRetriever {
    /// Create a retriever over `index` using the collection, prefetch limit,
    /// vector spaces and timeout from `config`.
    pub fn new(index: Arc<dyn VectorIndex>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            collection: config.collection_name.clone(),
            prefetch_limit: config.prefetch_limit,
            spaces: config.vector_spaces.clone(),
            timeout: config.timeout(),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The collection searched.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Build the two-stage request for an embedding bundle.
    pub fn build_query(&self, embeddings: &QueryEmbeddingBundle, limit: usize) -> HybridQuery {
        HybridQuery {
            collection: self.collection.clone(),
            prefetch: vec![
                Prefetch {
                    query: QueryVector::Dense(embeddings.dense().to_vec()),
                    using: self.spaces.dense.clone(),
                    limit: self.prefetch_limit,
                },
                Prefetch {
                    query: QueryVector::Sparse(embeddings.sparse().clone()),
                    using: self.spaces.sparse.clone(),
                    limit: self.prefetch_limit,
                },
            ],
            query: QueryVector::Multi(embeddings.late_interaction().clone()),
            using: self.spaces.late_interaction.clone(),
            limit: limit as u64,
            with_payload: true,
        }
    }

    /// Search and return documents with their ids and rerank scores, best first.
    ///
    /// A `limit` of zero returns an empty list without querying the index.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::RetrievalUnavailable`] if the index is unreachable
    ///   or the call exceeds the configured timeout.
    /// - [`RetrievalError::RetrievalInternalError`] for malformed hits or
    ///   payloads and any other index failure.
    pub async fn search_scored(
        &self,
        embeddings: &QueryEmbeddingBundle,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if limit == 0 {
            debug!(collection = %self.collection, "limit is zero, skipping index query");
            return Ok(Vec::new());
        }

        let request = self.build_query(embeddings, limit);
        let backend = self.index.name().to_string();

        let hits = match tokio::time::timeout(self.timeout, self.index.query(&request)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                let e = classify(e, &backend);
                error!(collection = %self.collection, backend, error = %e, "hybrid search failed");
                return Err(e);
            }
            Err(_) => {
                error!(
                    collection = %self.collection,
                    backend,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "hybrid search timed out"
                );
                return Err(RetrievalError::unavailable(
                    backend,
                    format!("search timed out after {:?}", self.timeout),
                ));
            }
        };

        let documents = assemble(hits, limit, &backend).inspect_err(|e| {
            error!(collection = %self.collection, error = %e, "failed to project search hits");
        })?;

        if documents.is_empty() {
            warn!(collection = %self.collection, "hybrid search returned no documents");
        } else {
            debug!(collection = %self.collection, result_count = documents.len(), "hybrid search completed");
        }
        Ok(documents)
    }

    /// Search and return documents only, best first.
    ///
    /// # Errors
    ///
    /// Same as [`search_scored`](Self::search_scored).
    pub async fn search_documents(
        &self,
        embeddings: &QueryEmbeddingBundle,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let scored = self.search_scored(embeddings, limit).await?;
        Ok(scored.into_iter().map(|hit| hit.document).collect())
    }
}

/// Errors coming out of the index must be one of the two retrieval classes.
fn classify(err: RetrievalError, backend: &str) -> RetrievalError {
    match err {
        e @ (RetrievalError::RetrievalUnavailable { .. }
        | RetrievalError::RetrievalInternalError { .. }) => e,
        other => RetrievalError::internal(backend, other.to_string()),
    }
}

/// Rank-sensitive assembly: dedupe by id (first wins), stable sort by
/// descending score, truncate, project payloads.
fn assemble(hits: Vec<ScoredPoint>, limit: usize, backend: &str) -> Result<Vec<ScoredDocument>> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ScoredPoint> =
        hits.into_iter().filter(|hit| seen.insert(hit.id.clone())).collect();

    if let Some(hit) = unique.iter().find(|hit| !hit.score.is_finite()) {
        return Err(RetrievalError::internal(
            backend,
            format!("point {} has a non-finite score", hit.id),
        ));
    }
    unique.sort_by(|a, b| b.score.total_cmp(&a.score));
    unique.truncate(limit);

    unique
        .into_iter()
        .map(|hit| {
            let document = Document::from_payload(&hit.payload, backend)?;
            Ok(ScoredDocument { id: hit.id, score: hit.score, document })
        })
        .collect()
}
