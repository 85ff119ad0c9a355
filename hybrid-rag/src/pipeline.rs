//! Search pipeline: embed the query, then run the hybrid retriever.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_rag::{HybridSearchPipeline, RetrievalConfig, qdrant::QdrantIndex};
//!
//! let config = RetrievalConfig::from_env()?;
//! let pipeline = HybridSearchPipeline::builder()
//!     .index(Arc::new(QdrantIndex::new(&config)?))
//!     .embedder(embedder)
//!     .config(config)
//!     .build()?;
//!
//! let documents = pipeline.search("What is the capital of France?", 3).await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::RetrievalConfig;
use crate::document::{Document, ScoredDocument};
use crate::embedder::QueryEmbedder;
use crate::embedding::QueryEmbeddingBundle;
use crate::error::{RetrievalError, Result};
use crate::index::VectorIndex;
use crate::retriever::HybridRetriever;

/// The embeddings computed for a query together with the documents found.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Query embeddings used for the search.
    pub embeddings: QueryEmbeddingBundle,
    /// Ranked documents with ids and scores.
    pub documents: Vec<ScoredDocument>,
}

/// Query text in, ranked documents out.
///
/// Holds the embedder and retriever built once at startup. Errors from
/// either stage are returned unchanged. Construct via
/// [`HybridSearchPipeline::builder()`].
#[derive(Debug, Clone)]
pub struct HybridSearchPipeline {
    config: RetrievalConfig,
    embedder: QueryEmbedder,
    retriever: HybridRetriever,
}

impl HybridSearchPipeline {
    /// Create a new [`HybridSearchPipelineBuilder`].
    pub fn builder() -> HybridSearchPipelineBuilder {
        HybridSearchPipelineBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return a reference to the query embedder.
    pub fn embedder(&self) -> &QueryEmbedder {
        &self.embedder
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Embed `query` and return up to `limit` documents, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingFailure`] if any model fails, or a
    /// retrieval error from the index.
    #[instrument(skip(self), fields(collection = %self.retriever.collection()))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let outcome = self.search_with_embeddings(query, limit).await?;
        Ok(outcome.documents.into_iter().map(|hit| hit.document).collect())
    }

    /// [`search`](Self::search) with the configured default limit.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn search_with_default_limit(&self, query: &str) -> Result<Vec<Document>> {
        self.search(query, self.config.default_limit).await
    }

    /// Search and also return the query embeddings and per-document scores.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn search_with_embeddings(&self, query: &str, limit: usize) -> Result<SearchOutcome> {
        let collection = self.retriever.collection();
        let embeddings = self.embedder.embed_query(query).await.inspect_err(|e| {
            error!(query, collection, error = %e, "query embedding failed");
        })?;
        let documents = self.retriever.search_scored(&embeddings, limit).await.inspect_err(|e| {
            error!(query, collection, error = %e, "retrieval failed for query");
        })?;
        info!(
            collection = %self.retriever.collection(),
            result_count = documents.len(),
            "search completed"
        );
        Ok(SearchOutcome { embeddings, documents })
    }
}

/// Builder for constructing a [`HybridSearchPipeline`].
///
/// All fields are required.
#[derive(Default)]
pub struct HybridSearchPipelineBuilder {
    config: Option<RetrievalConfig>,
    embedder: Option<QueryEmbedder>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl HybridSearchPipelineBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the query embedder.
    pub fn embedder(mut self, embedder: QueryEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector index backend.
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`HybridSearchPipeline`], validating that all fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if any field is missing.
    pub fn build(self) -> Result<HybridSearchPipeline> {
        let config =
            self.config.ok_or_else(|| RetrievalError::ConfigError("config is required".into()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RetrievalError::ConfigError("embedder is required".into()))?;
        let index =
            self.index.ok_or_else(|| RetrievalError::ConfigError("index is required".into()))?;

        let retriever = HybridRetriever::new(index, &config);
        Ok(HybridSearchPipeline { config, embedder, retriever })
    }
}
