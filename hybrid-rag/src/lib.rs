//! # hybrid-rag
//!
//! Hybrid retrieval over a multi-vector index for Retrieval-Augmented
//! Generation.
//!
//! A query is embedded three ways: a dense sentence embedding, a sparse
//! BM25 term-weight vector and a late-interaction (ColBERT) token matrix.
//! The dense and sparse vectors each prefetch candidates from the index;
//! the pooled candidates are reranked with MAX-SIM over the token matrix
//! and the best `limit` are returned as [`Document`]s.
//!
//! ## Features
//!
//! - `qdrant` (default): [`qdrant::QdrantIndex`] over gRPC
//! - `fastembed`: local ONNX dense and ColBERT models via fastembed
//! - `full`: both
//!
//! An [`InMemoryIndex`] with the same scoring is always available for
//! development and tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hybrid_rag::{HybridSearchPipeline, RetrievalConfig};
//! use hybrid_rag::fastembed::load_query_embedder;
//! use hybrid_rag::qdrant::QdrantIndex;
//!
//! let config = RetrievalConfig::from_env()?;
//! let pipeline = HybridSearchPipeline::builder()
//!     .embedder(load_query_embedder(&config)?)
//!     .index(Arc::new(QdrantIndex::new(&config)?))
//!     .config(config)
//!     .build()?;
//!
//! for doc in pipeline.search("What is the capital of France?", 3).await? {
//!     println!("{}", doc.page_content);
//! }
//! ```

pub mod bm25;
pub mod config;
pub mod document;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod index;
pub mod inmemory;
pub mod pipeline;
pub mod retriever;
pub mod scoring;

#[cfg(feature = "qdrant")]
pub mod qdrant;

#[cfg(feature = "fastembed")]
pub mod fastembed;

pub use bm25::{BM25_MODEL_NAME, Bm25Embedder, TermWeighting};
pub use config::{LateInteractionMode, RetrievalConfig, RetrievalConfigBuilder, VectorSpaces};
pub use document::{Document, Metadata, Payload, PointId, ScoredDocument, ScoredPoint};
pub use embedder::{QueryEmbedder, disable_tokenizer_parallelism};
pub use embedding::{
    DenseEmbedder, LateInteractionEmbedder, MultiVectorEmbedding, QueryEmbeddingBundle,
    SparseEmbedder, SparseVector,
};
pub use error::{EmbeddingModelKind, Result, RetrievalError};
pub use index::{HybridQuery, Prefetch, QueryVector, VectorIndex};
pub use inmemory::{InMemoryIndex, IndexedPoint};
pub use pipeline::{HybridSearchPipeline, HybridSearchPipelineBuilder, SearchOutcome};
pub use retriever::HybridRetriever;
