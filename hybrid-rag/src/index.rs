//! Vector index trait for two-stage (prefetch, then rerank) queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::ScoredPoint;
use crate::embedding::{MultiVectorEmbedding, SparseVector};
use crate::error::Result;

/// A query vector addressed to one named vector space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "vector", rename_all = "snake_case")]
pub enum QueryVector {
    /// Nearest neighbours by cosine similarity.
    Dense(Vec<f32>),
    /// Nearest neighbours by sparse dot product.
    Sparse(SparseVector),
    /// MAX-SIM over token vectors.
    Multi(MultiVectorEmbedding),
}

/// One first-stage candidate search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefetch {
    /// The query vector.
    pub query: QueryVector,
    /// The vector space searched.
    pub using: String,
    /// Maximum number of candidates.
    pub limit: u64,
}

/// A two-stage search request.
///
/// The index runs every [`Prefetch`] independently, pools the candidates
/// (deduplicated by point id), rescores the pool with `query` against the
/// `using` space and returns at most `limit` hits by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    /// Collection searched.
    pub collection: String,
    /// Candidate generation stage.
    pub prefetch: Vec<Prefetch>,
    /// Rerank query vector.
    pub query: QueryVector,
    /// Rerank vector space.
    pub using: String,
    /// Maximum number of hits returned.
    pub limit: u64,
    /// Whether hits carry their payload.
    pub with_payload: bool,
}

/// A multi-vector index capable of prefetch-then-rerank queries.
///
/// Implementations map transport failures to
/// [`RetrievalError::RetrievalUnavailable`](crate::RetrievalError::RetrievalUnavailable)
/// and everything else to
/// [`RetrievalError::RetrievalInternalError`](crate::RetrievalError::RetrievalInternalError).
/// An empty hit list is a valid answer, not an error.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Execute a two-stage query.
    async fn query(&self, request: &HybridQuery) -> Result<Vec<ScoredPoint>>;
}
