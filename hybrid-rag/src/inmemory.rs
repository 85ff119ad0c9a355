//! In-memory multi-vector index.
//!
//! This module provides [`InMemoryIndex`], a [`VectorIndex`] backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It evaluates two-stage
//! queries the same way the Qdrant collection is configured: cosine for the
//! dense space, dot product for the sparse space and MAX-SIM for the
//! late-interaction space. Suitable for development, testing, and small
//! corpora.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::VectorSpaces;
use crate::document::{Payload, PointId, ScoredPoint};
use crate::embedding::{MultiVectorEmbedding, SparseVector};
use crate::error::{RetrievalError, Result};
use crate::index::{HybridQuery, Prefetch, QueryVector, VectorIndex};
use crate::scoring::{cosine_similarity, max_sim};

const BACKEND: &str = "in_memory";

/// A point with its three vectors and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    /// Point identity; upserting an existing id replaces the point.
    pub id: PointId,
    /// Dense vector.
    pub dense: Vec<f32>,
    /// Sparse vector.
    pub sparse: SparseVector,
    /// Late-interaction token vectors.
    pub late_interaction: MultiVectorEmbedding,
    /// Stored payload.
    pub payload: Payload,
}

/// An in-memory [`VectorIndex`].
///
/// Collections are stored as insertion-ordered point lists. Ties in any
/// ranking are broken by insertion order, so results are deterministic.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::{InMemoryIndex, VectorSpaces};
///
/// let index = InMemoryIndex::new(VectorSpaces::default());
/// index.create_collection("documents").await;
/// index.upsert("documents", points).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Vec<IndexedPoint>>>,
    spaces: VectorSpaces,
    score_floor: f32,
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(VectorSpaces::default())
    }
}

impl InMemoryIndex {
    /// Create an empty index using the given vector space names.
    pub fn new(spaces: VectorSpaces) -> Self {
        Self { collections: RwLock::new(HashMap::new()), spaces, score_floor: 0.0 }
    }

    /// Set the minimum dense and late-interaction score a prefetch
    /// candidate must exceed. Sparse candidates always need a positive
    /// dot product. Defaults to `0.0`.
    pub fn with_score_floor(mut self, floor: f32) -> Self {
        self.score_floor = floor;
        self
    }

    /// Create a named collection. No-op if it already exists.
    pub async fn create_collection(&self, name: &str) {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
    }

    /// Delete a named collection and all its points.
    pub async fn delete_collection(&self, name: &str) {
        let mut collections = self.collections.write().await;
        collections.remove(name);
    }

    /// Insert or replace points in a collection.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::RetrievalInternalError`] if the collection
    /// does not exist.
    pub async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| {
            RetrievalError::internal(BACKEND, format!("collection '{collection}' does not exist"))
        })?;

        let count = points.len();
        for point in points {
            match store.iter_mut().find(|existing| existing.id == point.id) {
                Some(existing) => *existing = point,
                None => store.push(point),
            }
        }
        debug!(collection, count, "upserted points into in-memory index");
        Ok(())
    }

    /// Number of points in a collection, or `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(Vec::len)
    }

    fn score(&self, point: &IndexedPoint, vector: &QueryVector, using: &str) -> Result<f32> {
        match vector {
            QueryVector::Dense(query) if using == self.spaces.dense => {
                check_dimensions(using, point, query.len(), point.dense.len())?;
                Ok(cosine_similarity(query, &point.dense))
            }
            QueryVector::Sparse(query) if using == self.spaces.sparse => {
                Ok(query.dot(&point.sparse))
            }
            QueryVector::Multi(query) if using == self.spaces.late_interaction => {
                if let Some(dim) = query.first().map(Vec::len) {
                    for token in query.iter().chain(&point.late_interaction) {
                        check_dimensions(using, point, dim, token.len())?;
                    }
                }
                Ok(max_sim(query, &point.late_interaction))
            }
            _ => Err(RetrievalError::internal(
                BACKEND,
                format!("vector space '{using}' does not accept this query vector"),
            )),
        }
    }

    /// Candidate positions for one prefetch, best first.
    fn prefetch(&self, points: &[IndexedPoint], prefetch: &Prefetch) -> Result<Vec<usize>> {
        let floor = match prefetch.query {
            QueryVector::Sparse(_) => 0.0,
            _ => self.score_floor,
        };

        let mut scored = Vec::new();
        for (position, point) in points.iter().enumerate() {
            let score = self.score(point, &prefetch.query, &prefetch.using)?;
            if score > floor {
                scored.push((position, score));
            }
        }
        sort_descending(&mut scored);
        scored.truncate(usize::try_from(prefetch.limit).unwrap_or(usize::MAX));
        Ok(scored.into_iter().map(|(position, _)| position).collect())
    }
}

fn check_dimensions(using: &str, point: &IndexedPoint, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(RetrievalError::internal(
        BACKEND,
        format!(
            "vector space '{using}': query has dimension {expected} but point {} has {actual}",
            point.id
        ),
    ))
}

/// Stable sort by descending score.
fn sort_descending(scored: &mut [(usize, f32)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn query(&self, request: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let points = collections.get(&request.collection).ok_or_else(|| {
            RetrievalError::unavailable(
                BACKEND,
                format!("collection '{}' does not exist", request.collection),
            )
        })?;

        // Without a prefetch stage the whole collection is the candidate pool.
        let mut candidates: Vec<usize> = if request.prefetch.is_empty() {
            (0..points.len()).collect()
        } else {
            let mut seen = HashSet::new();
            let mut pool = Vec::new();
            for prefetch in &request.prefetch {
                for position in self.prefetch(points, prefetch)? {
                    if seen.insert(position) {
                        pool.push(position);
                    }
                }
            }
            pool
        };
        candidates.sort_unstable();

        let mut scored = Vec::with_capacity(candidates.len());
        for position in candidates {
            let score = self.score(&points[position], &request.query, &request.using)?;
            scored.push((position, score));
        }
        sort_descending(&mut scored);
        scored.truncate(usize::try_from(request.limit).unwrap_or(usize::MAX));

        debug!(
            collection = %request.collection,
            hits = scored.len(),
            "in-memory hybrid query completed"
        );

        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let point = &points[position];
                ScoredPoint {
                    id: point.id.clone(),
                    score,
                    payload: if request.with_payload { point.payload.clone() } else { Payload::new() },
                }
            })
            .collect())
    }
}
