//! Embedding model traits and the vector types they produce.
//!
//! A query is represented three ways: a dense vector, a sparse lexical
//! vector, and a late-interaction multivector (one vector per query token).
//! Each representation comes from its own model behind one of the traits
//! below. Implementations are blocking and are expected to be loaded once
//! and shared for the lifetime of the process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingModelKind, RetrievalError, Result};

/// Multi-vector embedding: a matrix of token embeddings.
pub type MultiVectorEmbedding = Vec<Vec<f32>>;

/// A sparse vector: token id mapped to a positive weight.
///
/// Stored as parallel `indices`/`values` arrays sorted by index, which is the
/// shape the index backends expect. Deserialization goes through
/// [`SparseVector::try_new`], so the same checks apply to decoded input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSparseVector")]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct RawSparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl TryFrom<RawSparseVector> for SparseVector {
    type Error = RetrievalError;

    fn try_from(raw: RawSparseVector) -> Result<Self> {
        Self::try_new(raw.indices, raw.values)
    }
}

impl SparseVector {
    /// Build a sparse vector from parallel index/value arrays.
    ///
    /// Zero weights are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingFailure`] for the sparse model if the
    /// arrays differ in length, an index repeats, or a weight is negative or
    /// not finite.
    pub fn try_new(indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(RetrievalError::embedding(
                EmbeddingModelKind::Sparse,
                format!(
                    "sparse vector has {} indices but {} values",
                    indices.len(),
                    values.len()
                ),
            ));
        }

        let mut weights = BTreeMap::new();
        for (index, value) in indices.into_iter().zip(values) {
            if !value.is_finite() || value < 0.0 {
                return Err(RetrievalError::embedding(
                    EmbeddingModelKind::Sparse,
                    format!("sparse weight for token {index} is invalid: {value}"),
                ));
            }
            if weights.insert(index, value).is_some() {
                return Err(RetrievalError::embedding(
                    EmbeddingModelKind::Sparse,
                    format!("sparse token id {index} appears more than once"),
                ));
            }
        }
        Ok(Self::from_weights(weights))
    }

    /// Build a sparse vector from an ordered weight map, dropping zero weights.
    pub fn from_weights(weights: BTreeMap<u32, f32>) -> Self {
        let (indices, values) = weights.into_iter().filter(|(_, w)| *w > 0.0).unzip();
        Self { indices, values }
    }

    /// Token ids, ascending.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Weights, aligned with [`indices`](Self::indices).
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of non-zero entries.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the vector has no entries.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterate over `(token id, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product with another sparse vector.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// The three vectors computed from one query string.
///
/// Never partially populated: if any model fails, no bundle is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEmbeddingBundle {
    dense: Vec<f32>,
    sparse: SparseVector,
    late_interaction: MultiVectorEmbedding,
}

impl QueryEmbeddingBundle {
    /// Assemble a bundle from its three parts.
    pub fn new(dense: Vec<f32>, sparse: SparseVector, late_interaction: MultiVectorEmbedding) -> Self {
        Self { dense, sparse, late_interaction }
    }

    /// The dense semantic vector.
    pub fn dense(&self) -> &[f32] {
        &self.dense
    }

    /// The sparse lexical vector.
    pub fn sparse(&self) -> &SparseVector {
        &self.sparse
    }

    /// The token-level late-interaction vectors.
    pub fn late_interaction(&self) -> &MultiVectorEmbedding {
        &self.late_interaction
    }

    /// Split the bundle into its parts.
    pub fn into_parts(self) -> (Vec<f32>, SparseVector, MultiVectorEmbedding) {
        (self.dense, self.sparse, self.late_interaction)
    }
}

/// A model producing one fixed-length dense vector per text.
pub trait DenseEmbedder: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Length of every produced vector.
    fn dimensions(&self) -> usize;

    /// Embed a single text. Blocking.
    fn embed_dense(&self, text: &str) -> Result<Vec<f32>>;
}

/// A model producing a sparse lexical vector per text.
pub trait SparseEmbedder: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Embed a single text. Blocking.
    fn embed_sparse(&self, text: &str) -> Result<SparseVector>;
}

/// A model producing one vector per token of the text.
pub trait LateInteractionEmbedder: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Length of every token vector.
    fn dimensions(&self) -> usize;

    /// Embed a single query text. Blocking.
    fn embed_late_interaction(&self, text: &str) -> Result<MultiVectorEmbedding>;
}
