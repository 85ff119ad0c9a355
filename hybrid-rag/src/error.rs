//! Error types for the `hybrid-rag` crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one of the three query embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingModelKind {
    /// The dense semantic model.
    Dense,
    /// The sparse lexical (BM25-style) model.
    Sparse,
    /// The token-level late-interaction model.
    LateInteraction,
}

impl fmt::Display for EmbeddingModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Sparse => f.write_str("sparse"),
            Self::LateInteraction => f.write_str("late_interaction"),
        }
    }
}

/// Errors that can occur while embedding a query or searching the index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// One of the embedding models failed to produce a vector.
    #[error("Embedding failure ({model}): {message}")]
    EmbeddingFailure {
        /// The sub-model that failed.
        model: EmbeddingModelKind,
        /// A description of the failure.
        message: String,
    },

    /// The index backend is unreachable, timed out, or answered with a
    /// transport/protocol level error. Safe to retry with backoff.
    #[error("Retrieval unavailable ({backend}): {message}")]
    RetrievalUnavailable {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Any other failure during search or payload projection.
    #[error("Retrieval internal error ({backend}): {message}")]
    RetrievalInternalError {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RetrievalError {
    pub(crate) fn embedding(model: EmbeddingModelKind, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure { model, message: message.into() }
    }

    pub(crate) fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetrievalUnavailable { backend: backend.into(), message: message.into() }
    }

    pub(crate) fn internal(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetrievalInternalError { backend: backend.into(), message: message.into() }
    }

    /// Whether a caller may retry the operation after backing off.
    ///
    /// Only [`RetrievalError::RetrievalUnavailable`] is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetrievalUnavailable { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
