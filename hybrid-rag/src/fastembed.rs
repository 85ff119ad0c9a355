//! Local ONNX embedding models via [fastembed](https://docs.rs/fastembed).
//!
//! This module is only available when the `fastembed` feature is enabled.
//! Models are downloaded on first use and cached by fastembed.

use std::sync::{Arc, Mutex};

use fastembed::{
    InitOptions, LateInteractionInitOptions, LateInteractionModel, LateInteractionTextEmbedding,
    TextEmbedding,
};
use tracing::info;

use crate::bm25::{BM25_MODEL_NAME, Bm25Embedder};
use crate::config::{LateInteractionMode, RetrievalConfig};
use crate::embedder::{QueryEmbedder, disable_tokenizer_parallelism};
use crate::embedding::{DenseEmbedder, LateInteractionEmbedder, MultiVectorEmbedding};
use crate::error::{EmbeddingModelKind, RetrievalError, Result};

/// A [`DenseEmbedder`] over a fastembed [`TextEmbedding`] model.
///
/// The ONNX session is held behind a mutex; concurrent queries take turns.
pub struct FastEmbedDense {
    model: Mutex<TextEmbedding>,
    name: String,
    dimensions: usize,
}

impl FastEmbedDense {
    /// Load a dense model by its model code (e.g. `BAAI/bge-small-en-v1.5`).
    ///
    /// The organisation prefix may differ from fastembed's own, so
    /// `sentence-transformers/paraphrase-multilingual-mpnet-base-v2` finds
    /// the `Xenova/` export of the same model.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] for unknown model codes and
    /// [`RetrievalError::EmbeddingFailure`] if the model cannot be loaded.
    pub fn try_new(model_code: &str) -> Result<Self> {
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|m| same_model(&m.model_code, model_code))
            .ok_or_else(|| {
                RetrievalError::ConfigError(format!("unknown dense model: {model_code}"))
            })?;

        let model = TextEmbedding::try_new(InitOptions::new(info.model.clone())).map_err(|e| {
            RetrievalError::embedding(
                EmbeddingModelKind::Dense,
                format!("failed to load {model_code}: {e}"),
            )
        })?;

        info!(model = model_code, dimensions = info.dim, "loaded dense embedding model");
        Ok(Self { model: Mutex::new(model), name: model_code.to_string(), dimensions: info.dim })
    }
}

impl DenseEmbedder for FastEmbedDense {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().map_err(|_| {
            RetrievalError::embedding(EmbeddingModelKind::Dense, "model lock poisoned")
        })?;
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| RetrievalError::embedding(EmbeddingModelKind::Dense, e.to_string()))?;
        embeddings.into_iter().next().ok_or_else(|| {
            RetrievalError::embedding(EmbeddingModelKind::Dense, "model returned no embedding")
        })
    }
}

/// A [`LateInteractionEmbedder`] over a fastembed ColBERT-style model.
///
/// Queries are encoded in [`LateInteractionMode::Passage`] unless
/// [`with_mode`](Self::with_mode) says otherwise.
pub struct FastEmbedLateInteraction {
    model: LateInteractionTextEmbedding,
    name: String,
    dimensions: usize,
    mode: LateInteractionMode,
}

impl FastEmbedLateInteraction {
    /// Load a late-interaction model by its model code (e.g. `colbert-ir/colbertv2.0`).
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] for unknown model codes and
    /// [`RetrievalError::EmbeddingFailure`] if the model cannot be loaded.
    pub fn try_new(model_code: &str) -> Result<Self> {
        let model_id: LateInteractionModel =
            model_code.parse().map_err(RetrievalError::ConfigError)?;

        let model = LateInteractionTextEmbedding::try_new(LateInteractionInitOptions::new(model_id))
            .map_err(|e| {
                RetrievalError::embedding(
                    EmbeddingModelKind::LateInteraction,
                    format!("failed to load {model_code}: {e}"),
                )
            })?;
        let dimensions = model.get_dimension();

        info!(model = model_code, dimensions, "loaded late-interaction embedding model");
        Ok(Self {
            model,
            name: model_code.to_string(),
            dimensions,
            mode: LateInteractionMode::default(),
        })
    }

    /// Select the encoder used for query text.
    pub fn with_mode(mut self, mode: LateInteractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// The encoder used for query text.
    pub fn mode(&self) -> LateInteractionMode {
        self.mode
    }
}

impl LateInteractionEmbedder for FastEmbedLateInteraction {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_late_interaction(&self, text: &str) -> Result<MultiVectorEmbedding> {
        let embeddings = match self.mode {
            LateInteractionMode::Passage => self.model.embed(vec![text], None),
            LateInteractionMode::Query => self.model.query_embed(vec![text], None),
        }
        .map_err(|e| {
            RetrievalError::embedding(EmbeddingModelKind::LateInteraction, e.to_string())
        })?;
        embeddings.into_iter().next().ok_or_else(|| {
            RetrievalError::embedding(
                EmbeddingModelKind::LateInteraction,
                "model returned no embedding",
            )
        })
    }
}

/// Model codes match when equal, or when their repository names are.
fn same_model(known: &str, requested: &str) -> bool {
    let repo = |code: &str| code.rsplit('/').next().unwrap_or(code).to_ascii_lowercase();
    known.eq_ignore_ascii_case(requested) || repo(known) == repo(requested)
}

/// Load the three models named in the configuration into a [`QueryEmbedder`].
///
/// The sparse model must be `Qdrant/bm25`, which is computed natively.
/// Tokenizer parallelism is disabled before any model is touched; call
/// [`disable_tokenizer_parallelism`] yourself before starting threads if
/// this runs after the async runtime is up.
///
/// # Errors
///
/// Returns the first load failure.
pub fn load_query_embedder(config: &RetrievalConfig) -> Result<QueryEmbedder> {
    disable_tokenizer_parallelism();

    if !config.sparse_model_name.eq_ignore_ascii_case(BM25_MODEL_NAME) {
        return Err(RetrievalError::ConfigError(format!(
            "unsupported sparse model: {} (only {BM25_MODEL_NAME} is available)",
            config.sparse_model_name
        )));
    }

    let dense = FastEmbedDense::try_new(&config.dense_model_name)?;
    let late_interaction = FastEmbedLateInteraction::try_new(&config.late_interaction_model_name)?
        .with_mode(config.late_interaction_mode);

    Ok(QueryEmbedder::new(
        Arc::new(dense),
        Arc::new(Bm25Embedder::new()),
        Arc::new(late_interaction),
    ))
}
