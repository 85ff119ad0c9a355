//! The query embedder: one query string in, one [`QueryEmbeddingBundle`] out.

use std::sync::{Arc, Once};

use tracing::{debug, error};

use crate::embedding::{
    DenseEmbedder, LateInteractionEmbedder, MultiVectorEmbedding, QueryEmbeddingBundle,
    SparseEmbedder, SparseVector,
};
use crate::error::{EmbeddingModelKind, RetrievalError, Result};

const TOKENIZERS_PARALLELISM: &str = "TOKENIZERS_PARALLELISM";

static DISABLE_TOKENIZER_PARALLELISM: Once = Once::new();

/// Turn off tokenizer-level thread parallelism for this process.
///
/// Tokenizer thread pools deadlock when combined with the host's own
/// threading. An explicit `TOKENIZERS_PARALLELISM` set by the operator is
/// left alone. Runs at most once per process.
///
/// Call it from `main` before the async runtime or any other thread starts.
/// [`QueryEmbedder::new`] and the model loaders call it too, which only has
/// an effect when `main` did not.
pub fn disable_tokenizer_parallelism() {
    DISABLE_TOKENIZER_PARALLELISM.call_once(|| {
        if std::env::var_os(TOKENIZERS_PARALLELISM).is_none() {
            // SAFETY: the first call is made from `main` while the process is
            // still single-threaded; every later call skips this closure.
            unsafe { std::env::set_var(TOKENIZERS_PARALLELISM, "false") };
            debug!("tokenizer parallelism disabled");
        }
    });
}

/// Maps a query to its dense, sparse and late-interaction vectors.
///
/// Holds the three models as shared handles. Cloning is cheap and clones
/// share the same models.
#[derive(Clone)]
pub struct QueryEmbedder {
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
    late_interaction: Arc<dyn LateInteractionEmbedder>,
}

impl std::fmt::Debug for QueryEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEmbedder")
            .field("dense", &self.dense.name())
            .field("sparse", &self.sparse.name())
            .field("late_interaction", &self.late_interaction.name())
            .finish()
    }
}

impl QueryEmbedder {
    /// Create an embedder from three loaded models.
    pub fn new(
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
        late_interaction: Arc<dyn LateInteractionEmbedder>,
    ) -> Self {
        disable_tokenizer_parallelism();
        Self { dense, sparse, late_interaction }
    }

    /// Embed a query, running the three models concurrently on the blocking pool.
    ///
    /// All three must finish before the bundle is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingFailure`] naming the first model
    /// that failed or produced a malformed vector.
    pub async fn embed_query(&self, query: &str) -> Result<QueryEmbeddingBundle> {
        debug!(query_len = query.len(), "embedding query");

        let dense = {
            let model = Arc::clone(&self.dense);
            let text = query.to_owned();
            tokio::task::spawn_blocking(move || run_dense(model.as_ref(), &text))
        };
        let sparse = {
            let model = Arc::clone(&self.sparse);
            let text = query.to_owned();
            tokio::task::spawn_blocking(move || run_sparse(model.as_ref(), &text))
        };
        let late_interaction = {
            let model = Arc::clone(&self.late_interaction);
            let text = query.to_owned();
            tokio::task::spawn_blocking(move || run_late_interaction(model.as_ref(), &text))
        };

        let (dense, sparse, late_interaction) = tokio::join!(dense, sparse, late_interaction);
        let dense = joined(EmbeddingModelKind::Dense, dense)?;
        let sparse = joined(EmbeddingModelKind::Sparse, sparse)?;
        let late_interaction = joined(EmbeddingModelKind::LateInteraction, late_interaction)?;

        Ok(QueryEmbeddingBundle::new(dense, sparse, late_interaction))
    }

    /// Embed a query on the current thread, one model after the other.
    ///
    /// # Errors
    ///
    /// Same as [`embed_query`](Self::embed_query).
    pub fn embed_query_blocking(&self, query: &str) -> Result<QueryEmbeddingBundle> {
        let dense = run_dense(self.dense.as_ref(), query)?;
        let sparse = run_sparse(self.sparse.as_ref(), query)?;
        let late_interaction = run_late_interaction(self.late_interaction.as_ref(), query)?;
        Ok(QueryEmbeddingBundle::new(dense, sparse, late_interaction))
    }
}

fn joined<T>(
    model: EmbeddingModelKind,
    result: std::result::Result<Result<T>, tokio::task::JoinError>,
) -> Result<T> {
    result.map_err(|e| {
        error!(%model, error = %e, "embedding task did not complete");
        RetrievalError::embedding(model, format!("embedding task did not complete: {e}"))
    })?
}

/// Re-tag any error a model returns as a failure of that model.
fn as_model_failure(model: EmbeddingModelKind, name: &str, err: RetrievalError) -> RetrievalError {
    error!(%model, model_name = name, error = %err, "embedding model failed");
    match err {
        RetrievalError::EmbeddingFailure { model: reported, message } if reported == model => {
            RetrievalError::EmbeddingFailure { model, message }
        }
        other => RetrievalError::embedding(model, format!("{name}: {other}")),
    }
}

fn run_dense(model: &dyn DenseEmbedder, text: &str) -> Result<Vec<f32>> {
    let kind = EmbeddingModelKind::Dense;
    let vector = model.embed_dense(text).map_err(|e| as_model_failure(kind, model.name(), e))?;

    if vector.len() != model.dimensions() {
        return Err(as_model_failure(
            kind,
            model.name(),
            RetrievalError::embedding(
                kind,
                format!("expected {} dimensions, got {}", model.dimensions(), vector.len()),
            ),
        ));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(as_model_failure(
            kind,
            model.name(),
            RetrievalError::embedding(kind, "dense vector contains non-finite values"),
        ));
    }
    Ok(vector)
}

fn run_sparse(model: &dyn SparseEmbedder, text: &str) -> Result<SparseVector> {
    model
        .embed_sparse(text)
        .map_err(|e| as_model_failure(EmbeddingModelKind::Sparse, model.name(), e))
}

fn run_late_interaction(
    model: &dyn LateInteractionEmbedder,
    text: &str,
) -> Result<MultiVectorEmbedding> {
    let kind = EmbeddingModelKind::LateInteraction;
    let vectors = model
        .embed_late_interaction(text)
        .map_err(|e| as_model_failure(kind, model.name(), e))?;

    let dims = model.dimensions();
    if let Some((token, bad)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(as_model_failure(
            kind,
            model.name(),
            RetrievalError::embedding(
                kind,
                format!("token {token} has {} dimensions, expected {dims}", bad.len()),
            ),
        ));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>, usize);

    impl DenseEmbedder for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn dimensions(&self) -> usize {
            self.1
        }
        fn embed_dense(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn dense_dimension_mismatch_is_a_dense_failure() {
        let err = run_dense(&Fixed(vec![1.0, 2.0], 3), "q").unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::EmbeddingFailure { model: EmbeddingModelKind::Dense, .. }
        ));
    }

    #[test]
    fn foreign_errors_are_retagged() {
        let err = as_model_failure(
            EmbeddingModelKind::Sparse,
            "bm25",
            RetrievalError::ConfigError("vocab missing".into()),
        );
        match err {
            RetrievalError::EmbeddingFailure { model, message } => {
                assert_eq!(model, EmbeddingModelKind::Sparse);
                assert!(message.contains("vocab missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disabling_parallelism_is_idempotent() {
        disable_tokenizer_parallelism();
        let first = std::env::var_os(TOKENIZERS_PARALLELISM);
        disable_tokenizer_parallelism();
        assert_eq!(std::env::var_os(TOKENIZERS_PARALLELISM), first);
        assert!(first.is_some());
    }
}
