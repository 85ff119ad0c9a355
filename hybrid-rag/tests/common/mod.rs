//! Deterministic stand-ins for the embedding models and the index backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hybrid_rag::{
    Bm25Embedder, DenseEmbedder, EmbeddingModelKind, HybridQuery, IndexedPoint,
    LateInteractionEmbedder, MultiVectorEmbedding, Payload, PointId, QueryEmbedder,
    QueryEmbeddingBundle, Result, RetrievalError, ScoredPoint, SparseEmbedder, SparseVector,
    VectorIndex,
};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

pub const VOCABULARY_DIM: usize = 256;

/// Two-dimensional dense model: the first axis fires on "france".
pub struct KeywordDense;

impl DenseEmbedder for KeywordDense {
    fn name(&self) -> &str {
        "keyword-dense"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
        let hit = if text.to_lowercase().contains("france") { 1.0 } else { 0.0 };
        Ok(vec![hit, 1.0])
    }
}

/// One-hot token vectors over a vocabulary grown on first sight of each word.
#[derive(Default)]
pub struct VocabularyEmbedder {
    vocabulary: Mutex<HashMap<String, usize>>,
}

impl LateInteractionEmbedder for VocabularyEmbedder {
    fn name(&self) -> &str {
        "vocabulary"
    }

    fn dimensions(&self) -> usize {
        VOCABULARY_DIM
    }

    fn embed_late_interaction(&self, text: &str) -> Result<MultiVectorEmbedding> {
        let mut vocabulary = self.vocabulary.lock().unwrap();
        let vectors = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| {
                let next = vocabulary.len() % VOCABULARY_DIM;
                let slot = *vocabulary.entry(word.to_lowercase()).or_insert(next);
                let mut one_hot = vec![0.0; VOCABULARY_DIM];
                one_hot[slot] = 1.0;
                one_hot
            })
            .collect();
        Ok(vectors)
    }
}

/// Dense model that always fails.
pub struct BrokenDense;

impl DenseEmbedder for BrokenDense {
    fn name(&self) -> &str {
        "broken-dense"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn embed_dense(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RetrievalError::EmbeddingFailure {
            model: EmbeddingModelKind::Dense,
            message: "onnx session crashed".into(),
        })
    }
}

/// Sparse model that panics, standing in for a crashed worker.
pub struct PanickingSparse;

impl SparseEmbedder for PanickingSparse {
    fn name(&self) -> &str {
        "panicking-sparse"
    }

    fn embed_sparse(&self, _text: &str) -> Result<SparseVector> {
        panic!("sparse model worker died");
    }
}

pub struct Models {
    pub dense: Arc<KeywordDense>,
    pub sparse: Arc<Bm25Embedder>,
    pub late_interaction: Arc<VocabularyEmbedder>,
}

impl Models {
    pub fn new() -> Self {
        Self {
            dense: Arc::new(KeywordDense),
            sparse: Arc::new(Bm25Embedder::new()),
            late_interaction: Arc::new(VocabularyEmbedder::default()),
        }
    }

    pub fn query_embedder(&self) -> QueryEmbedder {
        QueryEmbedder::new(
            self.dense.clone(),
            self.sparse.clone(),
            self.late_interaction.clone(),
        )
    }

    /// Index a passage with the same models used for queries.
    pub fn point(&self, id: u64, text: &str) -> IndexedPoint {
        let mut payload = Payload::new();
        payload.insert("page_content".into(), json!(text));
        payload.insert("metadata".into(), json!({ "source": format!("doc-{id}") }));
        IndexedPoint {
            id: PointId::Num(id),
            dense: self.dense.embed_dense(text).unwrap(),
            sparse: self.sparse.embed_sparse(text).unwrap(),
            late_interaction: self.late_interaction.embed_late_interaction(text).unwrap(),
            payload,
        }
    }
}

/// Ten passages, two of which are about France.
pub const CORPUS: [&str; 10] = [
    "Paris is the capital of France.",
    "Berlin hosts many museums and galleries.",
    "The Amazon rainforest spans several countries.",
    "France borders Spain, Italy and Germany.",
    "Tokyo is known for its busy train stations.",
    "Rust guarantees memory safety without a garbage collector.",
    "The Pacific Ocean is the largest ocean on Earth.",
    "Mount Everest is the highest mountain above sea level.",
    "Coffee beans are roasted seeds of the coffea plant.",
    "The violin has four strings tuned in fifths.",
];

pub fn bundle() -> QueryEmbeddingBundle {
    QueryEmbeddingBundle::new(
        vec![1.0, 0.0],
        SparseVector::try_new(vec![7], vec![1.0]).unwrap(),
        vec![vec![1.0, 0.0]],
    )
}

pub fn hit(id: u64, score: f32, text: &str) -> ScoredPoint {
    let mut payload = Payload::new();
    payload.insert("page_content".into(), json!(text));
    ScoredPoint { id: PointId::Num(id), score, payload }
}

/// Returns canned hits and records every request.
#[derive(Default)]
pub struct RecordingIndex {
    hits: Vec<ScoredPoint>,
    requests: Mutex<Vec<HybridQuery>>,
}

impl RecordingIndex {
    pub fn with_hits(hits: Vec<ScoredPoint>) -> Self {
        Self { hits, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<HybridQuery> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    fn name(&self) -> &str {
        "recording"
    }

    async fn query(&self, request: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.hits.clone())
    }
}

/// Fails every query with a transport error.
pub struct UnreachableIndex;

#[async_trait]
impl VectorIndex for UnreachableIndex {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn query(&self, _request: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        Err(RetrievalError::RetrievalUnavailable {
            backend: "unreachable".into(),
            message: "connection refused".into(),
        })
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledIndex;

#[async_trait]
impl VectorIndex for StalledIndex {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn query(&self, _request: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Formatted log output collected in memory.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install a subscriber writing into this buffer on the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber =
            tracing_subscriber::fmt().with_writer(self.clone()).with_ansi(false).finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
