//! BM25 sparse query embedder.
//!
//! Produces the same token ids and weights as the `Qdrant/bm25` sparse model
//! used at ingestion time, so query vectors line up with the `sparse` space
//! of the collection.
//!
//! Pipeline per text: lowercase, replace non-word characters with spaces,
//! split on whitespace, drop stopwords, punctuation-only and over-long
//! tokens, apply the Snowball English stemmer, hash each stem with
//! murmur3 (seed 0, absolute value of the signed result) and weight the
//! term frequencies with the BM25 saturation formula.

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::LazyLock;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::embedding::{SparseEmbedder, SparseVector};
use crate::error::{EmbeddingModelKind, RetrievalError, Result};

/// Model identifier reported by [`Bm25Embedder`].
pub const BM25_MODEL_NAME: &str = "Qdrant/bm25";

const DEFAULT_K: f32 = 1.2;
const DEFAULT_B: f32 = 0.75;
const DEFAULT_AVG_LEN: f32 = 256.0;
const TOKEN_MAX_LENGTH: usize = 40;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w]").expect("valid regex"));

static ENGLISH_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
        "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
        "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
        "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
        "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
        "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
        "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

/// How term frequencies turn into weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermWeighting {
    /// BM25 saturation with document length normalisation.
    #[default]
    Bm25,
    /// Every distinct term gets weight 1.0.
    Binary,
}

/// A [`SparseEmbedder`] computing BM25 term weights locally.
pub struct Bm25Embedder {
    stemmer: Stemmer,
    k: f32,
    b: f32,
    avg_len: f32,
    weighting: TermWeighting,
}

impl std::fmt::Debug for Bm25Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Embedder")
            .field("k", &self.k)
            .field("b", &self.b)
            .field("avg_len", &self.avg_len)
            .field("weighting", &self.weighting)
            .finish_non_exhaustive()
    }
}

impl Default for Bm25Embedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Embedder {
    /// Create an English BM25 embedder with `k = 1.2`, `b = 0.75`, `avg_len = 256`.
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            k: DEFAULT_K,
            b: DEFAULT_B,
            avg_len: DEFAULT_AVG_LEN,
            weighting: TermWeighting::default(),
        }
    }

    /// Override the BM25 parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] unless `k >= 0`, `0 <= b <= 1`
    /// and `avg_len > 0`.
    pub fn with_params(mut self, k: f32, b: f32, avg_len: f32) -> Result<Self> {
        if !(k >= 0.0 && (0.0..=1.0).contains(&b) && avg_len > 0.0) {
            return Err(RetrievalError::ConfigError(format!(
                "invalid BM25 parameters: k={k}, b={b}, avg_len={avg_len}"
            )));
        }
        self.k = k;
        self.b = b;
        self.avg_len = avg_len;
        Ok(self)
    }

    /// Select the term weighting scheme.
    pub fn with_weighting(mut self, weighting: TermWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Tokenize and stem a text, in order, keeping duplicates.
    pub fn stemmed_tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = NON_WORD.replace_all(&lowered, " ");

        cleaned
            .split_whitespace()
            .filter(|token| !token.chars().all(|c| c.is_ascii_punctuation()))
            .filter(|token| !ENGLISH_STOPWORDS.contains(*token))
            .filter(|token| token.chars().count() <= TOKEN_MAX_LENGTH)
            .map(|token| self.stemmer.stem(token).into_owned())
            .filter(|stem| !stem.is_empty())
            .collect()
    }

    /// Token id of a stem: absolute value of the signed murmur3 hash.
    pub fn token_id(stem: &str) -> Result<u32> {
        let hash = murmur3::murmur3_32(&mut Cursor::new(stem.as_bytes()), 0).map_err(|e| {
            RetrievalError::embedding(EmbeddingModelKind::Sparse, format!("hashing failed: {e}"))
        })?;
        Ok((hash as i32).unsigned_abs())
    }

    fn weigh(&self, term_frequency: f32, doc_len: f32) -> f32 {
        match self.weighting {
            TermWeighting::Binary => 1.0,
            TermWeighting::Bm25 => {
                let norm = 1.0 - self.b + self.b * doc_len / self.avg_len;
                term_frequency * (self.k + 1.0) / (term_frequency + self.k * norm)
            }
        }
    }
}

impl SparseEmbedder for Bm25Embedder {
    fn name(&self) -> &str {
        BM25_MODEL_NAME
    }

    fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
        let stems = self.stemmed_tokens(text);
        let doc_len = stems.len() as f32;

        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for stem in &stems {
            *counts.entry(Self::token_id(stem)?).or_insert(0.0) += 1.0;
        }

        let weights =
            counts.into_iter().map(|(id, tf)| (id, self.weigh(tf, doc_len))).collect();
        Ok(SparseVector::from_weights(weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_punctuation_then_stems() {
        let embedder = Bm25Embedder::new();
        assert_eq!(embedder.stemmed_tokens("What is the capital of France?"), ["capit", "franc"]);
        assert_eq!(embedder.stemmed_tokens("  ...  "), Vec::<String>::new());
    }

    #[test]
    fn over_long_tokens_are_ignored() {
        let embedder = Bm25Embedder::new();
        let long = "a".repeat(41);
        assert_eq!(embedder.stemmed_tokens(&format!("{long} rivers")), ["river"]);
    }

    #[test]
    fn ids_ignore_case_and_punctuation() {
        let embedder = Bm25Embedder::new();
        let a = embedder.embed_sparse("France").unwrap();
        let b = embedder.embed_sparse("FRANCE!!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn bm25_weights_saturate_with_repetition() {
        let embedder = Bm25Embedder::new();
        let sparse = embedder.embed_sparse("capital of France").unwrap();
        assert_eq!(sparse.len(), 2);

        let expected = 2.2 / (1.0 + 1.2 * (0.25 + 0.75 * 2.0 / 256.0));
        for weight in sparse.values() {
            assert!((weight - expected).abs() < 1e-5, "weight {weight} != {expected}");
        }

        let repeated = embedder.embed_sparse("france france france").unwrap();
        assert_eq!(repeated.len(), 1);
        assert!(repeated.values()[0] > expected);
        assert!(repeated.values()[0] < DEFAULT_K + 1.0);
    }

    #[test]
    fn binary_weighting_yields_unit_weights() {
        let embedder = Bm25Embedder::new().with_weighting(TermWeighting::Binary);
        let sparse = embedder.embed_sparse("rivers rivers of europe").unwrap();
        assert_eq!(sparse.len(), 2);
        assert!(sparse.values().iter().all(|w| *w == 1.0));
    }

    #[test]
    fn empty_text_gives_empty_vector() {
        let sparse = Bm25Embedder::new().embed_sparse("").unwrap();
        assert!(sparse.is_empty());
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(Bm25Embedder::new().with_params(1.2, 1.5, 256.0).is_err());
        assert!(Bm25Embedder::new().with_params(1.2, 0.75, 0.0).is_err());
        assert!(Bm25Embedder::new().with_params(0.9, 0.4, 100.0).is_ok());
    }
}
