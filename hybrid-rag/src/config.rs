//! Configuration for the hybrid retrieval pipeline.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, Result};

/// Default index endpoint (Qdrant gRPC port).
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
/// Default collection searched when none is configured.
pub const DEFAULT_COLLECTION: &str = "documents";
/// Default candidate count per prefetch sub-search.
pub const DEFAULT_PREFETCH_LIMIT: u64 = 25;
/// Default number of documents returned per query.
pub const DEFAULT_LIMIT: usize = 5;
/// Default per-request index timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default dense model identifier.
pub const DEFAULT_DENSE_MODEL: &str =
    "sentence-transformers/paraphrase-multilingual-mpnet-base-v2";
/// Default sparse model identifier.
pub const DEFAULT_SPARSE_MODEL: &str = "Qdrant/bm25";
/// Default late-interaction model identifier.
pub const DEFAULT_LATE_INTERACTION_MODEL: &str = "colbert-ir/colbertv2.0";

/// Names of the three vector spaces stored per indexed point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorSpaces {
    /// Space holding dense vectors.
    pub dense: String,
    /// Space holding sparse vectors.
    pub sparse: String,
    /// Space holding late-interaction multivectors (MAX-SIM comparator).
    pub late_interaction: String,
}

impl Default for VectorSpaces {
    fn default() -> Self {
        Self {
            dense: "dense".to_string(),
            sparse: "sparse".to_string(),
            late_interaction: "colbertv2.0".to_string(),
        }
    }
}

/// How the late-interaction model encodes the query text.
///
/// `Passage` embeds the query like a document: one vector per actual token.
/// `Query` uses the model's query encoder, which pads the text to a fixed
/// length with mask tokens.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LateInteractionMode {
    #[default]
    Passage,
    Query,
}

impl FromStr for LateInteractionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passage" | "document" => Ok(Self::Passage),
            "query" => Ok(Self::Query),
            other => Err(format!("unknown late-interaction mode: {other}")),
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Index endpoint URL.
    pub qdrant_url: String,
    /// Optional index access credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
    /// Collection searched by every query.
    pub collection_name: String,
    /// Per-request timeout applied to index calls, in seconds.
    pub timeout_secs: u64,
    /// Candidate count for each prefetch sub-search.
    pub prefetch_limit: u64,
    /// Number of results returned when the caller does not pass a limit.
    pub default_limit: usize,
    /// Dense embedding model identifier.
    pub dense_model_name: String,
    /// Sparse embedding model identifier.
    pub sparse_model_name: String,
    /// Late-interaction embedding model identifier.
    pub late_interaction_model_name: String,
    /// Encoder used for the late-interaction query vectors.
    #[serde(default)]
    pub late_interaction_mode: LateInteractionMode,
    /// Vector space names in the collection.
    pub vector_spaces: VectorSpaces,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection_name: DEFAULT_COLLECTION.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            prefetch_limit: DEFAULT_PREFETCH_LIMIT,
            default_limit: DEFAULT_LIMIT,
            dense_model_name: DEFAULT_DENSE_MODEL.to_string(),
            sparse_model_name: DEFAULT_SPARSE_MODEL.to_string(),
            late_interaction_model_name: DEFAULT_LATE_INTERACTION_MODEL.to_string(),
            late_interaction_mode: LateInteractionMode::default(),
            vector_spaces: VectorSpaces::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// The index request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load the configuration from process environment variables.
    ///
    /// Unset variables keep their defaults. See [`RetrievalConfig::from_lookup`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if a numeric variable does not
    /// parse or the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    ///
    /// Recognised keys: `QDRANT_URL`, `QDRANT_API_KEY`, `COLLECTION_NAME`,
    /// `QDRANT_TIMEOUT`, `PREFETCH_LIMIT`, `SEARCH_DEFAULT_LIMIT`,
    /// `DENSE_MODEL_NAME`, `BM25_MODEL_NAME`, `LATE_INTERACTION_MODEL_NAME`,
    /// `LATE_INTERACTION_MODE` (`passage` or `query`),
    /// `DENSE_VECTOR_NAME`, `SPARSE_VECTOR_NAME`, `LATE_INTERACTION_VECTOR_NAME`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(url) = get("QDRANT_URL") {
            builder = builder.qdrant_url(url);
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            builder = builder.qdrant_api_key(key);
        }
        if let Some(name) = get("COLLECTION_NAME") {
            builder = builder.collection_name(name);
        }
        if let Some(secs) = parse_var::<f64>("QDRANT_TIMEOUT", get("QDRANT_TIMEOUT"))? {
            // Accept fractional seconds, round up so a short timeout never becomes zero.
            builder = builder.timeout_secs(secs.ceil().max(0.0) as u64);
        }
        if let Some(limit) = parse_var("PREFETCH_LIMIT", get("PREFETCH_LIMIT"))? {
            builder = builder.prefetch_limit(limit);
        }
        if let Some(limit) = parse_var("SEARCH_DEFAULT_LIMIT", get("SEARCH_DEFAULT_LIMIT"))? {
            builder = builder.default_limit(limit);
        }
        if let Some(name) = get("DENSE_MODEL_NAME") {
            builder = builder.dense_model_name(name);
        }
        if let Some(name) = get("BM25_MODEL_NAME") {
            builder = builder.sparse_model_name(name);
        }
        if let Some(name) = get("LATE_INTERACTION_MODEL_NAME") {
            builder = builder.late_interaction_model_name(name);
        }
        if let Some(mode) = parse_var("LATE_INTERACTION_MODE", get("LATE_INTERACTION_MODE"))? {
            builder = builder.late_interaction_mode(mode);
        }

        let mut spaces = VectorSpaces::default();
        if let Some(name) = get("DENSE_VECTOR_NAME") {
            spaces.dense = name;
        }
        if let Some(name) = get("SPARSE_VECTOR_NAME") {
            spaces.sparse = name;
        }
        if let Some(name) = get("LATE_INTERACTION_VECTOR_NAME") {
            spaces.late_interaction = name;
        }

        builder.vector_spaces(spaces).build()
    }
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|e| {
            RetrievalError::ConfigError(format!("{key}={value:?} is not a valid value: {e}"))
        })
    })
    .transpose()
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the index endpoint URL.
    pub fn qdrant_url(mut self, url: impl Into<String>) -> Self {
        self.config.qdrant_url = url.into();
        self
    }

    /// Set the index access credential.
    pub fn qdrant_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.qdrant_api_key = Some(key.into());
        self
    }

    /// Set the collection to search.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the per-request index timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Set the candidate count for each prefetch sub-search.
    pub fn prefetch_limit(mut self, limit: u64) -> Self {
        self.config.prefetch_limit = limit;
        self
    }

    /// Set the number of results returned when no limit is given.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set the dense embedding model identifier.
    pub fn dense_model_name(mut self, name: impl Into<String>) -> Self {
        self.config.dense_model_name = name.into();
        self
    }

    /// Set the sparse embedding model identifier.
    pub fn sparse_model_name(mut self, name: impl Into<String>) -> Self {
        self.config.sparse_model_name = name.into();
        self
    }

    /// Set the late-interaction embedding model identifier.
    pub fn late_interaction_model_name(mut self, name: impl Into<String>) -> Self {
        self.config.late_interaction_model_name = name.into();
        self
    }

    /// Set the late-interaction query encoder.
    pub fn late_interaction_mode(mut self, mode: LateInteractionMode) -> Self {
        self.config.late_interaction_mode = mode;
        self
    }

    /// Set the vector space names.
    pub fn vector_spaces(mut self, spaces: VectorSpaces) -> Self {
        self.config.vector_spaces = spaces;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if:
    /// - `prefetch_limit == 0`, `default_limit == 0` or `timeout_secs == 0`
    /// - the URL, collection name or any vector space name is empty
    pub fn build(self) -> Result<RetrievalConfig> {
        let config = self.config;
        if config.prefetch_limit == 0 {
            return Err(RetrievalError::ConfigError(
                "prefetch_limit must be greater than zero".to_string(),
            ));
        }
        if config.default_limit == 0 {
            return Err(RetrievalError::ConfigError(
                "default_limit must be greater than zero".to_string(),
            ));
        }
        if config.timeout_secs == 0 {
            return Err(RetrievalError::ConfigError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if config.qdrant_url.trim().is_empty() {
            return Err(RetrievalError::ConfigError("qdrant_url must not be empty".to_string()));
        }
        if config.collection_name.trim().is_empty() {
            return Err(RetrievalError::ConfigError(
                "collection_name must not be empty".to_string(),
            ));
        }
        let spaces = &config.vector_spaces;
        if [&spaces.dense, &spaces.sparse, &spaces.late_interaction]
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(RetrievalError::ConfigError(
                "vector space names must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}
