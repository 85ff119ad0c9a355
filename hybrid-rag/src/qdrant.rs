//! Qdrant index backend.
//!
//! Provides [`QdrantIndex`] which implements [`VectorIndex`] using the
//! [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC. The
//! collection must define a dense space, a sparse space and a multivector
//! space with the MAX-SIM comparator (names from [`VectorSpaces`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_rag::{RetrievalConfig, qdrant::QdrantIndex};
//!
//! let index = QdrantIndex::new(&RetrievalConfig::from_env()?)?;
//! ```
//!
//! [`VectorSpaces`]: crate::config::VectorSpaces

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    PrefetchQueryBuilder, Query, QueryPoints, QueryPointsBuilder, Value as QdrantValue,
    VectorInput,
};
use qdrant_client::{Qdrant, QdrantError};
use serde_json::{Map, Number, Value};
use tracing::{debug, error};

use crate::config::RetrievalConfig;
use crate::document::{Payload, PointId, ScoredPoint};
use crate::error::{RetrievalError, Result};
use crate::index::{HybridQuery, QueryVector, VectorIndex};

const BACKEND: &str = "qdrant";

/// A [`VectorIndex`] backed by [Qdrant](https://qdrant.tech/).
pub struct QdrantIndex {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex").finish_non_exhaustive()
    }
}

impl QdrantIndex {
    /// Connect using the URL, API key and timeout from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if the client cannot be built
    /// (for example, an invalid URL).
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .api_key(config.qdrant_api_key.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                RetrievalError::ConfigError(format!(
                    "failed to build qdrant client for {}: {e}",
                    config.qdrant_url
                ))
            })?;
        Ok(Self { client })
    }

    /// Create an index from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: QdrantError) -> RetrievalError {
        match e {
            QdrantError::ResponseError { status } => RetrievalError::unavailable(
                BACKEND,
                format!("{:?}: {}", status.code(), status.message()),
            ),
            QdrantError::ResourceExhaustedError { status, retry_after_seconds } => {
                RetrievalError::unavailable(
                    BACKEND,
                    format!("{} (retry after {retry_after_seconds}s)", status.message()),
                )
            }
            QdrantError::Io(e) => RetrievalError::unavailable(BACKEND, e.to_string()),
            other => RetrievalError::internal(BACKEND, other.to_string()),
        }
    }

    fn to_query(vector: &QueryVector) -> Query {
        match vector {
            QueryVector::Dense(dense) => Query::new_nearest(dense.clone()),
            QueryVector::Sparse(sparse) => Query::new_nearest(VectorInput::new_sparse(
                sparse.indices().to_vec(),
                sparse.values().to_vec(),
            )),
            QueryVector::Multi(tokens) => Query::new_nearest(VectorInput::new_multi(tokens.clone())),
        }
    }

    /// Translate a [`HybridQuery`] into a Qdrant `query_points` request.
    pub(crate) fn build_request(request: &HybridQuery) -> QueryPoints {
        let mut builder = QueryPointsBuilder::new(request.collection.as_str());
        for prefetch in &request.prefetch {
            builder = builder.add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(Self::to_query(&prefetch.query))
                    .using(prefetch.using.as_str())
                    .limit(prefetch.limit),
            );
        }
        builder
            .query(Self::to_query(&request.query))
            .using(request.using.as_str())
            .limit(request.limit)
            .with_payload(request.with_payload)
            .into()
    }

    fn convert_id(id: Option<qdrant_client::qdrant::PointId>) -> Result<PointId> {
        match id.and_then(|pid| pid.point_id_options) {
            Some(PointIdOptions::Num(n)) => Ok(PointId::Num(n)),
            Some(PointIdOptions::Uuid(s)) => Ok(PointId::Uuid(s)),
            None => Err(RetrievalError::internal(BACKEND, "scored point is missing its id")),
        }
    }
}

/// Convert a Qdrant payload value into JSON.
fn value_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(obj)) => Value::Object(
            obj.fields.into_iter().map(|(k, v)| (k, value_to_json(v))).collect::<Map<_, _>>(),
        ),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn query(&self, request: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        let response = self.client.query(Self::build_request(request)).await.map_err(|e| {
            error!(collection = %request.collection, error = %e, "qdrant query failed");
            Self::map_err(e)
        })?;

        debug!(
            collection = %request.collection,
            hits = response.result.len(),
            "qdrant hybrid query completed"
        );

        response
            .result
            .into_iter()
            .map(|point| {
                let id = Self::convert_id(point.id)?;
                let payload: Payload =
                    point.payload.into_iter().map(|(k, v)| (k, value_to_json(v))).collect();
                Ok(ScoredPoint { id, score: point.score, payload })
            })
            .collect()
    }
}
