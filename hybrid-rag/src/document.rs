//! Data types for index hits and the documents projected from them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RetrievalError, Result};

/// Payload field holding the passage text.
pub const PAGE_CONTENT_FIELD: &str = "page_content";
/// Payload field holding the passage metadata object.
pub const METADATA_FIELD: &str = "metadata";

/// A point payload: string keys mapped to opaque JSON values.
pub type Payload = Map<String, Value>;

/// Free-form document metadata.
pub type Metadata = Map<String, Value>;

/// Identity of a point inside the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// Numeric point id.
    Num(u64),
    /// UUID point id, kept in its string form.
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        Self::Num(id)
    }
}

impl From<&str> for PointId {
    fn from(id: &str) -> Self {
        Self::Uuid(id.to_string())
    }
}

/// A raw hit returned by a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// The point identity.
    pub id: PointId,
    /// The rerank score (higher is more relevant).
    pub score: f32,
    /// The stored payload; empty when payload was not requested.
    pub payload: Payload,
}

/// A retrieved passage.
///
/// Built only by projecting an index payload, see [`Document::from_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The passage text.
    pub page_content: String,
    /// Metadata stored alongside the passage. May be empty.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Project a point payload into a document.
    ///
    /// A missing `page_content` becomes an empty string and a missing or
    /// `null` `metadata` becomes an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::RetrievalInternalError`] if `page_content` is
    /// not a string or `metadata` is not an object.
    pub fn from_payload(payload: &Payload, backend: &str) -> Result<Self> {
        let page_content = match payload.get(PAGE_CONTENT_FIELD) {
            None => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => {
                return Err(RetrievalError::internal(
                    backend,
                    format!("payload field '{PAGE_CONTENT_FIELD}' is not a string: {other}"),
                ));
            }
        };

        let metadata = match payload.get(METADATA_FIELD) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(RetrievalError::internal(
                    backend,
                    format!("payload field '{METADATA_FIELD}' is not an object: {other}"),
                ));
            }
        };

        Ok(Self { page_content, metadata })
    }

    /// Look up a metadata value, if present.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// A [`Document`] paired with the index identity and rerank score it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The point the document was projected from.
    pub id: PointId,
    /// The rerank score.
    pub score: f32,
    /// The projected document.
    pub document: Document,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn projects_content_and_metadata() {
        let doc = Document::from_payload(
            &payload(json!({
                "page_content": "Paris is the capital of France.",
                "metadata": {"source": "atlas.pdf", "page": 3}
            })),
            "test",
        )
        .unwrap();

        assert_eq!(doc.page_content, "Paris is the capital of France.");
        assert_eq!(doc.metadata_value("page"), Some(&json!(3)));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let doc = Document::from_payload(&payload(json!({"other": 1})), "test").unwrap();
        assert_eq!(doc.page_content, "");
        assert!(doc.metadata.is_empty());

        let doc = Document::from_payload(&payload(json!({"metadata": null})), "test").unwrap();
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn malformed_fields_are_internal_errors() {
        let err = Document::from_payload(&payload(json!({"page_content": 42})), "test")
            .unwrap_err();
        assert!(matches!(err, RetrievalError::RetrievalInternalError { .. }));

        let err = Document::from_payload(&payload(json!({"metadata": ["a"]})), "test")
            .unwrap_err();
        assert!(matches!(err, RetrievalError::RetrievalInternalError { .. }));
    }

    #[test]
    fn point_id_displays_raw_value() {
        assert_eq!(PointId::from(7).to_string(), "7");
        assert_eq!(PointId::from("a-b").to_string(), "a-b");
    }
}
