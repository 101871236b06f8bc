use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of results returned when a caller has no preference.
pub const DEFAULT_TOP_K: usize = 10;

// ---------------------------------------------------------------------------
// ChunkMetadata
// ---------------------------------------------------------------------------

/// Metadata attached to every stored vector: which document the chunk came
/// from, where it sits in that document, and its text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub chunk_header: String,
    #[serde(default)]
    pub chunk_text: String,
}

impl ChunkMetadata {
    pub fn new(
        doc_id: impl Into<String>,
        chunk_index: usize,
        chunk_header: impl Into<String>,
        chunk_text: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_index,
            chunk_header: chunk_header.into(),
            chunk_text: chunk_text.into(),
        }
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "doc_id" => Some(FieldValue::Text(&self.doc_id)),
            "chunk_index" => Some(FieldValue::Index(self.chunk_index)),
            "chunk_header" => Some(FieldValue::Text(&self.chunk_header)),
            "chunk_text" => Some(FieldValue::Text(&self.chunk_text)),
            _ => None,
        }
    }
}

/// A single hit returned by [`VectorDb::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub metadata: ChunkMetadata,
    /// Cosine similarity in `[-1, 1]`, higher is closer.
    pub similarity: f32,
}

// ---------------------------------------------------------------------------
// MetadataFilter
// ---------------------------------------------------------------------------

/// Names of the metadata fields a [`MetadataFilter`] may reference.
pub const FILTERABLE_FIELDS: [&str; 4] = ["doc_id", "chunk_index", "chunk_header", "chunk_text"];

/// Comparison applied by a [`MetadataFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
}

impl FilterOperator {
    fn takes_list(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

/// Backend-agnostic predicate over [`ChunkMetadata`], serialized as
/// `{"field": ..., "operator": ..., "value": ...}`.
///
/// `value` is a list for `in` / `not_in` and a scalar (string or integer)
/// for every other operator. Delegating backends translate this into their
/// native query language; the in-process store evaluates it with
/// [`MetadataFilter::matches`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl MetadataFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field == value`.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }

    /// `field` is one of `values`.
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(field, FilterOperator::In, Value::Array(list))
    }

    /// Check that the filter references a known field and that its value has
    /// the shape its operator expects.
    pub fn validate(&self) -> Result<(), KbError> {
        if !FILTERABLE_FIELDS.contains(&self.field.as_str()) {
            return Err(KbError::Validation(format!(
                "unknown metadata filter field '{}'; expected one of {}",
                self.field,
                FILTERABLE_FIELDS.join(", ")
            )));
        }

        if self.operator.takes_list() {
            let Value::Array(items) = &self.value else {
                return Err(KbError::Validation(format!(
                    "operator {:?} requires a list value",
                    self.operator
                )));
            };
            if let Some(bad) = items.iter().find(|v| !is_scalar(v)) {
                return Err(KbError::Validation(format!(
                    "filter list values must be strings or integers, got {bad}"
                )));
            }
        } else if !is_scalar(&self.value) {
            return Err(KbError::Validation(format!(
                "operator {:?} requires a string or integer value, got {}",
                self.operator, self.value
            )));
        }

        Ok(())
    }

    /// Evaluate the predicate against one metadata record.
    ///
    /// Unknown fields and incomparable values evaluate to `false`; call
    /// [`validate`](Self::validate) first to reject those up front.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let Some(field) = metadata.field(&self.field) else {
            return false;
        };

        match self.operator {
            FilterOperator::Equals => field.compare(&self.value) == Some(Ordering::Equal),
            FilterOperator::NotEquals => field.compare(&self.value) != Some(Ordering::Equal),
            FilterOperator::In => self.list().iter().any(|v| field.compare(v) == Some(Ordering::Equal)),
            FilterOperator::NotIn => !self.list().iter().any(|v| field.compare(v) == Some(Ordering::Equal)),
            FilterOperator::GreaterThan => field.compare(&self.value) == Some(Ordering::Greater),
            FilterOperator::LessThan => field.compare(&self.value) == Some(Ordering::Less),
            FilterOperator::GreaterThanEquals => matches!(
                field.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::LessThanEquals => matches!(
                field.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }

    fn list(&self) -> &[Value] {
        match &self.value {
            Value::Array(items) => items,
            _ => &[],
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_))
}

/// Borrowed view of one metadata field.
enum FieldValue<'a> {
    Text(&'a str),
    Index(usize),
}

impl FieldValue<'_> {
    /// Order the field relative to a filter scalar. `chunk_index` compares
    /// numerically and accepts integer strings; text fields compare
    /// lexicographically.
    fn compare(&self, target: &Value) -> Option<Ordering> {
        match (self, target) {
            (FieldValue::Text(s), Value::String(t)) => Some((*s).cmp(t.as_str())),
            (FieldValue::Text(s), Value::Number(n)) => Some((*s).cmp(n.to_string().as_str())),
            (FieldValue::Index(i), Value::Number(n)) => (*i as f64).partial_cmp(&n.as_f64()?),
            (FieldValue::Index(i), Value::String(t)) => {
                let parsed: i64 = t.trim().parse().ok()?;
                (*i as i128).partial_cmp(&(parsed as i128))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for every vector store backend.
#[derive(Debug, Error)]
pub enum KbError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Message carried by the validation error raised when `add_vectors`
/// receives batches of different lengths. Every backend must use it verbatim.
pub const LENGTH_MISMATCH_MESSAGE: &str =
    "Error in add_vectors: the number of vectors and metadata items must be the same.";

/// Reject `add_vectors` batches whose two halves differ in length.
pub fn check_batch_lengths(vectors: usize, metadata: usize) -> Result<(), KbError> {
    if vectors != metadata {
        return Err(KbError::Validation(format!(
            "{LENGTH_MISMATCH_MESSAGE} Got {vectors} vectors and {metadata} metadata items."
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// VectorDb trait
// ---------------------------------------------------------------------------

/// Contract shared by the in-process store and every delegating backend.
///
/// Rows are `(vector, ChunkMetadata)` pairs kept in insertion order. A
/// backend whose writes are not immediately visible to `search` must say so
/// in its own documentation.
#[async_trait]
pub trait VectorDb: Send + Sync {
    /// Append `vectors[i]` with `metadata[i]` for every `i`.
    ///
    /// Fails with [`KbError::Validation`] carrying [`LENGTH_MISMATCH_MESSAGE`]
    /// when the two inputs differ in length. Either the whole batch is stored
    /// or none of it is.
    async fn add_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<(), KbError>;

    /// Return at most `top_k` rows ranked by descending cosine similarity,
    /// considering only rows that pass `filter`. An empty store or a filter
    /// that excludes everything yields an empty vector, not an error.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchResult>, KbError>;

    /// Remove every row whose `doc_id` equals `doc_id`. Absent ids are a no-op.
    async fn remove_document(&self, doc_id: &str) -> Result<(), KbError>;

    /// Current row count.
    async fn get_num_vectors(&self) -> Result<usize, KbError>;

    /// Persist the full row set.
    async fn save(&self) -> Result<(), KbError>;

    /// Replace in-memory state with the persisted snapshot, if any.
    async fn load(&self) -> Result<(), KbError>;

    /// Irreversibly erase the persisted state.
    async fn delete(&self) -> Result<(), KbError>;

    /// Knowledge-base identifier this store is keyed by.
    fn kb_id(&self) -> &str;

    /// Discriminator written into descriptors for this backend.
    fn backend_name(&self) -> &'static str;

    /// Declarative description of identity and configuration (not content)
    /// from which an equivalent store can be rebuilt.
    fn to_descriptor(&self) -> Value;
}
