use crate::document::BulkOperation;
use crate::IndexError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Outcome of one item in a bulk request, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub id: String,
    pub status: u16,
    /// Backend-reported cause when the item failed.
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn ok(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// The document/vector search engine holding prediction results.
///
/// One handle is shared by every request, so implementations must be safe for
/// concurrent use. Connection-level failures are reported as
/// [`IndexError::Unavailable`].
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Lightweight reachability probe.
    async fn ping(&self) -> Result<bool, IndexError>;
    async fn index_exists(&self, index: &str) -> Result<bool, IndexError>;
    /// Create an index from a settings + mappings body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), IndexError>;
    async fn delete_index(&self, index: &str) -> Result<(), IndexError>;
    /// Fetch a document's source by id. `Ok(None)` when either the index or the
    /// document does not exist.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError>;
    /// Submit one batch of writes. Per-item failures are returned, not raised.
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>, IndexError>;
}

/// Which backend the service talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "opensearch")]
    OpenSearch,
    #[serde(rename = "in_memory")]
    InMemory,
}

/// Configuration for selecting and building a backend.
///
/// ```
/// use index::{BackendConfig, OpenSearchConfig};
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // A local OpenSearch node
/// let config = BackendConfig::opensearch(OpenSearchConfig::default());
/// ```
#[derive(Clone, Debug)]
pub enum BackendConfig {
    OpenSearch(OpenSearchConfig),
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn opensearch(cfg: OpenSearchConfig) -> Self {
        BackendConfig::OpenSearch(cfg)
    }

    pub fn from_kind(kind: BackendKind, opensearch: &OpenSearchConfig) -> Self {
        match kind {
            BackendKind::OpenSearch => BackendConfig::OpenSearch(opensearch.clone()),
            BackendKind::InMemory => BackendConfig::InMemory,
        }
    }

    /// Build the shared backend handle.
    pub fn build(&self) -> Result<Arc<dyn SearchBackend>, IndexError> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryBackend::new())),
            BackendConfig::OpenSearch(cfg) => Ok(Arc::new(OpenSearchBackend::new(cfg)?)),
        }
    }
}

struct MemoryIndex {
    body: Value,
    documents: HashMap<String, Value>,
}

/// An in-memory backend using a `RwLock` around a map of indices.
///
/// It mimics the parts of OpenSearch the service relies on: creating an
/// existing index is rejected, knn_vector dimensions are enforced per
/// document, and reachability can be switched off to simulate an outage.
pub struct InMemoryBackend {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    reachable: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of documents in `index`, if the index exists.
    pub fn document_count(&self, index: &str) -> Option<usize> {
        let guard = self.indices.read().ok()?;
        guard.get(index).map(|idx| idx.documents.len())
    }

    /// The settings + mappings body an index was created with.
    pub fn index_body(&self, index: &str) -> Option<Value> {
        let guard = self.indices.read().ok()?;
        guard.get(index).map(|idx| idx.body.clone())
    }

    /// Store a raw document, bypassing mapping checks.
    pub fn put_raw(&self, index: &str, id: &str, source: Value) -> Result<(), IndexError> {
        let mut guard = self
            .indices
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        let idx = guard.entry(index.to_string()).or_insert_with(|| MemoryIndex {
            body: Value::Null,
            documents: HashMap::new(),
        });
        idx.documents.insert(id.to_string(), source);
        Ok(())
    }

    fn check_reachable(&self) -> Result<(), IndexError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexError::Unavailable("connection refused".into()))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject a source whose vector fields do not match the declared dimensions.
fn check_vector_dimensions(body: &Value, source: &Value) -> Result<(), String> {
    let Some(properties) = body.pointer("/mappings/properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (field, spec) in properties {
        if spec.get("type").and_then(Value::as_str) != Some("knn_vector") {
            continue;
        }
        let Some(dimension) = spec.get("dimension").and_then(Value::as_u64) else {
            continue;
        };
        if let Some(values) = source.get(field).and_then(Value::as_array) {
            if values.len() as u64 != dimension {
                return Err(format!(
                    "mapper_parsing_exception: vector length {} for field [{field}] does not match dimension {dimension}",
                    values.len()
                ));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn ping(&self) -> Result<bool, IndexError> {
        self.check_reachable()?;
        Ok(true)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        self.check_reachable()?;
        let guard = self
            .indices
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        Ok(guard.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), IndexError> {
        self.check_reachable()?;
        let mut guard = self
            .indices
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        if guard.contains_key(index) {
            return Err(IndexError::Rejected {
                status: 400,
                reason: format!("resource_already_exists_exception: index [{index}] already exists"),
            });
        }
        guard.insert(
            index.to_string(),
            MemoryIndex {
                body: body.clone(),
                documents: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        self.check_reachable()?;
        let mut guard = self
            .indices
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        match guard.remove(index) {
            Some(_) => Ok(()),
            None => Err(IndexError::Rejected {
                status: 404,
                reason: format!("index_not_found_exception: no such index [{index}]"),
            }),
        }
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError> {
        self.check_reachable()?;
        let guard = self
            .indices
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        Ok(guard
            .get(index)
            .and_then(|idx| idx.documents.get(id))
            .cloned())
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>, IndexError> {
        self.check_reachable()?;
        let mut guard = self
            .indices
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;

        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let Some(idx) = guard.get_mut(&op.index) else {
                results.push(BulkItemResult::failed(
                    &op.id,
                    404,
                    format!("index_not_found_exception: no such index [{}]", op.index),
                ));
                continue;
            };
            let source = serde_json::to_value(&op.source)?;
            if let Err(reason) = check_vector_dimensions(&idx.body, &source) {
                results.push(BulkItemResult::failed(&op.id, 400, reason));
                continue;
            }
            let status = if idx.documents.insert(op.id.clone(), source).is_some() {
                200
            } else {
                201
            };
            results.push(BulkItemResult::ok(&op.id, status));
        }
        Ok(results)
    }
}

/// The OpenSearch REST backend.
pub mod opensearch;

pub use opensearch::{OpenSearchBackend, OpenSearchConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{to_document, PredictionRecord, RecordMetadata};
    use serde_json::json;

    fn op(index: &str, id: i64, embed_dim: usize) -> BulkOperation {
        let record = PredictionRecord {
            paper_id: id,
            probability: vec![0.5, 0.5],
            prediction: 0.0,
            embedding: vec![0.0; embed_dim],
            most_similar_id: vec![1],
            most_similar_score: vec![0.9],
            metadata: RecordMetadata::default(),
        };
        to_document(index, id, &record)
    }

    fn body(embed_dim: usize) -> Value {
        json!({
            "mappings": {
                "properties": {
                    "embedding": { "type": "knn_vector", "dimension": embed_dim },
                    "paper_id": { "type": "integer" }
                }
            }
        })
    }

    #[tokio::test]
    async fn in_memory_create_rejects_existing_index() {
        let backend = InMemoryBackend::new();
        backend.create_index("a", &body(2)).await.unwrap();
        let err = backend.create_index("a", &body(2)).await.unwrap_err();
        assert!(matches!(err, IndexError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn in_memory_bulk_enforces_dimensions() {
        let backend = InMemoryBackend::new();
        backend.create_index("a", &body(2)).await.unwrap();

        let results = backend.bulk(&[op("a", 1, 2), op("a", 2, 3)]).await.unwrap();
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert!(results[1].error.as_deref().unwrap().contains("dimension 2"));
        assert_eq!(backend.document_count("a"), Some(1));
    }

    #[tokio::test]
    async fn in_memory_bulk_overwrites_same_id() {
        let backend = InMemoryBackend::new();
        backend.create_index("a", &body(2)).await.unwrap();
        let first = backend.bulk(&[op("a", 1, 2)]).await.unwrap();
        let second = backend.bulk(&[op("a", 1, 2)]).await.unwrap();
        assert_eq!(first[0].status, 201);
        assert_eq!(second[0].status, 200);
        assert_eq!(backend.document_count("a"), Some(1));
    }

    #[tokio::test]
    async fn unreachable_backend_reports_unavailable() {
        let backend = InMemoryBackend::new();
        backend.set_reachable(false);
        assert!(backend.ping().await.unwrap_err().is_unavailable());
        assert!(backend.get_document("a", "1").await.unwrap_err().is_unavailable());
    }

    #[test]
    fn backend_config_builds_in_memory() {
        assert!(BackendConfig::in_memory().build().is_ok());
        let cfg = BackendConfig::from_kind(BackendKind::InMemory, &OpenSearchConfig::default());
        assert!(matches!(cfg, BackendConfig::InMemory));
    }
}
