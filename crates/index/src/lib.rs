//! # Prediction index
//!
//! Stores precomputed model results (class probabilities, embeddings and
//! nearest-neighbor lists) for a fixed corpus in an OpenSearch-compatible
//! vector backend, and reads them back as typed views.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: everything talks to the [`SearchBackend`] trait.
//!   [`OpenSearchBackend`] speaks the REST API over a pooled `reqwest`
//!   client; [`InMemoryBackend`] mirrors the behavior the service relies on
//!   and is used in tests.
//! - **Provisioning**: [`provision_index`] creates a k-NN index whose vector
//!   widths come from an [`IndexDescriptor`], replacing a previous index of
//!   the same name.
//! - **Bulk loading**: [`bulk_load`] maps records with [`to_document`] and
//!   writes them in chunks. Individual failures only lower the count.
//! - **Retrieval**: [`RetrievalService`] fetches by paper id and projects the
//!   stored document into a [`PredictionView`] or a [`SimilarityView`].
//!
//! ## Example Usage
//!
//! ```
//! use index::{
//!     bulk_load, provision_index, BulkOptions, IndexDescriptor, InMemoryBackend,
//!     PredictionRecord, RecordMetadata, RetrievalService,
//! };
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = Arc::new(InMemoryBackend::new());
//! let record = PredictionRecord {
//!     paper_id: 31336,
//!     probability: vec![0.1, 0.2, 0.7],
//!     prediction: 2.0,
//!     embedding: vec![0.0, 0.1, 0.2, 0.3],
//!     most_similar_id: vec![1234, 5678],
//!     most_similar_score: vec![0.95, 0.89],
//!     metadata: RecordMetadata::default(),
//! };
//!
//! let descriptor = IndexDescriptor::from_sample("idx1", &record);
//! assert!(provision_index(backend.as_ref(), &descriptor).await);
//! let written = bulk_load(backend.as_ref(), &[record], &descriptor, &BulkOptions::default()).await;
//! assert_eq!(written, 1);
//!
//! let service = RetrievalService::new(backend, Duration::from_secs(5));
//! let similar = service
//!     .get_most_similar("idx1", 31336, NonZeroUsize::new(1).unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(similar.most_similar_ids, vec![1234]);
//! # });
//! ```

mod backend;
pub mod bulk;
pub mod document;
mod error;
pub mod readiness;
pub mod retrieval;
pub mod schema;

pub use backend::{
    BackendConfig, BackendKind, BulkItemResult, InMemoryBackend, OpenSearchBackend,
    OpenSearchConfig, SearchBackend,
};
pub use bulk::{bulk_load, bulk_load_report, BulkOptions, BulkReport, FailedItem};
pub use document::{
    to_document, to_document_at, validate_record, BulkOperation, PredictionRecord,
    RecordMetadata, ResultDocument,
};
pub use error::IndexError;
pub use readiness::{await_ready, ReadinessConfig};
pub use retrieval::{
    HealthStatus, HealthView, PredictionView, RetrievalService, SimilarityView,
};
pub use schema::{
    drop_index, index_name_from_template, provision_index, try_provision_index,
    IndexDescriptor, DEFAULT_INDEX_TEMPLATE,
};
