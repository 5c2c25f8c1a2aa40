//! Batched writes of a result set with partial-failure tolerance.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::document::{to_document, validate_record, PredictionRecord};
use crate::schema::IndexDescriptor;
use crate::{IndexError, SearchBackend};

/// How many failed items are written to the log.
pub const LOGGED_FAILURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Documents per bulk request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Failure ratio above which [`BulkReport::enforce_threshold`] errors.
    #[serde(default)]
    pub max_failure_ratio: Option<f64>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_failure_ratio: None,
        }
    }
}

impl BulkOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_failure_ratio(mut self, ratio: f64) -> Self {
        self.max_failure_ratio = Some(ratio);
        self
    }
}

fn default_chunk_size() -> usize {
    50
}

/// A document that did not make it into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub id: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkReport {
    /// Records handed to the loader.
    pub attempted: usize,
    /// Items the backend acknowledged.
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    /// Set when a whole request failed and the load stopped.
    pub aborted: Option<IndexError>,
    pub duration: Duration,
}

impl BulkReport {
    /// Documents written, counting an aborted load as zero.
    pub fn success_count(&self) -> usize {
        if self.aborted.is_some() {
            0
        } else {
            self.succeeded
        }
    }

    /// Escalate an excessive failure ratio into an error.
    ///
    /// An aborted load always fails the check.
    pub fn enforce_threshold(&self, max_ratio: f64) -> Result<(), IndexError> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }
        if self.attempted == 0 {
            return Ok(());
        }
        let ratio = self.failed.len() as f64 / self.attempted as f64;
        if ratio > max_ratio {
            return Err(IndexError::FailureThreshold {
                failed: self.failed.len(),
                total: self.attempted,
                max_ratio,
            });
        }
        Ok(())
    }
}

/// Write `records` to the descriptor's index and return how many succeeded.
///
/// Individual failures reduce the count; a backend outage yields zero. See
/// [`bulk_load_report`] for the details.
pub async fn bulk_load(
    backend: &dyn SearchBackend,
    records: &[PredictionRecord],
    descriptor: &IndexDescriptor,
    options: &BulkOptions,
) -> usize {
    bulk_load_report(backend, records, descriptor, options)
        .await
        .success_count()
}

pub async fn bulk_load_report(
    backend: &dyn SearchBackend,
    records: &[PredictionRecord],
    descriptor: &IndexDescriptor,
    options: &BulkOptions,
) -> BulkReport {
    tracing::info!(
        index = %descriptor.name,
        records = records.len(),
        "saving predictions"
    );

    let mut report = BulkReport {
        attempted: records.len(),
        ..BulkReport::default()
    };

    let mut operations = Vec::with_capacity(records.len());
    for record in records {
        match validate_record(descriptor, record) {
            Ok(()) => operations.push(to_document(&descriptor.name, record.paper_id, record)),
            Err(err) => report.failed.push(FailedItem {
                id: record.paper_id.to_string(),
                cause: err.to_string(),
            }),
        }
    }

    let start = Instant::now();
    let chunk_size = options.chunk_size.max(1);
    for chunk in operations.chunks(chunk_size) {
        match backend.bulk(chunk).await {
            Ok(items) => {
                for item in items {
                    if item.is_success() {
                        report.succeeded += 1;
                    } else {
                        report.failed.push(FailedItem {
                            cause: item
                                .error
                                .unwrap_or_else(|| format!("status {}", item.status)),
                            id: item.id,
                        });
                    }
                }
            }
            Err(err) => {
                report.aborted = Some(err);
                break;
            }
        }
    }
    report.duration = start.elapsed();
    let duration_ms = report.duration.as_millis() as u64;

    match &report.aborted {
        Some(err) => tracing::error!(
            index = %descriptor.name,
            error = %err,
            duration_ms,
            "bulk indexing failed"
        ),
        None => tracing::info!(
            index = %descriptor.name,
            succeeded = report.succeeded,
            duration_ms,
            "indexed documents"
        ),
    }
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "failed to index documents");
        for item in report.failed.iter().take(LOGGED_FAILURES) {
            tracing::warn!(id = %item.id, cause = %item.cause, "failed document");
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BulkItemResult, InMemoryBackend};
    use crate::document::{BulkOperation, RecordMetadata};
    use crate::schema::provision_index;
    use async_trait::async_trait;
    use serde_json::Value;

    /// Loses the connection partway through a bulk request.
    struct DroppingBackend {
        delay: Duration,
    }

    #[async_trait]
    impl SearchBackend for DroppingBackend {
        async fn ping(&self) -> Result<bool, IndexError> {
            Ok(true)
        }

        async fn index_exists(&self, _: &str) -> Result<bool, IndexError> {
            Ok(true)
        }

        async fn create_index(&self, _: &str, _: &Value) -> Result<(), IndexError> {
            Ok(())
        }

        async fn delete_index(&self, _: &str) -> Result<(), IndexError> {
            Ok(())
        }

        async fn get_document(&self, _: &str, _: &str) -> Result<Option<Value>, IndexError> {
            Ok(None)
        }

        async fn bulk(&self, _: &[BulkOperation]) -> Result<Vec<BulkItemResult>, IndexError> {
            tokio::time::sleep(self.delay).await;
            Err(IndexError::Unavailable("connection reset".into()))
        }
    }

    fn record(paper_id: i64) -> PredictionRecord {
        PredictionRecord {
            paper_id,
            probability: vec![0.1, 0.2, 0.7],
            prediction: 2.0,
            embedding: vec![0.0, 0.1, 0.2, 0.3],
            most_similar_id: vec![paper_id + 1, paper_id + 2],
            most_similar_score: vec![0.9, 0.8],
            metadata: RecordMetadata::default(),
        }
    }

    async fn fresh_index() -> (InMemoryBackend, IndexDescriptor) {
        let backend = InMemoryBackend::new();
        let descriptor = IndexDescriptor::new("idx1", 3, 4, 2);
        assert!(provision_index(&backend, &descriptor).await);
        (backend, descriptor)
    }

    #[tokio::test]
    async fn loads_every_valid_record_across_chunks() {
        let (backend, descriptor) = fresh_index().await;
        let records: Vec<_> = (1..=120).map(record).collect();

        let count = bulk_load(&backend, &records, &descriptor, &BulkOptions::default()).await;
        assert_eq!(count, 120);
        assert_eq!(backend.document_count("idx1"), Some(120));
    }

    #[tokio::test]
    async fn invalid_records_reduce_the_count() {
        let (backend, descriptor) = fresh_index().await;
        let mut records: Vec<_> = (1..=10).map(record).collect();
        records[3].embedding.push(1.0);
        records[7].most_similar_score.clear();

        let report = bulk_load_report(&backend, &records, &descriptor, &BulkOptions::default()).await;
        assert_eq!(report.success_count(), 8);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].id, "4");
        assert!(report.aborted.is_none());
    }

    #[tokio::test]
    async fn outage_yields_zero() {
        let (backend, descriptor) = fresh_index().await;
        backend.set_reachable(false);
        let records: Vec<_> = (1..=5).map(record).collect();

        let report = bulk_load_report(&backend, &records, &descriptor, &BulkOptions::default()).await;
        assert_eq!(report.success_count(), 0);
        assert!(report.aborted.as_ref().is_some_and(IndexError::is_unavailable));
    }

    #[tokio::test]
    async fn aborted_load_still_measures_duration() {
        let backend = DroppingBackend {
            delay: Duration::from_millis(20),
        };
        let descriptor = IndexDescriptor::new("idx1", 3, 4, 2);
        let records: Vec<_> = (1..=3).map(record).collect();

        let report = bulk_load_report(&backend, &records, &descriptor, &BulkOptions::default()).await;
        assert_eq!(report.success_count(), 0);
        assert!(report.aborted.is_some());
        assert!(report.duration >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let (backend, descriptor) = fresh_index().await;
        let count = bulk_load(&backend, &[], &descriptor, &BulkOptions::default()).await;
        assert_eq!(count, 0);
        assert_eq!(backend.document_count("idx1"), Some(0));
    }

    #[test]
    fn threshold_escalates_excess_failures() {
        let report = BulkReport {
            attempted: 10,
            succeeded: 7,
            failed: vec![
                FailedItem { id: "1".into(), cause: "x".into() };
                3
            ],
            ..BulkReport::default()
        };
        assert!(report.enforce_threshold(0.5).is_ok());
        assert!(matches!(
            report.enforce_threshold(0.1),
            Err(IndexError::FailureThreshold { failed: 3, total: 10, .. })
        ));
    }

    #[test]
    fn aborted_report_fails_threshold() {
        let report = BulkReport {
            attempted: 2,
            aborted: Some(IndexError::Unavailable("gone".into())),
            ..BulkReport::default()
        };
        assert!(report.enforce_threshold(1.0).is_err());
    }
}
