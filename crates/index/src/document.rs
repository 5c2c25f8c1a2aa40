//! Prediction records and the documents they become in the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::IndexDescriptor;
use crate::IndexError;

/// Wire format of the `timestamp` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Model version written when the producer does not tag its records.
pub const DEFAULT_GNN_VERSION: &str = "v1.0.0";

/// One model output for one corpus item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub paper_id: i64,
    /// Class probabilities, one entry per class.
    pub probability: Vec<f64>,
    /// Predicted class index.
    pub prediction: f64,
    pub embedding: Vec<f64>,
    /// Neighbor ids, most similar first.
    pub most_similar_id: Vec<i64>,
    /// Similarity of `most_similar_id[i]` to this record.
    pub most_similar_score: Vec<f64>,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub gnn_version: String,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            gnn_version: DEFAULT_GNN_VERSION.to_string(),
        }
    }
}

/// Body of a stored prediction document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub paper_id: i64,
    pub probability: Vec<f64>,
    pub prediction: f64,
    pub embedding: Vec<f64>,
    pub most_similar_id: Vec<i64>,
    pub most_similar_score: Vec<f64>,
    pub timestamp: String,
    pub metadata: RecordMetadata,
}

/// A single index-by-id write, as submitted to the bulk API.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub id: String,
    pub source: ResultDocument,
}

/// Map a record to a write against `index_name`, stamped with the current time.
///
/// The document id is the paper id, so loading the same id twice overwrites.
pub fn to_document(index_name: &str, paper_id: i64, record: &PredictionRecord) -> BulkOperation {
    to_document_at(index_name, paper_id, record, Utc::now())
}

pub fn to_document_at(
    index_name: &str,
    paper_id: i64,
    record: &PredictionRecord,
    now: DateTime<Utc>,
) -> BulkOperation {
    BulkOperation {
        index: index_name.to_string(),
        id: paper_id.to_string(),
        source: ResultDocument {
            paper_id,
            probability: record.probability.clone(),
            prediction: record.prediction,
            embedding: record.embedding.clone(),
            most_similar_id: record.most_similar_id.clone(),
            most_similar_score: record.most_similar_score.clone(),
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            metadata: record.metadata.clone(),
        },
    }
}

/// Check a record against the vector widths its index was built for.
pub fn validate_record(
    descriptor: &IndexDescriptor,
    record: &PredictionRecord,
) -> Result<(), IndexError> {
    // `paper_id` is mapped as a 32-bit `integer` field.
    if record.paper_id <= 0 || record.paper_id > i64::from(i32::MAX) {
        return Err(IndexError::Internal(format!(
            "paper_id must be within 1..={}, got {}",
            i32::MAX,
            record.paper_id
        )));
    }
    if record.most_similar_id.len() != record.most_similar_score.len() {
        return Err(IndexError::Internal(format!(
            "paper {}: {} similar ids but {} scores",
            record.paper_id,
            record.most_similar_id.len(),
            record.most_similar_score.len()
        )));
    }

    let fields = [
        ("probability", record.probability.len(), descriptor.prob_dim),
        ("embedding", record.embedding.len(), descriptor.embed_dim),
        (
            "most_similar_id",
            record.most_similar_id.len(),
            descriptor.sim_top_k,
        ),
    ];
    for (field, got, expected) in fields {
        if got != expected {
            return Err(IndexError::Internal(format!(
                "paper {}: {field} has {got} entries, index {} expects {expected}",
                record.paper_id, descriptor.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> PredictionRecord {
        PredictionRecord {
            paper_id: 31336,
            probability: vec![0.1, 0.2, 0.7],
            prediction: 2.0,
            embedding: vec![0.5, -0.5, 1.0, 0.0],
            most_similar_id: vec![1234, 5678],
            most_similar_score: vec![0.95, 0.89],
            metadata: RecordMetadata::default(),
        }
    }

    #[test]
    fn document_targets_index_with_paper_id() {
        let now = Utc.with_ymd_and_hms(2025, 7, 28, 8, 44, 31).unwrap();
        let op = to_document_at("idx1", 31336, &record(), now);

        assert_eq!(op.index, "idx1");
        assert_eq!(op.id, "31336");
        assert_eq!(op.source.paper_id, 31336);
        assert_eq!(op.source.prediction, 2.0);
        assert_eq!(op.source.most_similar_id, vec![1234, 5678]);
        assert_eq!(op.source.timestamp, "2025-07-28T08:44:31");
        assert_eq!(op.source.metadata.gnn_version, "v1.0.0");
    }

    #[test]
    fn document_serializes_nested_metadata() {
        let op = to_document("idx1", 7, &record());
        let value = serde_json::to_value(&op.source).unwrap();
        assert_eq!(value["metadata"]["gnn_version"], "v1.0.0");
        assert_eq!(value["paper_id"], 7);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn record_without_metadata_gets_default_version() {
        let json = r#"{"paper_id":1,"probability":[1.0],"prediction":0,
            "embedding":[0.0],"most_similar_id":[2],"most_similar_score":[0.5]}"#;
        let rec: PredictionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.metadata.gnn_version, DEFAULT_GNN_VERSION);
    }

    #[test]
    fn validation_accepts_matching_widths() {
        let descriptor = IndexDescriptor::new("idx1", 3, 4, 2);
        assert!(validate_record(&descriptor, &record()).is_ok());
    }

    #[test]
    fn validation_rejects_width_mismatch() {
        let descriptor = IndexDescriptor::new("idx1", 3, 8, 2);
        let err = validate_record(&descriptor, &record()).unwrap_err();
        assert!(matches!(err, IndexError::Internal(ref m) if m.contains("embedding")));
    }

    #[test]
    fn validation_rejects_unpaired_similarity_arrays() {
        let descriptor = IndexDescriptor::new("idx1", 3, 4, 2);
        let mut rec = record();
        rec.most_similar_score.pop();
        let err = validate_record(&descriptor, &rec).unwrap_err();
        assert!(matches!(err, IndexError::Internal(_)));
    }

    #[test]
    fn validation_rejects_ids_outside_the_integer_mapping() {
        let descriptor = IndexDescriptor::new("idx1", 3, 4, 2);
        let mut rec = record();

        rec.paper_id = i64::from(i32::MAX);
        assert!(validate_record(&descriptor, &rec).is_ok());

        for id in [0, -1, i64::from(i32::MAX) + 1] {
            rec.paper_id = id;
            let err = validate_record(&descriptor, &rec).unwrap_err();
            assert!(matches!(err, IndexError::Internal(ref m) if m.contains("paper_id")));
        }
    }
}
