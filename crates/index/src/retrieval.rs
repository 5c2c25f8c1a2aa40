//! Read side: fetch one stored document and project it into a response view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::{IndexError, SearchBackend};

/// Prediction view of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionView {
    pub paper_id: i64,
    pub pred_label_index: i64,
    pub probabilities: Vec<f64>,
}

/// Nearest neighbors of one paper, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityView {
    pub paper_id: i64,
    pub most_similar_ids: Vec<i64>,
    pub most_similar_scores: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthView {
    pub status: HealthStatus,
    pub connected: bool,
}

/// Stored fields the views are built from. Anything missing is a data defect.
#[derive(Debug, Deserialize)]
struct StoredDocument {
    paper_id: Option<f64>,
    prediction: Option<f64>,
    probability: Option<Vec<f64>>,
    most_similar_id: Option<Vec<f64>>,
    most_similar_score: Option<Vec<f64>>,
}

fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

/// The stored `paper_id`, which must be the one that was asked for.
fn owner_id(stored: Option<f64>, paper_id: i64, index: &str) -> Result<i64, IndexError> {
    let stored_id = whole_number(required(stored, "paper_id", paper_id)?, "paper_id", paper_id)?;
    if stored_id != paper_id {
        return Err(IndexError::Internal(format!(
            "document {paper_id} in {index} belongs to paper {stored_id}"
        )));
    }
    Ok(stored_id)
}

fn required<T>(field: Option<T>, name: &str, paper_id: i64) -> Result<T, IndexError> {
    field.ok_or_else(|| IndexError::Internal(format!("document {paper_id} has no {name} field")))
}

fn whole_number(value: f64, name: &str, paper_id: i64) -> Result<i64, IndexError> {
    integral(value).ok_or_else(|| {
        IndexError::Internal(format!(
            "document {paper_id}: {name} {value} is not a whole number"
        ))
    })
}

/// Serves the read endpoints from a shared backend handle.
#[derive(Clone)]
pub struct RetrievalService {
    backend: Arc<dyn SearchBackend>,
    timeout: Duration,
}

impl RetrievalService {
    pub fn new(backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, IndexError>
    where
        F: Future<Output = Result<T, IndexError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(IndexError::Unavailable(format!(
                    "backend call timed out after {}ms",
                    self.timeout.as_millis()
                )))
            })
    }

    /// Fetch the stored source of `paper_id` in `index`.
    ///
    /// Anything but a connectivity failure is reported as `NotFound`.
    pub async fn fetch(&self, index: &str, paper_id: i64) -> Result<Value, IndexError> {
        let not_found = || IndexError::NotFound {
            paper_id,
            index: index.to_string(),
        };
        match self
            .bounded(self.backend.get_document(index, &paper_id.to_string()))
            .await
        {
            Ok(Some(source)) => Ok(source),
            Ok(None) => {
                tracing::warn!(paper_id, index = %index, "document not found");
                Err(not_found())
            }
            Err(err) if err.is_unavailable() => {
                tracing::error!(paper_id, index = %index, error = %err, "backend unavailable");
                Err(err)
            }
            Err(err) => {
                tracing::warn!(paper_id, index = %index, error = %err, "document fetch failed");
                Err(not_found())
            }
        }
    }

    async fn fetch_stored(&self, index: &str, paper_id: i64) -> Result<StoredDocument, IndexError> {
        let source = self.fetch(index, paper_id).await?;
        serde_json::from_value(source).map_err(|err| {
            tracing::error!(paper_id, index = %index, error = %err, "malformed stored document");
            IndexError::Internal(format!("document {paper_id} in {index} is malformed: {err}"))
        })
    }

    pub async fn get_prediction(
        &self,
        index: &str,
        paper_id: i64,
    ) -> Result<PredictionView, IndexError> {
        let doc = self.fetch_stored(index, paper_id).await?;
        let stored_id = owner_id(doc.paper_id, paper_id, index)?;
        let prediction = required(doc.prediction, "prediction", paper_id)?;
        let probabilities = required(doc.probability, "probability", paper_id)?;

        Ok(PredictionView {
            paper_id: stored_id,
            pred_label_index: whole_number(prediction, "prediction", paper_id)?,
            probabilities,
        })
    }

    /// The first `top_k` neighbors in stored rank order.
    pub async fn get_most_similar(
        &self,
        index: &str,
        paper_id: i64,
        top_k: NonZeroUsize,
    ) -> Result<SimilarityView, IndexError> {
        let doc = self.fetch_stored(index, paper_id).await?;
        let stored_id = owner_id(doc.paper_id, paper_id, index)?;
        let mut ids = required(doc.most_similar_id, "most_similar_id", paper_id)?;
        let mut scores = required(doc.most_similar_score, "most_similar_score", paper_id)?;
        if ids.len() != scores.len() {
            return Err(IndexError::Internal(format!(
                "document {paper_id} in {index} has {} similar ids but {} scores",
                ids.len(),
                scores.len()
            )));
        }

        ids.truncate(top_k.get());
        scores.truncate(top_k.get());
        let most_similar_ids = ids
            .into_iter()
            .map(|id| whole_number(id, "most_similar_id", paper_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SimilarityView {
            paper_id: stored_id,
            most_similar_ids,
            most_similar_scores: scores,
        })
    }

    /// Reachability as a status. Only non-connectivity probe errors are returned.
    pub async fn health(&self) -> Result<HealthView, IndexError> {
        let connected = match self.bounded(self.backend.ping()).await {
            Ok(connected) => connected,
            Err(err) if err.is_unavailable() => {
                tracing::warn!(error = %err, "health probe failed");
                false
            }
            Err(err) => return Err(err),
        };
        Ok(HealthView {
            status: if connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            connected,
        })
    }
}
