//! Index layout for a prediction result set and its provisioning.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::PredictionRecord;
use crate::{IndexError, SearchBackend};

/// Placeholder replaced by the generation timestamp in index name templates.
pub const GENERATION_PLACEHOLDER: &str = "{dt}";

/// Default index name template, one index per generation run.
pub const DEFAULT_INDEX_TEMPLATE: &str = "pred-result-{dt}";

/// Identifies one provisioned index and the vector widths it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub prob_dim: usize,
    pub embed_dim: usize,
    pub sim_top_k: usize,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, prob_dim: usize, embed_dim: usize, sim_top_k: usize) -> Self {
        Self {
            name: name.into(),
            prob_dim,
            embed_dim,
            sim_top_k,
        }
    }

    /// Take the vector widths from one record of the result set.
    pub fn from_sample(name: impl Into<String>, sample: &PredictionRecord) -> Self {
        Self::new(
            name,
            sample.probability.len(),
            sample.embedding.len(),
            sample.most_similar_id.len(),
        )
    }

    /// Settings and mappings body for the index create call.
    pub fn index_body(&self) -> Value {
        json!({
            "settings": {
                "index": {
                    "number_of_shards": 1,
                    "number_of_replicas": 0,
                    "knn": true
                }
            },
            "mappings": {
                "properties": {
                    "paper_id": { "type": "integer" },
                    "probability": knn_vector(self.prob_dim),
                    "prediction": { "type": "float" },
                    "embedding": knn_vector(self.embed_dim),
                    // An ordered id list, kept as a vector field to reuse the knn mapping.
                    "most_similar_id": knn_vector(self.sim_top_k),
                    "most_similar_score": knn_vector(self.sim_top_k),
                    "timestamp": { "type": "date" },
                    "metadata": {
                        "type": "object",
                        "properties": {
                            "gnn_version": { "type": "keyword" }
                        }
                    }
                }
            }
        })
    }
}

fn knn_vector(dimension: usize) -> Value {
    json!({
        "type": "knn_vector",
        "dimension": dimension,
        "method": { "name": "hnsw", "space_type": "l2", "engine": "lucene" }
    })
}

/// Expand `{dt}` in an index name template with `%Y%m%d%H%M%S`.
pub fn index_name_from_template<Tz>(template: &str, now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    template.replace(
        GENERATION_PLACEHOLDER,
        &now.format("%Y%m%d%H%M%S").to_string(),
    )
}

/// Create the index described by `descriptor`, replacing any index of the same name.
///
/// Returns `false` when the backend refuses the create (or the delete of the
/// previous generation); the caller should abort rather than load into a
/// malformed index.
pub async fn provision_index(backend: &dyn SearchBackend, descriptor: &IndexDescriptor) -> bool {
    match try_provision_index(backend, descriptor).await {
        Ok(()) => {
            tracing::info!(
                index = %descriptor.name,
                prob_dim = descriptor.prob_dim,
                embed_dim = descriptor.embed_dim,
                sim_top_k = descriptor.sim_top_k,
                "created index with k-NN support"
            );
            true
        }
        Err(err) => {
            tracing::error!(index = %descriptor.name, error = %err, "failed to create index");
            false
        }
    }
}

/// [`provision_index`] with the failure cause kept.
pub async fn try_provision_index(
    backend: &dyn SearchBackend,
    descriptor: &IndexDescriptor,
) -> Result<(), IndexError> {
    if backend.index_exists(&descriptor.name).await? {
        backend.delete_index(&descriptor.name).await?;
        tracing::info!(index = %descriptor.name, "deleted existing index");
    }
    backend
        .create_index(&descriptor.name, &descriptor.index_body())
        .await
}

/// Remove an index. An index that is already gone is not an error.
pub async fn drop_index(backend: &dyn SearchBackend, name: &str) -> Result<(), IndexError> {
    match backend.delete_index(name).await {
        Ok(()) => {
            tracing::info!(index = %name, "deleted index");
            Ok(())
        }
        Err(IndexError::Rejected { status: 404, .. }) => Ok(()),
        Err(err) => Err(err),
    }
}
