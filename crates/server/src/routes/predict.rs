use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use index::{PredictionView, SimilarityView};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

pub type PredictResponse = PredictionView;
pub type SimilarResponse = SimilarityView;

/// Request for the stored prediction of one paper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictRequest {
    /// Index holding the result set, e.g. `pred-result-20250728084431`
    pub index_name: String,

    /// Paper id, must be positive
    pub paper_id: i64,
}

/// Request for the most similar papers of one paper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimilarRequest {
    pub index_name: String,

    pub paper_id: i64,

    /// Number of papers to return, must be positive
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

fn default_top_k() -> i64 {
    5
}

/// Characters OpenSearch refuses in index names.
const FORBIDDEN_INDEX_CHARS: &[char] = &['/', '\\', '?', '#', '*', '"', '<', '>', '|', ',', ' '];

fn validate_index_name(index_name: &str) -> ServerResult<()> {
    let invalid = |reason: &str| -> ServerResult<()> {
        Err(ServerError::Validation(format!(
            "index_name {index_name:?} {reason}"
        )))
    };
    if index_name.is_empty() {
        return Err(ServerError::Validation("index_name must not be empty".into()));
    }
    if index_name == "." || index_name == ".." || index_name.len() > 255 {
        return invalid("is not a valid index name");
    }
    if index_name.starts_with(['_', '-', '+']) {
        return invalid("must not start with '_', '-' or '+'");
    }
    if index_name.contains(FORBIDDEN_INDEX_CHARS) {
        return invalid("contains a character not allowed in index names");
    }
    if index_name.chars().any(char::is_uppercase) {
        return invalid("must be lowercase");
    }
    Ok(())
}

fn validate_target(index_name: &str, paper_id: i64) -> ServerResult<()> {
    validate_index_name(index_name)?;
    if paper_id <= 0 {
        return Err(ServerError::Validation(format!(
            "paper_id must be greater than 0, got {paper_id}"
        )));
    }
    Ok(())
}

/// Get prediction and probabilities for a paper
pub async fn predict(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> ServerResult<Json<PredictResponse>> {
    let Json(request) = payload?;
    validate_target(&request.index_name, request.paper_id)?;

    let view = state
        .retrieval
        .get_prediction(&request.index_name, request.paper_id)
        .await?;
    Ok(Json(view))
}

/// Get the most similar papers and their scores
pub async fn most_similar(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SimilarRequest>, JsonRejection>,
) -> ServerResult<Json<SimilarResponse>> {
    let Json(request) = payload?;
    validate_target(&request.index_name, request.paper_id)?;
    let top_k = usize::try_from(request.top_k)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            ServerError::Validation(format!(
                "top_k must be greater than 0, got {}",
                request.top_k
            ))
        })?;

    let view = state
        .retrieval
        .get_most_similar(&request.index_name, request.paper_id, top_k)
        .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_defaults_to_five() {
        let request: SimilarRequest =
            serde_json::from_str(r#"{"index_name": "idx1", "paper_id": 31336}"#).unwrap();
        assert_eq!(request.top_k, 5);
    }

    #[test]
    fn target_validation() {
        assert!(validate_target("idx1", 1).is_ok());
        assert!(matches!(
            validate_target("idx1", 0),
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            validate_target("  ", 3),
            Err(ServerError::Validation(_))
        ));
    }

    #[test]
    fn index_names_opensearch_would_refuse_are_rejected() {
        for name in [
            "",
            "idx1/_doc/5?",
            "idx1#x",
            "a,b",
            "a*",
            "back\\slash",
            "_internal",
            "-idx",
            "+idx",
            "Idx1",
            "..",
        ] {
            assert!(
                matches!(validate_index_name(name), Err(ServerError::Validation(_))),
                "{name:?} should be rejected"
            );
        }

        assert!(validate_index_name("pred-result-20250728084431").is_ok());
        assert!(validate_index_name("idx1").is_ok());
    }
}
