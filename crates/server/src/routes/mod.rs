//! API route handlers
//!
//! - `health`: backend reachability
//! - `predict`: prediction and similar-paper lookups

pub mod health;
pub mod predict;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info
///
/// Returns the service description, the available endpoints and an example
/// request body. This is the root endpoint (GET /).
///
/// # Response
///
/// ```json
/// {
///   "message": "ML Prediction API",
///   "version": "0.1.0",
///   "endpoints": {"...": "..."},
///   "example_request": {"index_name": "pred-result-20250728084431", "paper_id": 31336}
/// }
/// ```
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "message": "ML Prediction API",
        "description": "Precomputed predictions and similar papers served from OpenSearch",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /predict": "Get prediction and probability for a paper",
            "POST /most_similar": "Get most similar papers and scores",
            "GET /health": "Health check",
        },
        "example_request": {
            "index_name": "pred-result-20250728084431",
            "paper_id": 31336,
        },
    })))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
