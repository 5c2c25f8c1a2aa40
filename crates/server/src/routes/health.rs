use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::State;
use axum::Json;
use index::HealthStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub opensearch_connected: bool,
}

/// Health check endpoint
///
/// Reports `degraded` when the backend cannot be reached; only an unexpected
/// probe error fails the request.
pub async fn health_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<HealthResponse>> {
    let view = state.retrieval.health().await?;
    Ok(Json(HealthResponse {
        status: view.status,
        opensearch_connected: view.connected,
    }))
}
