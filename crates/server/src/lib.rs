//! Prediction server - HTTP API over a prediction result index
//!
//! Serves precomputed class predictions and similar-paper lists stored in an
//! OpenSearch index by the batch loader. Every request re-reads the backend;
//! the server keeps no local state besides the shared connection handle.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /` - API information and an example request
//! - `GET /health` - Backend reachability (`healthy` or `degraded`)
//! - `POST /predict` - Predicted label and class probabilities for a paper
//! - `POST /most_similar` - Top-k most similar papers with scores

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
