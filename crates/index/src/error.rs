use thiserror::Error;

/// Errors surfaced by the prediction index.
///
/// The variants follow how a caller is expected to react: `Unavailable` is
/// worth retrying later, `NotFound` is the caller's problem, `Internal` needs
/// an operator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// The backend could not be reached (connection refused, reset, timeout).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// No document for this id in this index.
    #[error("paper {paper_id} not found in index {index}")]
    NotFound { paper_id: i64, index: String },

    /// A stored or submitted document does not have the expected shape.
    #[error("internal error: {0}")]
    Internal(String),

    /// The backend answered but refused the request.
    #[error("backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Too many documents of a bulk load failed.
    #[error("{failed} of {total} documents failed to index (allowed ratio {max_ratio})")]
    FailureThreshold {
        failed: usize,
        total: usize,
        max_ratio: f64,
    },
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal(err.to_string())
    }

    /// True for connection-level failures that a readiness probe or a retry could fix.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            IndexError::Unavailable(e.to_string())
        } else if e.is_decode() {
            IndexError::Serialization(e.to_string())
        } else {
            IndexError::Backend(e.to_string())
        }
    }
}
