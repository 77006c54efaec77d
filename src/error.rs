//! Error taxonomy shared by every depot operation.
//!
//! Library code returns [`DepotError`] so callers can match on the failure
//! kind; the CLI and HTTP layers convert into `anyhow` / JSON error bodies
//! at the boundary. Thumbnail generation is the one deliberate exception
//! to "every error surfaces": its failures are logged and the ingest
//! proceeds without derivatives.

/// Failure kinds for depot operations.
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    /// Malformed input: bad JSON, empty stream, invalid parameters.
    /// Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Tenant is unknown, inactive, or does not own the artifact.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// Admission or commit-time quota re-check failed.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Canonical path collision survived the bounded retries.
    #[error("path collision: {0}")]
    NameCollision(String),

    /// Relational/document store or filesystem I/O failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding gateway retries exhausted.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A per-operation deadline elapsed at a suspension point.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The caller's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Artifact, tenant, or chunk does not exist in the caller's scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invariant violation: wrong vector dimension, taxonomy missing the
    /// `other` fallback, corrupt catalog row.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Stable machine-readable kind, used by the HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            DepotError::Validation(_) => "validation",
            DepotError::Forbidden(_) => "forbidden",
            DepotError::QuotaExceeded(_) => "quota_exceeded",
            DepotError::NameCollision(_) => "name_collision",
            DepotError::StoreUnavailable(_) => "store_unavailable",
            DepotError::EmbeddingUnavailable(_) => "embedding_unavailable",
            DepotError::Timeout(_) => "timeout",
            DepotError::Cancelled => "cancelled",
            DepotError::NotFound(_) => "not_found",
            DepotError::Internal(_) => "internal",
        }
    }

    /// Optional remediation hint for the error envelope.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DepotError::QuotaExceeded(_) => {
                Some("free space by deleting artifacts, or raise the tenant quota")
            }
            DepotError::EmbeddingUnavailable(_) => {
                Some("check that the embedding service is running and reachable")
            }
            DepotError::Timeout(_) | DepotError::StoreUnavailable(_) => Some("retry the request"),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DepotError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => DepotError::NotFound("row not found".to_string()),
            other => DepotError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DepotError {
    fn from(e: std::io::Error) -> Self {
        DepotError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for DepotError {
    fn from(e: serde_json::Error) -> Self {
        DepotError::Validation(format!("bad JSON: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, DepotError>;
