//! Crate-wide error type and the classification the dispatcher/scheduler
//! cycles use to decide retry vs. fail vs. abort-without-state-change.

use thiserror::Error;

/// The five error classes a cycle ever needs to act on. Every
/// [`PipelineError`] maps to exactly one via [`PipelineError::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network errors, timeouts, 5xx, connection resets. Retried with
    /// backoff; counts against `tried_count` on the fetch path.
    TransientIo,
    /// Fetched content shorter than `MIN_CONTENT_CHARS`. Treated as a fetch
    /// failure for retry purposes.
    ContentQuality,
    /// An adapter was handed a URL it does not own. Fatal, no retries.
    LogicalMismatch,
    /// Unique-key violation on `ArticleRecord.url`. Treated as success.
    PersistenceConflict,
    /// Database/vector-store/broker unreachable. Aborts the cycle without
    /// touching any record; not counted against `tried_count`.
    Infrastructure,
}

impl ErrorClass {
    /// Whether a cycle should back off and try the same operation again,
    /// as opposed to recording a terminal outcome.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::TransientIo)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("content for {url} is {len} chars, below the minimum of {min}")]
    ContentTooShort { url: String, len: usize, min: usize },

    #[error("adapter for source {source} does not own url {url}")]
    LogicalMismatch { source: String, url: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error(transparent)]
    Cache(#[from] redis::RedisError),

    #[error("embedder error: {0}")]
    Embedder(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            PipelineError::Timeout { .. } | PipelineError::Http(_) => ErrorClass::TransientIo,
            PipelineError::ContentTooShort { .. } => ErrorClass::ContentQuality,
            PipelineError::LogicalMismatch { .. } => ErrorClass::LogicalMismatch,
            PipelineError::Database(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() =>
            {
                ErrorClass::PersistenceConflict
            }
            PipelineError::Database(_)
            | PipelineError::VectorStore(_)
            | PipelineError::Cache(_)
            | PipelineError::Config(_) => ErrorClass::Infrastructure,
            PipelineError::Embedder(_) => ErrorClass::TransientIo,
            PipelineError::Other(_) => ErrorClass::Infrastructure,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_too_short_classifies_as_content_quality() {
        let err = PipelineError::ContentTooShort {
            url: "https://x".into(),
            len: 10,
            min: 50,
        };
        assert_eq!(err.classify(), ErrorClass::ContentQuality);
    }

    #[test]
    fn logical_mismatch_is_fatal_class() {
        let err = PipelineError::LogicalMismatch {
            source: "IRNA".into(),
            url: "https://x".into(),
        };
        assert_eq!(err.classify(), ErrorClass::LogicalMismatch);
    }
}
