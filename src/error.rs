use thiserror::Error;

use crate::api_connection::connection::ApiConnectionError;

/// Failures of the JSON-producing model wrapper. All of these are recoverable
/// through a fallback path somewhere above; none should reach the route layer
/// undigested.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model transport failed: {0}")]
    Transport(#[from] ApiConnectionError),
    #[error("unable to locate a JSON object matching the expected shape in the model response")]
    NoJsonObject,
    #[error("model JSON did not fit the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("generated content rejected: {0}")]
    Rejected(String),
    #[error("model JSON generation failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<GenerationError>,
    },
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input shape. Fails fast, no retry.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Both model generation and the corpus-only fallback failed.
    #[error("recommendation service temporarily unavailable")]
    TransientService,
    /// Store read/write failure. Reads are treated as cache misses by the
    /// service layer; writes are logged and swallowed.
    #[error("persistent store failure: {0}")]
    Persistence(String),
    #[error("corpus index load failed: {0}")]
    CorpusLoad(String),
}

impl CoreError {
    pub fn retryable(&self) -> bool {
        matches!(self, CoreError::TransientService)
    }
}
