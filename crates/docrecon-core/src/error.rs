//! Error types for the docrecon-core library.

use thiserror::Error;

/// Main error type for the docrecon library.
#[derive(Error, Debug)]
pub enum ReconError {
    /// The document yielded no usable text.
    #[error("input error: {0}")]
    Input(String),

    /// Field/line-item extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Contact cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// External backend error (OCR, LLM, accounting platform).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors related to field and line-item extraction.
///
/// Extraction *uncertainty* (a field that simply is not there) is not an
/// error; it propagates as empty options and warnings. These variants cover
/// genuinely malformed input.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Required field is missing.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Failed to parse a value.
    #[error("failed to parse {field}: {value}")]
    Parse { field: String, value: String },

    /// No document data could be extracted at all.
    #[error("no document data found")]
    NoData,
}

/// Errors related to the contact cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The persisted cache file could not be read.
    #[error("failed to read cache file: {0}")]
    Read(String),

    /// The persisted cache file could not be parsed.
    #[error("failed to parse cache file: {0}")]
    Parse(String),

    /// The cache file could not be written.
    #[error("failed to write cache file: {0}")]
    Write(String),
}

/// Errors from external collaborators.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend returned an explicit failure.
    #[error("{service} failed: {reason}")]
    Service { service: &'static str, reason: String },

    /// The backend did not answer within the configured timeout.
    #[error("{service} timed out after {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },

    /// The backend returned an empty result where content was required.
    #[error("{service} returned an empty result")]
    Empty { service: &'static str },
}

/// Result type for the docrecon library.
pub type Result<T> = std::result::Result<T, ReconError>;
