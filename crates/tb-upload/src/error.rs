//! Error types for the upload pipeline.

use thiserror::Error;

/// Errors raised while preparing or initiating an upload.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Compressing the request body failed
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// The batch cannot be turned into a request
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),

    /// The transport could not start the request
    #[error("transport error: {0}")]
    Transport(String),

    /// The background upload thread could not be started
    #[error("failed to spawn upload thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Why an upload that did complete was not a success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    /// The intake rejected the credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The intake answered with an error status.
    #[error("HTTP error {status_code}")]
    HttpError { status_code: u16 },

    /// The request never got an answer.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
