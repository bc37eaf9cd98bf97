//! Error types for storage operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting or reading batch files.
///
/// None of these reach the host application: writer, reader and migrator
/// report them through the telemetry sink and carry on.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record larger than the preset allows
    #[error("data exceeds the maximum size of {max} bytes ({size} bytes)")]
    ObjectTooLarge { size: u64, max: u64 },

    /// Zero-length record
    #[error("refusing to write an empty record")]
    EmptyObject,

    /// Path exists but is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Could not find a free file name in the directory
    #[error("no free batch file name near {0}")]
    NameExhausted(String),

    /// Payload encryption or decryption failed
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Feature name unusable as a directory name
    #[error("invalid feature name: {0:?}")]
    InvalidFeatureName(String),

    /// Invalid performance preset
    #[error("configuration error: {0}")]
    Config(#[from] tb_common::Error),

    /// The background write queue is no longer running
    #[error("write queue '{0}' is closed")]
    QueueClosed(String),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
