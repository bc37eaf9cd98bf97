//! Error types shared across the telemetry buffer crates.
//!
//! Pipeline entry points never surface these to the host application; they
//! are terminal at the point of detection and are reported through the
//! [`Telemetry`](crate::telemetry::Telemetry) sink instead.

use thiserror::Error;

/// Result type alias for telemetry buffer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for configuration and shared plumbing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid performance preset: {0}")]
    InvalidPreset(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
