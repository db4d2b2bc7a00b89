//! Error types for virtufit operations.
//!
//! Defines error types for the major subsystems:
//! - Docker container and volume management
//! - Object store access and request signing
//!
//! Stage-level failure classification (the outcome taxonomy) lives in
//! [`crate::stage::outcome`]; the types here describe what the underlying
//! substrate reported, with enough structure that the stage runner can map
//! onto outcomes without string matching.

use thiserror::Error;

/// Errors that can occur during Docker daemon operations.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The Docker daemon could not be reached at all.
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    /// The requested image does not exist locally.
    #[error("image '{image}' not found")]
    ImageNotFound { image: String },

    /// A named resource (network, volume, container) does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other daemon/API-level failure.
    #[error("Docker API error: {0}")]
    Api(String),
}

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The HTTP request to the store failed outright.
    #[error("object store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The requested object does not exist.
    #[error("object '{key}' not found in bucket '{bucket}'")]
    NoSuchKey { bucket: String, key: String },

    /// The store returned a status the client does not expect.
    #[error("unexpected store response {status} for '{path}': {body}")]
    UnexpectedStatus {
        status: u16,
        path: String,
        body: String,
    },

    /// Request signing failed.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// IO error while reading local data for upload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
