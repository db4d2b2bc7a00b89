//! virtufit: pipeline stage orchestration for GPU-backed 3D try-on workflows.
//!
//! This library drives a multi-stage media-processing pipeline (photo → body
//! keypoints → 3D body mesh → smoothed mesh → garment fit → preview render)
//! by launching one ephemeral container per stage and passing data between
//! stages exclusively through a shared object store.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod stage;
pub mod store;

// Re-export commonly used error types
pub use error::{DockerError, StoreError};
