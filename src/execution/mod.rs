//! Container daemon layer.
//!
//! This module wraps the Docker API behind the [`ContainerDaemon`] seam the
//! stage runner and volume reclaimer depend on, using the bollard crate for
//! the real implementation.
//!
//! # Architecture
//!
//! A stage run drives exactly one container through this lifecycle:
//! ```text
//! create → start → wait (bounded) → forced remove
//! ```
//! and volumes the run implicitly created are reclaimed afterwards by
//! diffing the daemon's volume set (see [`volumes`]).

pub mod docker_client;
pub mod volumes;

pub use docker_client::{ContainerDaemon, DockerClient, RunSpec};
pub use volumes::VolumeReclaimer;
