//! Docker API wrapper using the bollard crate.
//!
//! This module provides the container and volume operations the stage
//! orchestrator needs, behind the [`ContainerDaemon`] trait so the runner
//! and reclaimer can be exercised against fakes.

use std::collections::HashSet;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{DeviceRequest, HostConfig};
use bollard::volume::ListVolumesOptions;
use bollard::Docker;
use futures::StreamExt;

use crate::error::DockerError;

/// Specification for a single container run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Unique name for the container; doubles as the removal handle.
    pub name: String,
    /// Docker image to run.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Vec<String>,
    /// Environment variables in `NAME=value` form.
    pub env: Vec<String>,
    /// Named network to attach to, if any.
    pub network: Option<String>,
    /// Whether to request GPU device access.
    pub gpu: bool,
}

impl RunSpec {
    /// Creates a new run specification for the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: Vec::new(),
            env: Vec::new(),
            network: None,
            gpu: false,
        }
    }

    /// Sets the command to run in the container.
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Adds environment variables.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Attaches the container to a named network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Requests GPU device access.
    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }
}

/// Container and volume operations the orchestrator depends on.
///
/// Constructed clients are passed in explicitly so the runner and reclaimer
/// are testable in isolation with fakes.
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    /// Creates a container; returns the daemon-assigned id.
    async fn create_container(&self, spec: &RunSpec) -> Result<String, DockerError>;

    /// Starts a container by name.
    async fn start_container(&self, name: &str) -> Result<(), DockerError>;

    /// Blocks until the container stops; returns its exit code.
    async fn wait_container(&self, name: &str) -> Result<i64, DockerError>;

    /// Force-removes a container by name.
    async fn remove_container(&self, name: &str) -> Result<(), DockerError>;

    /// Snapshots the names of all volumes known to the daemon.
    async fn list_volume_names(&self) -> Result<HashSet<String>, DockerError>;

    /// Removes a volume by name.
    async fn remove_volume(&self, name: &str) -> Result<(), DockerError>;
}

/// Docker client wrapper for container and volume operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Pings the daemon; used by health checks.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DockerError::DaemonUnavailable(e.to_string()))
    }
}

/// Maps a bollard error onto the daemon error taxonomy.
///
/// A 404 on container creation means the image is absent; a 404 against any
/// other named resource (network, volume, container) is a plain not-found.
fn classify(err: bollard::errors::Error, image: Option<&str>) -> DockerError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => {
            if let Some(image) = image {
                if message.contains("No such image") {
                    return DockerError::ImageNotFound {
                        image: image.to_string(),
                    };
                }
            }
            DockerError::NotFound(message)
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => DockerError::Api(format!("status {status_code}: {message}")),
        other => DockerError::Api(other.to_string()),
    }
}

/// The device request that exposes all GPUs to a container.
fn gpu_device_request() -> DeviceRequest {
    DeviceRequest {
        driver: None,
        count: Some(-1),
        device_ids: None,
        capabilities: Some(vec![vec!["gpu".to_string()]]),
        options: None,
    }
}

#[async_trait]
impl ContainerDaemon for DockerClient {
    async fn create_container(&self, spec: &RunSpec) -> Result<String, DockerError> {
        let host_config = HostConfig {
            network_mode: spec.network.clone(),
            device_requests: spec.gpu.then(|| vec![gpu_device_request()]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| classify(e, Some(&spec.image)))?;

        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| classify(e, None))
    }

    async fn wait_container(&self, name: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(name, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard surfaces a non-zero exit as a wait error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(classify(e, None)),
            None => {
                // Empty stream: fall back to inspecting the container state.
                let info = self
                    .docker
                    .inspect_container(name, None::<InspectContainerOptions>)
                    .await
                    .map_err(|e| classify(e, None))?;

                info.state
                    .and_then(|state| state.exit_code)
                    .ok_or_else(|| DockerError::Api("container did not exit normally".to_string()))
            }
        }
    }

    async fn remove_container(&self, name: &str) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| classify(e, None))
    }

    async fn list_volume_names(&self) -> Result<HashSet<String>, DockerError> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await
            .map_err(|e| classify(e, None))?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| volume.name)
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), DockerError> {
        self.docker
            .remove_volume(name, None)
            .await
            .map_err(|e| classify(e, None))
    }
}
