//! Container runner: executes one stage and classifies its outcome.
//!
//! The runner validates a stage's required inputs against the object store,
//! runs exactly one container for the stage, waits for it under the stage's
//! wall-clock budget, and maps every failure mode onto the
//! [`StageOutcome`] taxonomy. On every exit path it issues exactly one
//! forced container removal (a no-op when no container was created), so no
//! container is ever left running or orphaned. Volumes the run created are
//! reclaimed through the [`VolumeReclaimer`].
//!
//! The runner never inspects output artifacts: producing the promised
//! output keys is the job of the code inside the stage image, and "container
//! exited with status 0" is the only success signal observed here.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::DockerError;
use crate::execution::docker_client::{ContainerDaemon, RunSpec};
use crate::execution::volumes::VolumeReclaimer;
use crate::stage::descriptor::{Bindings, StageDescriptor};
use crate::stage::outcome::{RunState, StageOutcome, StageRun};
use crate::store::ArtifactStore;

/// Seam between the coordinator and stage execution, so workflow logic is
/// testable without a daemon.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs one stage to a classified outcome.
    async fn run_stage(&self, descriptor: &StageDescriptor, bindings: &Bindings) -> StageOutcome;
}

/// Runs stage descriptors as single container runs.
pub struct StageRunner<D: ContainerDaemon + ?Sized, S: ArtifactStore + ?Sized> {
    daemon: Arc<D>,
    store: Arc<S>,
    reclaimer: VolumeReclaimer<D>,
    store_env: Vec<String>,
}

impl<D, S> StageRunner<D, S>
where
    D: ContainerDaemon + ?Sized,
    S: ArtifactStore + ?Sized,
{
    /// Creates a runner over injected daemon and store clients.
    pub fn new(daemon: Arc<D>, store: Arc<S>, config: &PipelineConfig) -> Self {
        Self {
            reclaimer: VolumeReclaimer::new(
                Arc::clone(&daemon),
                config.persistent_volume.as_str(),
            ),
            store_env: config.container_store_env(),
            daemon,
            store,
        }
    }

    /// Runs one stage: validate inputs, run the container, reclaim volumes.
    ///
    /// Never returns an error; every failure mode is folded into the
    /// returned [`StageOutcome`].
    pub async fn run(&self, descriptor: &StageDescriptor, bindings: &Bindings) -> StageOutcome {
        let mut run = StageRun::new(&descriptor.name);
        run.transition(RunState::Validating);

        // Verify every required input before touching the daemon.
        for input in &descriptor.required_inputs {
            let key = match input.key.resolve(bindings) {
                Ok(key) => key,
                Err(e) => {
                    error!(
                        stage = %descriptor.name,
                        image = %descriptor.image,
                        error = %e,
                        "failed to resolve required input key"
                    );
                    return self.fail_validating(run).await;
                }
            };

            match self.store.exists(&input.bucket, &key).await {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        stage = %descriptor.name,
                        image = %descriptor.image,
                        bucket = %input.bucket,
                        key = %key,
                        "required input missing"
                    );
                    self.remove_container_quietly(run.container_name()).await;
                    run.transition(RunState::Failed);
                    return StageOutcome::InputMissing { key };
                }
                Err(e) => {
                    error!(
                        stage = %descriptor.name,
                        image = %descriptor.image,
                        bucket = %input.bucket,
                        key = %key,
                        error = %e,
                        "failed to stat required input"
                    );
                    return self.fail_validating(run).await;
                }
            }
        }

        let args = match descriptor.command.resolve(bindings) {
            Ok(args) => args,
            Err(e) => {
                error!(
                    stage = %descriptor.name,
                    image = %descriptor.image,
                    error = %e,
                    "failed to resolve stage command"
                );
                return self.fail_validating(run).await;
            }
        };

        let container_name = run.container_name().to_string();
        let outcome = {
            let run = &mut run;
            let name = container_name.as_str();
            self.reclaimer
                .with_reclaim(move || async move {
                    run.transition(RunState::Running);
                    let outcome = self.execute(descriptor, args, name).await;
                    run.transition(RunState::Reclaiming);
                    outcome
                })
                .await
        };

        run.transition(if outcome.is_success() {
            RunState::Succeeded
        } else {
            RunState::Failed
        });

        info!(
            stage = %descriptor.name,
            image = %descriptor.image,
            outcome = %outcome,
            "stage run finished"
        );
        outcome
    }

    /// Fails a run during validation. No container was started, so no
    /// reclamation happens; removal is still attempted (a no-op).
    async fn fail_validating(&self, mut run: StageRun) -> StageOutcome {
        self.remove_container_quietly(run.container_name()).await;
        run.transition(RunState::Failed);
        StageOutcome::UnknownFailure
    }

    /// Runs the container to completion, then removes it.
    async fn execute(
        &self,
        descriptor: &StageDescriptor,
        args: Vec<String>,
        container_name: &str,
    ) -> StageOutcome {
        let outcome = self.drive(descriptor, args, container_name).await;
        self.remove_container_quietly(container_name).await;
        outcome
    }

    /// Creates, starts, and waits on the stage container.
    async fn drive(
        &self,
        descriptor: &StageDescriptor,
        args: Vec<String>,
        container_name: &str,
    ) -> StageOutcome {
        let mut env = self.store_env.clone();
        env.extend(
            descriptor
                .environment
                .iter()
                .map(|(name, value)| format!("{name}={value}")),
        );

        let mut spec = RunSpec::new(container_name, &descriptor.image)
            .with_cmd(args)
            .with_env(env)
            .with_gpu(descriptor.gpu_required);
        if !descriptor.network.is_empty() {
            spec = spec.with_network(&descriptor.network);
        }

        if let Err(e) = self.daemon.create_container(&spec).await {
            return self.classify_failure(descriptor, "create", &e);
        }

        if let Err(e) = self.daemon.start_container(container_name).await {
            return self.classify_failure(descriptor, "start", &e);
        }

        match tokio::time::timeout(
            descriptor.timeout,
            self.daemon.wait_container(container_name),
        )
        .await
        {
            Err(_) => {
                warn!(
                    stage = %descriptor.name,
                    image = %descriptor.image,
                    timeout_secs = descriptor.timeout.as_secs(),
                    "stage exceeded its wall-clock budget; force-failing"
                );
                StageOutcome::Timeout
            }
            Ok(Err(e)) => self.classify_failure(descriptor, "wait", &e),
            Ok(Ok(0)) => StageOutcome::Success,
            Ok(Ok(code)) => {
                error!(
                    stage = %descriptor.name,
                    image = %descriptor.image,
                    exit_code = code,
                    "stage container exited non-zero"
                );
                StageOutcome::UnknownFailure
            }
        }
    }

    /// Maps a daemon error onto the outcome taxonomy, most specific first.
    fn classify_failure(
        &self,
        descriptor: &StageDescriptor,
        phase: &str,
        error: &DockerError,
    ) -> StageOutcome {
        let outcome = match error {
            DockerError::ImageNotFound { .. } => StageOutcome::ImageMissing,
            DockerError::NotFound(_) => StageOutcome::ResourceMissing,
            DockerError::DaemonUnavailable(_) | DockerError::Api(_) => StageOutcome::DaemonError,
        };
        error!(
            stage = %descriptor.name,
            image = %descriptor.image,
            phase,
            error = %error,
            outcome = %outcome,
            "stage container failure"
        );
        outcome
    }

    /// Issues the forced container removal every run gets exactly once.
    ///
    /// Removal by name is idempotent: a not-found response means no
    /// container was created for this run and is not an error.
    async fn remove_container_quietly(&self, container_name: &str) {
        match self.daemon.remove_container(container_name).await {
            Ok(()) => debug!(container = container_name, "removed stage container"),
            Err(DockerError::NotFound(_)) => {
                debug!(container = container_name, "no container to remove")
            }
            Err(e) => {
                warn!(
                    container = container_name,
                    error = %e,
                    "failed to remove stage container"
                )
            }
        }
    }
}

#[async_trait]
impl<D, S> StageExecutor for StageRunner<D, S>
where
    D: ContainerDaemon + ?Sized,
    S: ArtifactStore + ?Sized,
{
    async fn run_stage(&self, descriptor: &StageDescriptor, bindings: &Bindings) -> StageOutcome {
        self.run(descriptor, bindings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::stage::descriptor::StageCommand;
    use crate::store::memory::MemoryStore;

    /// How the fake daemon behaves on container creation.
    #[derive(Clone, Copy, PartialEq)]
    enum CreateMode {
        Ok,
        ImageMissing,
        NetworkMissing,
        DaemonError,
    }

    struct FakeDaemon {
        create_mode: CreateMode,
        wait_code: i64,
        /// When set, the wait never returns so the timeout must fire.
        hang_wait: bool,
        /// Volume names that appear while the container runs.
        volumes_created_on_start: Vec<String>,
        volumes: Mutex<HashSet<String>>,
        created: Mutex<Vec<RunSpec>>,
        removed_containers: Mutex<Vec<String>>,
        removed_volumes: Mutex<Vec<String>>,
    }

    impl FakeDaemon {
        fn new(create_mode: CreateMode) -> Self {
            Self {
                create_mode,
                wait_code: 0,
                hang_wait: false,
                volumes_created_on_start: Vec::new(),
                volumes: Mutex::new(HashSet::new()),
                created: Mutex::new(Vec::new()),
                removed_containers: Mutex::new(Vec::new()),
                removed_volumes: Mutex::new(Vec::new()),
            }
        }

        fn removal_attempts(&self) -> usize {
            self.removed_containers.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ContainerDaemon for FakeDaemon {
        async fn create_container(&self, spec: &RunSpec) -> Result<String, DockerError> {
            match self.create_mode {
                CreateMode::Ok => {
                    self.created.lock().unwrap().push(spec.clone());
                    Ok("id".to_string())
                }
                CreateMode::ImageMissing => Err(DockerError::ImageNotFound {
                    image: spec.image.clone(),
                }),
                CreateMode::NetworkMissing => Err(DockerError::NotFound(
                    "network virtufit_app-network not found".to_string(),
                )),
                CreateMode::DaemonError => {
                    Err(DockerError::Api("status 500: driver failed".to_string()))
                }
            }
        }

        async fn start_container(&self, _name: &str) -> Result<(), DockerError> {
            let mut volumes = self.volumes.lock().unwrap();
            for volume in &self.volumes_created_on_start {
                volumes.insert(volume.clone());
            }
            Ok(())
        }

        async fn wait_container(&self, _name: &str) -> Result<i64, DockerError> {
            if self.hang_wait {
                futures::future::pending::<()>().await;
            }
            Ok(self.wait_code)
        }

        async fn remove_container(&self, name: &str) -> Result<(), DockerError> {
            let created = self
                .created
                .lock()
                .unwrap()
                .iter()
                .any(|spec| spec.name == name);
            self.removed_containers
                .lock()
                .unwrap()
                .push(name.to_string());
            if created {
                Ok(())
            } else {
                Err(DockerError::NotFound(format!("No such container: {name}")))
            }
        }

        async fn list_volume_names(&self) -> Result<HashSet<String>, DockerError> {
            Ok(self.volumes.lock().unwrap().clone())
        }

        async fn remove_volume(&self, name: &str) -> Result<(), DockerError> {
            self.volumes.lock().unwrap().remove(name);
            self.removed_volumes.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn descriptor() -> StageDescriptor {
        StageDescriptor::new("pose-keypoints", "openpose")
            .with_command(
                StageCommand::new()
                    .arg("python3")
                    .arg("generate_keypoints.py")
                    .arg("data")
                    .template("images/{id}{ext}"),
            )
            .require("data", "images/{id}{ext}")
            .produce("data", "keypoints/{id}_keypoints.json")
            .with_network("virtufit_app-network")
            .with_gpu(true)
    }

    fn bindings() -> Bindings {
        Bindings::new().with("id", "abc").with("ext", ".jpg")
    }

    fn runner(
        daemon: Arc<FakeDaemon>,
        store: Arc<MemoryStore>,
    ) -> StageRunner<FakeDaemon, MemoryStore> {
        let config = PipelineConfig::new().with_persistent_volume("data-vol");
        StageRunner::new(daemon, store, &config)
    }

    fn store_with_input() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_objects("data", ["images/abc.jpg"]))
    }

    #[tokio::test]
    async fn test_success_resolves_command_and_env() {
        let daemon = Arc::new(FakeDaemon::new(CreateMode::Ok));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::Success);

        let created = daemon.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let spec = &created[0];
        assert_eq!(spec.image, "openpose");
        assert_eq!(
            spec.cmd,
            vec!["python3", "generate_keypoints.py", "data", "images/abc.jpg"]
        );
        assert!(spec.gpu);
        assert_eq!(spec.network.as_deref(), Some("virtufit_app-network"));
        assert!(spec
            .env
            .iter()
            .any(|entry| entry.starts_with("MINIO_ENDPOINT=")));
        assert!(spec
            .env
            .iter()
            .any(|entry| entry.starts_with("MINIO_ACCESS_KEY=")));
        assert!(spec
            .env
            .iter()
            .any(|entry| entry.starts_with("MINIO_SECRET_KEY=")));
    }

    #[tokio::test]
    async fn test_missing_input_never_starts_container() {
        // Scenario: input key images/abc.jpg absent.
        let daemon = Arc::new(FakeDaemon::new(CreateMode::Ok));
        let store = Arc::new(MemoryStore::with_objects("data", Vec::<String>::new()));
        let runner = runner(Arc::clone(&daemon), store);

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(
            outcome,
            StageOutcome::InputMissing {
                key: "images/abc.jpg".to_string()
            }
        );
        assert!(daemon.created.lock().unwrap().is_empty());
        // Removal is still attempted once, as a no-op.
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_image_missing_still_attempts_removal() {
        // Scenario: container creation fails with image-not-found; no
        // container object exists, yet removal is attempted and is a no-op.
        let daemon = Arc::new(FakeDaemon::new(CreateMode::ImageMissing));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::ImageMissing);
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_missing_network_is_resource_missing() {
        let daemon = Arc::new(FakeDaemon::new(CreateMode::NetworkMissing));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::ResourceMissing);
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_api_failure_is_daemon_error() {
        let daemon = Arc::new(FakeDaemon::new(CreateMode::DaemonError));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::DaemonError);
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_unknown_failure() {
        let mut daemon = FakeDaemon::new(CreateMode::Ok);
        daemon.wait_code = 137;
        let daemon = Arc::new(daemon);
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::UnknownFailure);
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_hung_wait_times_out_and_removes_container() {
        let mut daemon = FakeDaemon::new(CreateMode::Ok);
        daemon.hang_wait = true;
        let daemon = Arc::new(daemon);
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let descriptor = descriptor().with_timeout(Duration::from_millis(50));
        let outcome = runner.run(&descriptor, &bindings()).await;
        assert_eq!(outcome, StageOutcome::Timeout);
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_exactly_one_removal_on_success() {
        let daemon = Arc::new(FakeDaemon::new(CreateMode::Ok));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        runner.run(&descriptor(), &bindings()).await;
        assert_eq!(daemon.removal_attempts(), 1);
    }

    #[tokio::test]
    async fn test_ephemeral_volumes_reclaimed_persistent_kept() {
        // Scenario: the run creates v1 and v2; data-vol predates the run.
        let mut daemon = FakeDaemon::new(CreateMode::Ok);
        daemon.volumes_created_on_start = vec!["v1".to_string(), "v2".to_string()];
        daemon
            .volumes
            .lock()
            .unwrap()
            .insert("data-vol".to_string());
        let daemon = Arc::new(daemon);
        let runner = runner(Arc::clone(&daemon), store_with_input());

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::Success);

        let mut removed = daemon.removed_volumes.lock().unwrap().clone();
        removed.sort();
        assert_eq!(removed, vec!["v1", "v2"]);
        assert!(daemon.volumes.lock().unwrap().contains("data-vol"));
    }

    #[tokio::test]
    async fn test_rerun_after_supplying_missing_input_succeeds() {
        // A failed InputMissing run leaves no state behind; supplying the
        // key and re-running the same stage must succeed.
        let daemon = Arc::new(FakeDaemon::new(CreateMode::Ok));
        let store = Arc::new(MemoryStore::with_objects("data", Vec::<String>::new()));
        let runner = runner(Arc::clone(&daemon), Arc::clone(&store));

        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert!(matches!(outcome, StageOutcome::InputMissing { .. }));

        store.insert("data", "images/abc.jpg", Vec::new());
        let outcome = runner.run(&descriptor(), &bindings()).await;
        assert_eq!(outcome, StageOutcome::Success);
    }

    #[tokio::test]
    async fn test_unbound_command_placeholder_is_unknown_failure() {
        let daemon = Arc::new(FakeDaemon::new(CreateMode::Ok));
        let runner = runner(Arc::clone(&daemon), store_with_input());

        // Bindings lack "gender" used by the command.
        let descriptor = StageDescriptor::new("mesh-fit", "smplify-x")
            .with_command(StageCommand::new().template("{gender}"))
            .require("data", "images/{id}{ext}");
        let outcome = runner.run(&descriptor, &bindings()).await;
        assert_eq!(outcome, StageOutcome::UnknownFailure);
        assert!(daemon.created.lock().unwrap().is_empty());
        assert_eq!(daemon.removal_attempts(), 1);
    }
}
