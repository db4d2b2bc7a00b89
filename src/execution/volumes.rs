//! Volume reclamation around stage runs.
//!
//! Stage images implicitly create anonymous or named scratch volumes as a
//! side effect of being started; without reclamation, repeated pipeline runs
//! leak volumes unboundedly. The daemon does not expose "volumes created by
//! this specific run", so the reclaimer snapshots the daemon's volume set
//! immediately before and after a run and deletes everything that appeared,
//! excluding the one well-known persistent volume.
//!
//! The set-diff is racy under concurrent workflows (another workflow's
//! ephemeral volume can land inside this run's diff window); accepted as a
//! single-node limitation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::DockerError;
use crate::execution::docker_client::ContainerDaemon;

/// Deletes every volume that appears during a wrapped run, except the
/// persistent volume.
pub struct VolumeReclaimer<D: ContainerDaemon + ?Sized> {
    daemon: Arc<D>,
    persistent_volume: String,
}

impl<D: ContainerDaemon + ?Sized> VolumeReclaimer<D> {
    /// Creates a reclaimer that never touches `persistent_volume`.
    pub fn new(daemon: Arc<D>, persistent_volume: impl Into<String>) -> Self {
        Self {
            daemon,
            persistent_volume: persistent_volume.into(),
        }
    }

    /// The volume name excluded from every diff.
    pub fn persistent_volume(&self) -> &str {
        &self.persistent_volume
    }

    /// Snapshots the daemon's current volume names.
    pub async fn snapshot(&self) -> Result<HashSet<String>, DockerError> {
        self.daemon.list_volume_names().await
    }

    /// Computes the ephemeral volume set: `post − pre`, minus the persistent
    /// volume. Exclusion is by identity, so the persistent volume is dropped
    /// even if it only appeared inside the diff window.
    pub fn ephemeral(
        &self,
        pre: &HashSet<String>,
        post: &HashSet<String>,
    ) -> Vec<String> {
        let mut volumes: Vec<String> = post
            .difference(pre)
            .filter(|name| *name != &self.persistent_volume)
            .cloned()
            .collect();
        volumes.sort();
        volumes
    }

    /// Deletes the ephemeral volumes between two snapshots.
    ///
    /// Each deletion is logged independently; one failure never prevents
    /// attempting the others, and no failure escalates to the caller.
    ///
    /// # Returns
    ///
    /// The number of volumes actually removed.
    pub async fn reclaim(&self, pre: &HashSet<String>, post: &HashSet<String>) -> usize {
        let mut removed = 0;
        for volume in self.ephemeral(pre, post) {
            match self.daemon.remove_volume(&volume).await {
                Ok(()) => {
                    info!(volume = %volume, "removed ephemeral volume");
                    removed += 1;
                }
                Err(e) => {
                    warn!(volume = %volume, error = %e, "failed to remove ephemeral volume");
                }
            }
        }
        removed
    }

    /// Runs `f` between a pre and post volume snapshot, reclaiming every
    /// volume the run created.
    ///
    /// Reclamation is best-effort: a failed snapshot skips the diff (logged)
    /// and the wrapped run's result is returned unchanged either way.
    pub async fn with_reclaim<T, F, Fut>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let pre = match self.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "failed to snapshot volumes before run; skipping reclamation");
                None
            }
        };

        let result = f().await;

        if let Some(pre) = pre {
            match self.snapshot().await {
                Ok(post) => {
                    self.reclaim(&pre, &post).await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to snapshot volumes after run; skipping reclamation");
                }
            }
        }

        result
    }
}
