//! Stage outcome taxonomy and per-run state machine.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Classified result of one stage run.
///
/// Ordered most specific first: input validation happens before any
/// container exists, image and resource lookups fail during creation,
/// daemon errors cover the remaining API surface, and `UnknownFailure`
/// absorbs everything else, including a non-zero container exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The container exited with status 0.
    Success,
    /// A required input key is absent from the store; no container was started.
    InputMissing { key: String },
    /// The stage image does not exist (deployment/config defect).
    ImageMissing,
    /// A referenced network or volume is absent.
    ResourceMissing,
    /// Container-runtime failure, transient or permanent.
    DaemonError,
    /// The stage exceeded its wall-clock budget.
    Timeout,
    /// Catch-all for any other failure.
    UnknownFailure,
}

impl StageOutcome {
    /// Whether the stage completed without error.
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }

    /// Short machine-readable name of the outcome kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StageOutcome::Success => "success",
            StageOutcome::InputMissing { .. } => "input_missing",
            StageOutcome::ImageMissing => "image_missing",
            StageOutcome::ResourceMissing => "resource_missing",
            StageOutcome::DaemonError => "daemon_error",
            StageOutcome::Timeout => "timeout",
            StageOutcome::UnknownFailure => "unknown_failure",
        }
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutcome::InputMissing { key } => write!(f, "input_missing ({key})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// A stage failure surfaced at the workflow boundary, carrying the stage
/// name and outcome kind.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {outcome}")]
pub struct StageError {
    pub stage: String,
    pub outcome: StageOutcome,
}

/// State of a stage run.
///
/// ```text
/// Pending → Validating → Running → Reclaiming → {Succeeded | Failed}
/// ```
///
/// `Reclaiming` always follows `Running`; a validation failure transitions
/// directly to `Failed` without ever starting a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Validating,
    Running,
    Reclaiming,
    Succeeded,
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::Validating)
                | (RunState::Validating, RunState::Running)
                | (RunState::Validating, RunState::Failed)
                | (RunState::Running, RunState::Reclaiming)
                | (RunState::Reclaiming, RunState::Succeeded)
                | (RunState::Reclaiming, RunState::Failed)
        )
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Validating => "validating",
            RunState::Running => "running",
            RunState::Reclaiming => "reclaiming",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One execution instance of a stage.
///
/// Owns the container name for the run's duration; the runner is the only
/// component that touches the container behind it. Never persisted.
#[derive(Debug)]
pub struct StageRun {
    stage: String,
    container_name: String,
    state: RunState,
    started_at: DateTime<Utc>,
}

impl StageRun {
    /// Creates a pending run with a unique container name.
    pub fn new(stage: impl Into<String>) -> Self {
        let stage = stage.into();
        let container_name = format!("vf-{stage}-{}", Uuid::new_v4().simple());
        Self {
            stage,
            container_name,
            state: RunState::Pending,
            started_at: Utc::now(),
        }
    }

    /// The stage this run executes.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The container name owned by this run.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// The current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// When the run was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Advances the state machine.
    ///
    /// The runner drives transitions in a fixed order, so an illegal
    /// transition is a programming error caught in debug builds.
    pub fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid stage run transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(stage = %self.stage, from = %self.state, to = %next, "stage run transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        assert!(StageOutcome::Success.is_success());
        assert!(!StageOutcome::Timeout.is_success());
        assert!(!StageOutcome::InputMissing {
            key: "images/a.jpg".to_string()
        }
        .is_success());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(StageOutcome::Success.to_string(), "success");
        assert_eq!(StageOutcome::ImageMissing.to_string(), "image_missing");
        assert_eq!(
            StageOutcome::InputMissing {
                key: "images/a.jpg".to_string()
            }
            .to_string(),
            "input_missing (images/a.jpg)"
        );
    }

    #[test]
    fn test_stage_error_identifies_stage() {
        let err = StageError {
            stage: "mesh-fit".to_string(),
            outcome: StageOutcome::Timeout,
        };
        assert_eq!(err.to_string(), "stage 'mesh-fit' failed: timeout");
    }

    #[test]
    fn test_legal_transitions() {
        assert!(RunState::Pending.can_transition_to(RunState::Validating));
        assert!(RunState::Validating.can_transition_to(RunState::Running));
        assert!(RunState::Validating.can_transition_to(RunState::Failed));
        assert!(RunState::Running.can_transition_to(RunState::Reclaiming));
        assert!(RunState::Reclaiming.can_transition_to(RunState::Succeeded));
        assert!(RunState::Reclaiming.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        // A run can only reach Reclaiming after a container actually ran.
        assert!(!RunState::Validating.can_transition_to(RunState::Reclaiming));
        // Running must pass through Reclaiming before a terminal state.
        assert!(!RunState::Running.can_transition_to(RunState::Succeeded));
        assert!(!RunState::Running.can_transition_to(RunState::Failed));
        // Terminal states are immutable.
        assert!(!RunState::Succeeded.can_transition_to(RunState::Validating));
        assert!(!RunState::Failed.can_transition_to(RunState::Validating));
        assert!(!RunState::Pending.can_transition_to(RunState::Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Reclaiming.is_terminal());
    }

    #[test]
    fn test_stage_run_lifecycle() {
        let mut run = StageRun::new("mesh-fit");
        assert_eq!(run.state(), RunState::Pending);
        assert!(run.container_name().starts_with("vf-mesh-fit-"));

        run.transition(RunState::Validating);
        run.transition(RunState::Running);
        run.transition(RunState::Reclaiming);
        run.transition(RunState::Succeeded);
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_container_names_are_unique_per_run() {
        let a = StageRun::new("mesh-fit");
        let b = StageRun::new("mesh-fit");
        assert_ne!(a.container_name(), b.container_name());
    }
}
