//! Pipeline coordinator: fail-fast sequencing of workflow stages.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::pipeline::plan::{PlanError, WorkflowPlan};
use crate::stage::descriptor::{Bindings, TemplateError};
use crate::stage::outcome::StageError;
use crate::stage::runner::StageExecutor;

/// Errors surfaced by [`PipelineCoordinator::run_workflow`].
///
/// A stage failure carries the stage name and outcome kind; plan and
/// template errors indicate a malformed workflow rather than a failed run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The plan's key-template chain does not hold.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The final output key references a binding the caller never supplied.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A stage finished with a non-success outcome.
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Sequences a workflow plan's stages through an injected stage executor.
///
/// The coordinator owns the plan for the duration of a run and halts on the
/// first non-success outcome: no stage after a failed one is ever invoked,
/// and no retries happen at this layer. On success, a stage's produced
/// outputs are assumed present; the next stage's input check doubles as the
/// correctness assertion.
pub struct PipelineCoordinator<E: StageExecutor + ?Sized> {
    executor: Arc<E>,
}

impl<E: StageExecutor + ?Sized> PipelineCoordinator<E> {
    /// Creates a coordinator over an injected executor.
    pub fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    /// Runs every stage of the plan in order.
    ///
    /// # Returns
    ///
    /// The resolved final output key of the last stage on success.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Stage` identifying the first failing stage;
    /// the workflow halts immediately and later stages never run.
    pub async fn run_workflow(
        &self,
        plan: &WorkflowPlan,
        bindings: &Bindings,
    ) -> Result<String, WorkflowError> {
        plan.validate()?;

        info!(
            workflow = plan.name(),
            stages = plan.stages().len(),
            "starting workflow"
        );

        for descriptor in plan.stages() {
            info!(
                workflow = plan.name(),
                stage = %descriptor.name,
                image = %descriptor.image,
                "running stage"
            );

            let outcome = self.executor.run_stage(descriptor, bindings).await;
            if !outcome.is_success() {
                error!(
                    workflow = plan.name(),
                    stage = %descriptor.name,
                    image = %descriptor.image,
                    %outcome,
                    "stage failed; aborting workflow"
                );
                return Err(StageError {
                    stage: descriptor.name.clone(),
                    outcome,
                }
                .into());
            }
        }

        // validate() guarantees the final stage produces an output.
        let final_output = plan.final_output().ok_or(PlanError::NoFinalOutput {
            workflow: plan.name().to_string(),
        })?;
        let final_key = final_output.key.resolve(bindings)?;

        info!(workflow = plan.name(), final_key = %final_key, "workflow complete");
        Ok(final_key)
    }
}
