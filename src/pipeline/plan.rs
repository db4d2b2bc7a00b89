//! Workflow plans: ordered stage sequences with chained key templates.

use thiserror::Error;

use crate::stage::descriptor::{StageDescriptor, StageOutput};

/// Errors raised while validating a workflow plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The plan contains no stages.
    #[error("workflow '{workflow}' has no stages")]
    Empty { workflow: String },

    /// A stage requires a key no earlier stage produces and the caller
    /// does not provide.
    #[error(
        "stage '{stage}' input '{input}' is not produced by an earlier stage or provided externally"
    )]
    UnsatisfiedInput { stage: String, input: String },

    /// The final stage produces nothing, so the workflow has no result key.
    #[error("workflow '{workflow}' produces no final output")]
    NoFinalOutput { workflow: String },
}

/// An ordered sequence of stage descriptors plus the set of key templates
/// the caller provides up front (uploaded photos, catalog entries).
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    name: String,
    stages: Vec<StageDescriptor>,
    external_inputs: Vec<String>,
}

impl WorkflowPlan {
    /// Creates an empty plan.
    pub fn new<I, S>(name: impl Into<String>, external_inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            stages: Vec::new(),
            external_inputs: external_inputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends a stage, builder-style.
    pub fn with_stage(mut self, stage: StageDescriptor) -> Self {
        self.stages.push(stage);
        self
    }

    /// The workflow name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// The output of the final stage: the workflow's result key.
    pub fn final_output(&self) -> Option<&StageOutput> {
        self.stages.last().and_then(|s| s.produced_outputs.last())
    }

    /// Validates the key-template chain.
    ///
    /// Every stage's required input templates must be satisfied, by
    /// syntactic template equality, by an earlier stage's produced outputs
    /// or by the externally provided keys. This catches a mis-ordered or
    /// mis-keyed plan at construction time rather than as a spurious
    /// input-missing failure mid-workflow.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.stages.is_empty() {
            return Err(PlanError::Empty {
                workflow: self.name.clone(),
            });
        }

        let mut available: Vec<&str> = self
            .external_inputs
            .iter()
            .map(String::as_str)
            .collect();

        for stage in &self.stages {
            for input in &stage.required_inputs {
                if !available.contains(&input.key.as_str()) {
                    return Err(PlanError::UnsatisfiedInput {
                        stage: stage.name.clone(),
                        input: input.key.as_str().to_string(),
                    });
                }
            }
            available.extend(stage.produced_outputs.iter().map(|o| o.key.as_str()));
        }

        if self.final_output().is_none() {
            return Err(PlanError::NoFinalOutput {
                workflow: self.name.clone(),
            });
        }

        Ok(())
    }
}
