//! Workflow planning and coordination.
//!
//! A workflow is one end-to-end ordered sequence of stages satisfying one
//! caller request. This module provides:
//!
//! - **Plan**: an ordered sequence of stage descriptors whose key templates
//!   must chain (each stage's inputs satisfied by earlier outputs or by
//!   externally provided keys)
//! - **Coordinator**: sequences the plan's stages, halting on the first
//!   non-success outcome and surfacing which stage failed
//! - **Workflows**: the three concrete plans — model generation, preview
//!   generation, and try-on
//!
//! # Workflow Flow
//!
//! 1. The caller establishes one unique folder id and uploads its inputs
//! 2. The coordinator validates the plan and runs each stage in order
//! 3. Each stage reads and writes the shared object store; keys are the
//!    only integration surface between stages
//! 4. Control returns once the chain succeeds or one stage fails
//!
//! # Example
//!
//! ```rust,ignore
//! use virtufit::pipeline::{workflows, PipelineCoordinator};
//!
//! let plan = workflows::model_generation_plan(&config);
//! let bindings = workflows::model_bindings(&folder_id, ".jpg", Gender::Female);
//!
//! let coordinator = PipelineCoordinator::new(runner);
//! let smooth_obj_key = coordinator.run_workflow(&plan, &bindings).await?;
//! ```

pub mod coordinator;
pub mod plan;
pub mod workflows;

// Re-export main types for convenience
pub use coordinator::{PipelineCoordinator, WorkflowError};
pub use plan::{PlanError, WorkflowPlan};
