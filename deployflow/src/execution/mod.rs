//! Workflow execution.
//!
//! [`WorkflowExecutor`] owns the run lifecycle: preflight checks, then
//! step-by-step deployment with a join-all barrier between steps.

mod executor;
mod run;
mod task_group;

#[cfg(test)]
mod integration_tests;

pub use executor::{ProjectLogging, WorkflowExecutor};
pub use run::{StageOutcome, WorkflowResult, WorkflowRun};
pub use task_group::StageTaskGroup;
