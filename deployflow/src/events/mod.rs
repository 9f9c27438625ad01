//! Workflow lifecycle events.
//!
//! The executor reports every state transition through an [`EventSink`] so
//! that callers can log, collect or forward them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};

/// A lifecycle event emitted by the workflow executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run entered preflight.
    WorkflowStarted {
        /// Run identifier.
        run_id: String,
        /// Target namespace.
        namespace: String,
    },
    /// Every preflight check passed.
    PreflightPassed {
        /// Project name.
        project: String,
        /// Number of plan steps.
        steps: usize,
    },
    /// A plan step began deploying.
    StepStarted {
        /// 1-based step index.
        step: usize,
        /// Stages in the step.
        stages: Vec<String>,
    },
    /// A stage was handed to its task.
    StageStarted {
        /// 1-based step index.
        step: usize,
        /// Stage name.
        stage: String,
        /// Cluster identifier.
        identifier: String,
    },
    /// A stage completed or became ready.
    StageSucceeded {
        /// 1-based step index.
        step: usize,
        /// Stage name.
        stage: String,
        /// Time from submission to terminal status.
        duration_ms: f64,
    },
    /// A stage failed, timed out or was rejected.
    StageFailed {
        /// 1-based step index.
        step: usize,
        /// Stage name.
        stage: String,
        /// Failure reason.
        reason: String,
    },
    /// Every stage of a step reached a terminal state.
    StepCompleted {
        /// 1-based step index.
        step: usize,
        /// Whether every stage succeeded.
        success: bool,
    },
    /// The run succeeded.
    WorkflowSucceeded {
        /// Total run time.
        duration_ms: f64,
    },
    /// The run failed.
    WorkflowFailed {
        /// Failure reason.
        reason: String,
    },
}

impl WorkflowEvent {
    /// Dotted event type, e.g. `stage.failed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::PreflightPassed { .. } => "workflow.preflight_passed",
            Self::StepStarted { .. } => "step.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageSucceeded { .. } => "stage.succeeded",
            Self::StageFailed { .. } => "stage.failed",
            Self::StepCompleted { .. } => "step.completed",
            Self::WorkflowSucceeded { .. } => "workflow.succeeded",
            Self::WorkflowFailed { .. } => "workflow.failed",
        }
    }

    /// Whether the event reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::StageFailed { .. }
                | Self::WorkflowFailed { .. }
                | Self::StepCompleted { success: false, .. }
        )
    }

    /// The event as a JSON payload.
    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
