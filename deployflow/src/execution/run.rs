//! Per-run state and the result handed back to callers.

use crate::config::ProjectDescriptor;
use crate::core::{StageStatus, WorkflowState};
use crate::dag::ExecutionPlan;
use crate::errors::WorkflowExecutionError;
use crate::image::DockerImageRef;
use crate::resolver::StageRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Terminal outcome of one stage task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// 1-based index of the step the stage ran in.
    pub step: usize,
    /// Stage name.
    pub stage: String,
    /// Cluster identifier of the deployed workload.
    pub identifier: String,
    /// `Succeeded` or `Failed`.
    pub status: StageStatus,
    /// Failure reason, if failed.
    pub reason: Option<String>,
    /// Time from submission to terminal status.
    pub duration_ms: f64,
}

impl StageOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn succeeded(
        step: usize,
        stage: impl Into<String>,
        identifier: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            step,
            stage: stage.into(),
            identifier: identifier.into(),
            status: StageStatus::Succeeded,
            reason: None,
            duration_ms,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(
        step: usize,
        stage: impl Into<String>,
        identifier: impl Into<String>,
        reason: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            step,
            stage: stage.into(),
            identifier: identifier.into(),
            status: StageStatus::Failed,
            reason: Some(reason.into()),
            duration_ms,
        }
    }
}

/// Ephemeral context of one workflow run.
///
/// The status map and outcome log are only written by the executor after a
/// step's barrier, so they need no locking. The outcome log holds exactly one
/// entry per stage task. A stage named in several steps runs once per step;
/// its status entry then reports its latest run while the log keeps every run.
#[derive(Debug)]
pub struct WorkflowRun {
    /// Run identifier.
    pub run_id: Uuid,
    /// Target namespace.
    pub namespace: String,
    /// Validated project descriptor.
    pub project: ProjectDescriptor,
    /// Parsed project image.
    pub image: DockerImageRef,
    /// The plan being executed.
    pub plan: ExecutionPlan,
    /// Resolved stages.
    pub registry: StageRegistry,
    state: WorkflowState,
    statuses: HashMap<String, StageStatus>,
    failures: BTreeMap<String, String>,
    outcomes: Vec<StageOutcome>,
    steps_completed: usize,
    started_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Creates a run with every stage `Pending`.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        namespace: impl Into<String>,
        project: ProjectDescriptor,
        image: DockerImageRef,
        plan: ExecutionPlan,
        registry: StageRegistry,
        started_at: DateTime<Utc>,
    ) -> Self {
        let statuses = plan
            .distinct_stage_names()
            .into_iter()
            .map(|name| (name.to_string(), StageStatus::Pending))
            .collect();

        Self {
            run_id,
            namespace: namespace.into(),
            project,
            image,
            plan,
            registry,
            state: WorkflowState::Preflight,
            statuses,
            failures: BTreeMap::new(),
            outcomes: Vec::new(),
            steps_completed: 0,
            started_at,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Moves to `state`. Terminal states are never left.
    pub fn transition(&mut self, state: WorkflowState) {
        if !self.state.is_terminal() {
            tracing::debug!(from = %self.state, to = %state, "Workflow state transition");
            self.state = state;
        }
    }

    /// Status of a stage.
    #[must_use]
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.statuses.get(stage).copied()
    }

    /// Marks the stages of a step as running.
    pub fn mark_running(&mut self, stages: &[String]) {
        for stage in stages {
            self.statuses.insert(stage.clone(), StageStatus::Running);
        }
    }

    /// Records a stage's terminal outcome.
    pub fn record(&mut self, outcome: &StageOutcome) {
        self.statuses.insert(outcome.stage.clone(), outcome.status);
        if let Some(reason) = &outcome.reason {
            self.failures.insert(outcome.stage.clone(), reason.clone());
        }
        self.outcomes.push(outcome.clone());
    }

    /// Records that a step passed its barrier.
    pub fn complete_step(&mut self) {
        self.steps_completed += 1;
    }

    /// Consumes the run into its result.
    #[must_use]
    pub fn finish(self, error: Option<WorkflowExecutionError>) -> WorkflowResult {
        WorkflowResult {
            run_id: self.run_id,
            namespace: self.namespace,
            project: self.project.name,
            state: self.state,
            stage_statuses: self.statuses.into_iter().collect(),
            failures: self.failures,
            outcomes: self.outcomes,
            steps_total: self.plan.len(),
            steps_completed: self.steps_completed,
            started_at: self.started_at,
            finished_at: Utc::now(),
            error,
        }
    }
}

/// Outcome of a workflow run that passed preflight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// Target namespace.
    pub namespace: String,
    /// Project name.
    pub project: String,
    /// Terminal state.
    pub state: WorkflowState,
    /// Final status of every stage, from its latest run.
    pub stage_statuses: BTreeMap<String, StageStatus>,
    /// Failure reason per failed stage.
    pub failures: BTreeMap<String, String>,
    /// Every stage run in completion order, one entry per (step, stage).
    pub outcomes: Vec<StageOutcome>,
    /// Number of steps in the plan.
    pub steps_total: usize,
    /// Number of steps that passed their barrier.
    pub steps_completed: usize,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Why the run failed, if it did.
    #[serde(skip)]
    pub error: Option<WorkflowExecutionError>,
}

impl WorkflowResult {
    /// Whether the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == WorkflowState::Succeeded
    }

    /// Status of a stage.
    #[must_use]
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.stage_statuses.get(stage).copied()
    }

    /// Every run of `stage`, in step order.
    #[must_use]
    pub fn outcomes_for(&self, stage: &str) -> Vec<&StageOutcome> {
        self.outcomes.iter().filter(|o| o.stage == stage).collect()
    }

    /// Names of failed stages, sorted.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.stage_statuses
            .iter()
            .filter(|(_, status)| status.is_failure())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Converts a failed run into its error.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowExecutionError`] if the run did not succeed.
    pub fn into_result(self) -> Result<Self, WorkflowExecutionError> {
        if self.is_success() {
            return Ok(self);
        }
        let failed: Vec<String> = self.failed_stages().into_iter().map(String::from).collect();
        Err(self
            .error
            .unwrap_or_else(|| WorkflowExecutionError::new("workflow did not succeed"))
            .with_failed_stages(failed))
    }
}
