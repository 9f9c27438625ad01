//! The workflow executor.
//!
//! A run moves through `Preflight -> Executing -> Succeeded | Failed`.
//! Preflight checks run in a fixed order and any failure aborts before the
//! cluster is touched. Execution deploys one plan step at a time: every
//! stage of the step runs as its own task, the step joins all of them, and
//! only then is the next step started. A failed stage stops later steps but
//! never cancels its siblings or anything already submitted.

use super::run::{StageOutcome, WorkflowResult, WorkflowRun};
use super::task_group::StageTaskGroup;
use crate::cluster::{stage_identifier, ClusterApi, DeploymentRequest, TerminalStatus};
use crate::config::{ExecutorConfig, ImageCheckPolicy, ProjectDescriptor, StageDescriptor};
use crate::core::{LogLevel, StageStatus, WorkflowState};
use crate::dag::{DagParser, Step};
use crate::errors::{DeployflowError, WorkflowExecutionError};
use crate::events::{EventSink, NoOpEventSink, WorkflowEvent};
use crate::image::DockerImageValidator;
use crate::logs::LogReporter;
use crate::observability::{project_dispatch, stage_span, workflow_span};
use crate::resolver::StageResolver;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn, Dispatch, Instrument};
use uuid::Uuid;

/// Builds the dispatcher a run logs through, from the project's log level.
pub type ProjectLogging = Arc<dyn Fn(LogLevel) -> Dispatch + Send + Sync>;

/// Runs workflows against a cluster.
#[derive(Clone)]
pub struct WorkflowExecutor {
    cluster: Arc<dyn ClusterApi>,
    images: DockerImageValidator,
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
    logs: LogReporter,
    parser: DagParser,
    resolver: StageResolver,
    project_logging: Option<ProjectLogging>,
}

impl WorkflowExecutor {
    /// Creates an executor with default configuration and no event sink.
    ///
    /// Runs log to stderr at their project's log level; see
    /// [`WorkflowExecutor::without_project_logging`].
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, images: DockerImageValidator) -> Self {
        Self {
            logs: LogReporter::new(cluster.clone()),
            cluster,
            images,
            config: ExecutorConfig::default(),
            events: Arc::new(NoOpEventSink),
            parser: DagParser::new(),
            resolver: StageResolver::new(),
            project_logging: Some(Arc::new(project_dispatch)),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets how a run's dispatcher is built from the project's log level.
    #[must_use]
    pub fn with_project_logging<F>(mut self, dispatch_for: F) -> Self
    where
        F: Fn(LogLevel) -> Dispatch + Send + Sync + 'static,
    {
        self.project_logging = Some(Arc::new(dispatch_for));
        self
    }

    /// Logs through the caller's subscriber and ignores the project's level.
    #[must_use]
    pub fn without_project_logging(mut self) -> Self {
        self.project_logging = None;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the project at `project_root` in `namespace`.
    ///
    /// Once the project descriptor is loaded, everything the run logs goes
    /// through a dispatcher built for the project's log level.
    ///
    /// Returns `Ok` once preflight has passed, whatever the outcome of the
    /// steps; inspect [`WorkflowResult::state`] or call
    /// [`WorkflowResult::into_result`].
    ///
    /// # Errors
    ///
    /// Returns the first preflight failure, in check order: project
    /// descriptor, DAG, stage resolution, namespace, image format, registry.
    pub async fn run(
        &self,
        namespace: &str,
        project_root: &Path,
    ) -> Result<WorkflowResult, DeployflowError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        self.events.emit(&WorkflowEvent::WorkflowStarted {
            run_id: run_id.to_string(),
            namespace: namespace.to_string(),
        });

        let project = match ProjectDescriptor::load(project_root) {
            Ok(project) => project,
            Err(e) => return Err(self.preflight_failed(e.into())),
        };
        let level = project.log_level;
        let run = self.run_project(run_id, namespace, project_root, project, started_at, start);

        match &self.project_logging {
            Some(dispatch_for) => {
                let dispatch = dispatch_for(level);
                let span = tracing::dispatcher::with_default(&dispatch, || {
                    workflow_span(&run_id.to_string(), namespace)
                });
                run.instrument(span).with_subscriber(dispatch).await
            }
            None => run.instrument(workflow_span(&run_id.to_string(), namespace)).await,
        }
    }

    async fn run_project(
        &self,
        run_id: Uuid,
        namespace: &str,
        project_root: &Path,
        project: ProjectDescriptor,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> Result<WorkflowResult, DeployflowError> {
        info!(
            project_root = %project_root.display(),
            project = %project.name,
            log_level = %project.log_level,
            "Starting workflow"
        );

        let mut run = match self
            .preflight(run_id, namespace, project_root, project, started_at)
            .await
        {
            Ok(run) => run,
            Err(e) => return Err(self.preflight_failed(e)),
        };

        self.events.emit(&WorkflowEvent::PreflightPassed {
            project: run.project.name.clone(),
            steps: run.plan.len(),
        });
        run.transition(WorkflowState::Executing);

        match self.execute(&mut run).await {
            Ok(()) => {
                run.transition(WorkflowState::Succeeded);
                info!(project = %run.project.name, "Workflow succeeded");
                self.events.emit(&WorkflowEvent::WorkflowSucceeded {
                    duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                });
                Ok(run.finish(None))
            }
            Err(e) => {
                run.transition(WorkflowState::Failed);
                error!(project = %run.project.name, error = %e, "Workflow failed");
                self.events.emit(&WorkflowEvent::WorkflowFailed {
                    reason: e.to_string(),
                });
                Ok(run.finish(Some(e)))
            }
        }
    }

    fn preflight_failed(&self, e: DeployflowError) -> DeployflowError {
        error!(error = %e, kind = e.kind(), "Preflight failed");
        self.events.emit(&WorkflowEvent::WorkflowFailed {
            reason: e.to_string(),
        });
        e
    }

    /// Runs the remaining preflight checks in order and builds the run context.
    async fn preflight(
        &self,
        run_id: Uuid,
        namespace: &str,
        project_root: &Path,
        project: ProjectDescriptor,
        started_at: DateTime<Utc>,
    ) -> Result<WorkflowRun, DeployflowError> {
        let plan = self.parser.parse(&project.dag_expression)?;
        let registry = self.resolver.resolve(&plan, project_root)?;
        info!(steps = plan.len(), stages = registry.len(), plan = %plan, "Resolved workflow");

        let exists = self.cluster.namespace_exists(namespace).await.map_err(|e| {
            WorkflowExecutionError::new(format!("cannot check namespace {namespace}: {e}"))
        })?;
        if !exists {
            return Err(WorkflowExecutionError::invalid_namespace(namespace).into());
        }

        let image = self.images.parse_ref(&project.image)?;
        if !self.images.exists_in_registry(&image).await? {
            match self.config.image_check_policy {
                ImageCheckPolicy::Abort => {
                    return Err(WorkflowExecutionError::new(format!(
                        "docker image {image} does not exist in the registry"
                    ))
                    .into());
                }
                ImageCheckPolicy::Warn => {
                    warn!(image = %image, "Docker image not found in registry; continuing");
                }
            }
        }

        Ok(WorkflowRun::new(run_id, namespace, project, image, plan, registry, started_at))
    }

    /// Executes plan steps in order, stopping after the first failed step.
    async fn execute(&self, run: &mut WorkflowRun) -> Result<(), WorkflowExecutionError> {
        let steps: Vec<Step> = run.plan.steps().to_vec();

        for (idx, step) in steps.iter().enumerate() {
            let step_index = idx + 1;
            info!(step = step_index, stages = %step, "Starting step");
            self.events.emit(&WorkflowEvent::StepStarted {
                step: step_index,
                stages: step.stages().to_vec(),
            });

            run.mark_running(step.stages());
            let outcomes = self.execute_step(run, step_index, step).await?;

            let mut failed = Vec::new();
            for outcome in &outcomes {
                run.record(outcome);
                if outcome.status == StageStatus::Failed {
                    failed.push(outcome.stage.clone());
                }
            }

            if self.config.print_stage_logs {
                for outcome in &outcomes {
                    self.logs.print_logs(&run.namespace, &outcome.identifier).await;
                }
            }

            self.events.emit(&WorkflowEvent::StepCompleted {
                step: step_index,
                success: failed.is_empty(),
            });

            if !failed.is_empty() {
                return Err(WorkflowExecutionError::new(format!(
                    "stage(s) {} failed in step {step_index}",
                    failed.join(", ")
                ))
                .with_failed_stages(failed));
            }
            run.complete_step();
        }

        Ok(())
    }

    /// Deploys every stage of a step concurrently and waits for all of them.
    async fn execute_step(
        &self,
        run: &WorkflowRun,
        step_index: usize,
        step: &Step,
    ) -> Result<Vec<StageOutcome>, WorkflowExecutionError> {
        let mut group = StageTaskGroup::new();
        let mut identifiers = Vec::with_capacity(step.len());

        for name in step.stages() {
            let stage = run.registry.get(name).cloned().ok_or_else(|| {
                WorkflowExecutionError::new(format!("stage {name} missing from registry"))
            })?;
            let identifier = stage_identifier(&run.project.name, name);
            let request = DeploymentRequest {
                namespace: run.namespace.clone(),
                identifier: identifier.clone(),
                image: run.image.to_string(),
            };
            let deadline = self.config.stage_deadline(&stage);

            self.events.emit(&WorkflowEvent::StageStarted {
                step: step_index,
                stage: name.clone(),
                identifier: identifier.clone(),
            });

            let span = stage_span(step_index, name, &identifier);
            group.spawn(
                name.clone(),
                run_stage(self.cluster.clone(), step_index, request, stage, deadline)
                    .instrument(span)
                    .with_current_subscriber(),
            );
            identifiers.push(identifier);
        }

        let mut outcomes = Vec::with_capacity(group.task_count());
        for ((name, joined), identifier) in group.join_all().await.into_iter().zip(identifiers) {
            let outcome = joined.unwrap_or_else(|e| {
                let reason = format!("stage task aborted: {e}");
                StageOutcome::failed(step_index, &name, &identifier, reason, 0.0)
            });

            match &outcome.reason {
                None => self.events.emit(&WorkflowEvent::StageSucceeded {
                    step: step_index,
                    stage: name,
                    duration_ms: outcome.duration_ms,
                }),
                Some(reason) => self.events.emit(&WorkflowEvent::StageFailed {
                    step: step_index,
                    stage: name,
                    reason: reason.clone(),
                }),
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("config", &self.config)
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

/// Submits one stage and waits for its terminal status within `deadline`.
///
/// The deadline bounds the wait only; hitting it drops the wait but leaves
/// the submitted workload running.
async fn run_stage(
    cluster: Arc<dyn ClusterApi>,
    step: usize,
    request: DeploymentRequest,
    stage: Arc<StageDescriptor>,
    deadline: Duration,
) -> StageOutcome {
    let start = Instant::now();
    let elapsed_ms = || start.elapsed().as_secs_f64() * 1000.0;
    let name = stage.name();
    let kind = stage.kind();

    let submitted = match stage.as_ref() {
        StageDescriptor::Batch(batch) => cluster.deploy_batch_stage(&request, batch).await,
        StageDescriptor::Service(service) => cluster.deploy_service_stage(&request, service).await,
    };
    let handle = match submitted {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Stage submission failed");
            let reason = e.to_string();
            return StageOutcome::failed(step, name, &request.identifier, reason, elapsed_ms());
        }
    };
    info!(kind = %kind, deadline_secs = deadline.as_secs_f64(), "Stage submitted");

    let timed_out = || format!("timed out after {:.1}s", deadline.as_secs_f64());
    let waited = tokio::time::timeout(deadline, cluster.wait_for_terminal(&handle, deadline)).await;

    match waited {
        Ok(Ok(status)) if status.is_success_for(kind) => {
            info!(status = %status, "Stage succeeded");
            StageOutcome::succeeded(step, name, &request.identifier, elapsed_ms())
        }
        Ok(Ok(TerminalStatus::TimedOut)) | Err(_) => {
            warn!("Stage exceeded its deadline");
            StageOutcome::failed(step, name, &request.identifier, timed_out(), elapsed_ms())
        }
        Ok(Ok(status)) => {
            warn!(status = %status, "Stage failed");
            let reason = status.to_string();
            StageOutcome::failed(step, name, &request.identifier, reason, elapsed_ms())
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Waiting for stage failed");
            let reason = e.to_string();
            StageOutcome::failed(step, name, &request.identifier, reason, elapsed_ms())
        }
    }
}
