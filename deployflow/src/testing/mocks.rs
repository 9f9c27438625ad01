//! In-memory cluster for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::cluster::{ClusterApi, DeploymentHandle, DeploymentRequest, TerminalStatus};
use crate::config::{BatchStage, ServiceStage};
use crate::core::StageKind;
use crate::errors::ClusterError;

/// A call received by [`MockCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    /// `namespace_exists(namespace)`.
    NamespaceExists(String),
    /// A batch stage was submitted.
    DeployBatch(String),
    /// A service stage was submitted.
    DeployService(String),
    /// A terminal-status wait returned for the stage.
    WaitFinished(String),
    /// `latest_pod_name(identifier)`.
    LatestPodName(String),
    /// `pod_logs(pod)`.
    PodLogs(String),
}

/// How a mocked stage behaves once submitted.
#[derive(Debug, Clone)]
pub struct MockStageBehavior {
    /// How long `wait_for_terminal` takes.
    pub delay: Duration,
    /// Status returned after the delay; `None` means success for the kind.
    pub status: Option<TerminalStatus>,
    /// Fail the submission itself.
    pub reject_deploy: bool,
}

impl Default for MockStageBehavior {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            status: None,
            reject_deploy: false,
        }
    }
}

/// A cluster that records calls and returns scripted outcomes.
#[derive(Debug, Default)]
pub struct MockCluster {
    namespaces: Mutex<HashSet<String>>,
    behaviors: Mutex<HashMap<String, MockStageBehavior>>,
    pods: Mutex<HashMap<String, String>>,
    logs: Mutex<HashMap<String, String>>,
    fail_pod_lookup: Mutex<bool>,
    calls: Mutex<Vec<ClusterCall>>,
}

impl MockCluster {
    /// Creates an empty cluster with no namespaces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a namespace.
    #[must_use]
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        self.namespaces.lock().insert(namespace.into());
        self
    }

    /// Sets the behavior of a stage.
    #[must_use]
    pub fn with_stage(self, stage: impl Into<String>, behavior: MockStageBehavior) -> Self {
        self.behaviors.lock().insert(stage.into(), behavior);
        self
    }

    /// Makes a stage succeed after `delay`.
    #[must_use]
    pub fn with_stage_delay(self, stage: impl Into<String>, delay: Duration) -> Self {
        self.with_stage(
            stage,
            MockStageBehavior {
                delay,
                ..MockStageBehavior::default()
            },
        )
    }

    /// Makes a stage fail with `reason` after `delay`.
    #[must_use]
    pub fn with_failing_stage(
        self,
        stage: impl Into<String>,
        delay: Duration,
        reason: &str,
    ) -> Self {
        self.with_stage(
            stage,
            MockStageBehavior {
                delay,
                status: Some(TerminalStatus::Failed {
                    reason: reason.to_string(),
                }),
                reject_deploy: false,
            },
        )
    }

    /// Registers a pod and its logs for an identifier.
    #[must_use]
    pub fn with_pod(
        self,
        identifier: impl Into<String>,
        pod_name: impl Into<String>,
        logs: impl Into<String>,
    ) -> Self {
        let pod_name = pod_name.into();
        self.logs.lock().insert(pod_name.clone(), logs.into());
        self.pods.lock().insert(identifier.into(), pod_name);
        self
    }

    /// Makes every pod lookup return an error.
    #[must_use]
    pub fn with_failing_pod_lookup(self) -> Self {
        *self.fail_pod_lookup.lock() = true;
        self
    }

    /// All calls received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().clone()
    }

    /// Number of deployment submissions received.
    #[must_use]
    pub fn deploy_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ClusterCall::DeployBatch(_) | ClusterCall::DeployService(_)))
            .count()
    }

    /// Stages submitted, in submission order.
    #[must_use]
    pub fn deployed_stages(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ClusterCall::DeployBatch(s) | ClusterCall::DeployService(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call equal to `call`.
    #[must_use]
    pub fn position(&self, call: &ClusterCall) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    fn record(&self, call: ClusterCall) {
        self.calls.lock().push(call);
    }

    fn behavior(&self, stage: &str) -> MockStageBehavior {
        self.behaviors.lock().get(stage).cloned().unwrap_or_default()
    }

    fn submit(
        &self,
        request: &DeploymentRequest,
        stage: &str,
        kind: StageKind,
    ) -> Result<DeploymentHandle, ClusterError> {
        let call = match kind {
            StageKind::Batch => ClusterCall::DeployBatch(stage.to_string()),
            StageKind::Service => ClusterCall::DeployService(stage.to_string()),
        };
        self.record(call);

        if self.behavior(stage).reject_deploy {
            return Err(ClusterError::new("deploy", format!("{} rejected", request.identifier)));
        }

        Ok(DeploymentHandle {
            namespace: request.namespace.clone(),
            identifier: request.identifier.clone(),
            stage: stage.to_string(),
            kind,
        })
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        self.record(ClusterCall::NamespaceExists(namespace.to_string()));
        Ok(self.namespaces.lock().contains(namespace))
    }

    async fn deploy_batch_stage(
        &self,
        request: &DeploymentRequest,
        stage: &BatchStage,
    ) -> Result<DeploymentHandle, ClusterError> {
        self.submit(request, &stage.name, StageKind::Batch)
    }

    async fn deploy_service_stage(
        &self,
        request: &DeploymentRequest,
        stage: &ServiceStage,
    ) -> Result<DeploymentHandle, ClusterError> {
        self.submit(request, &stage.name, StageKind::Service)
    }

    async fn wait_for_terminal(
        &self,
        handle: &DeploymentHandle,
        deadline: Duration,
    ) -> Result<TerminalStatus, ClusterError> {
        let behavior = self.behavior(&handle.stage);
        if behavior.delay > deadline {
            tokio::time::sleep(deadline).await;
            self.record(ClusterCall::WaitFinished(handle.stage.clone()));
            return Ok(TerminalStatus::TimedOut);
        }

        tokio::time::sleep(behavior.delay).await;
        self.record(ClusterCall::WaitFinished(handle.stage.clone()));

        Ok(behavior.status.unwrap_or(match handle.kind {
            StageKind::Batch => TerminalStatus::Completed,
            StageKind::Service => TerminalStatus::Ready,
        }))
    }

    async fn latest_pod_name(
        &self,
        _namespace: &str,
        identifier: &str,
    ) -> Result<Option<String>, ClusterError> {
        self.record(ClusterCall::LatestPodName(identifier.to_string()));
        if *self.fail_pod_lookup.lock() {
            return Err(ClusterError::new("latest_pod_name", "api server unavailable"));
        }
        Ok(self.pods.lock().get(identifier).cloned())
    }

    async fn pod_logs(&self, _namespace: &str, pod_name: &str) -> Result<String, ClusterError> {
        self.record(ClusterCall::PodLogs(pod_name.to_string()));
        self.logs
            .lock()
            .get(pod_name)
            .cloned()
            .ok_or_else(|| ClusterError::new("pod_logs", format!("pod {pod_name} not found")))
    }
}
