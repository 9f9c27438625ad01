//! Cluster capability consumed by the engine.
//!
//! The engine never talks to a cluster directly. Everything it needs, from
//! namespace lookups to deployments, terminal-status waits and pod logs, goes
//! through [`ClusterApi`], so that any orchestrator client (or the in-memory
//! [`crate::testing::MockCluster`]) can be plugged in.

use crate::config::{BatchStage, ServiceStage};
use crate::core::StageKind;
use crate::errors::ClusterError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

#[allow(clippy::expect_used)]
static INVALID_IDENTIFIER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9-]").expect("identifier pattern is valid"));

/// Builds the cluster-safe identifier `<project>--<stage>` for a stage.
///
/// Lower-cases both parts and replaces any character outside `[a-z0-9-]`
/// (notably `_`) with `-`.
#[must_use]
pub fn stage_identifier(project_name: &str, stage_name: &str) -> String {
    let raw = format!("{project_name}--{stage_name}").to_lowercase();
    INVALID_IDENTIFIER_CHARS.replace_all(&raw, "-").into_owned()
}

/// Everything the cluster needs to place a stage, besides its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Target namespace.
    pub namespace: String,
    /// Cluster-safe identifier of the deployed workload.
    pub identifier: String,
    /// Container image reference.
    pub image: String,
}

/// Reference to a workload submitted to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentHandle {
    /// Namespace the workload lives in.
    pub namespace: String,
    /// Identifier of the workload.
    pub identifier: String,
    /// Name of the stage it was deployed for.
    pub stage: String,
    /// Whether it is a job or a service.
    pub kind: StageKind,
}

/// Terminal status of a deployed workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// A batch job completed successfully.
    Completed,
    /// A service reached readiness.
    Ready,
    /// The workload failed.
    Failed {
        /// Failure signal reported by the cluster.
        reason: String,
    },
    /// The cluster gave up waiting before a terminal state was seen.
    TimedOut,
}

impl TerminalStatus {
    /// Whether the status counts as stage success for the given kind.
    #[must_use]
    pub fn is_success_for(&self, kind: StageKind) -> bool {
        matches!(
            (kind, self),
            (StageKind::Batch, Self::Completed) | (StageKind::Service, Self::Ready)
        )
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Ready => write!(f, "ready"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Operations the engine needs from a container cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Whether `namespace` exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError>;

    /// Submits a run-to-completion job for a batch stage.
    async fn deploy_batch_stage(
        &self,
        request: &DeploymentRequest,
        stage: &BatchStage,
    ) -> Result<DeploymentHandle, ClusterError>;

    /// Submits a long-lived deployment for a service stage.
    async fn deploy_service_stage(
        &self,
        request: &DeploymentRequest,
        stage: &ServiceStage,
    ) -> Result<DeploymentHandle, ClusterError>;

    /// Waits until the workload reaches a terminal status or `deadline`
    /// elapses.
    async fn wait_for_terminal(
        &self,
        handle: &DeploymentHandle,
        deadline: Duration,
    ) -> Result<TerminalStatus, ClusterError>;

    /// Name of the most recent pod backing `identifier`, if any.
    async fn latest_pod_name(
        &self,
        namespace: &str,
        identifier: &str,
    ) -> Result<Option<String>, ClusterError>;

    /// Log text of a pod.
    async fn pod_logs(&self, namespace: &str, pod_name: &str) -> Result<String, ClusterError>;
}
