//! Error types for the deployflow engine.
//!
//! Each preflight check and the execution phase has its own error type so that
//! callers can match on the failure and always recover the offending
//! identifier (field name, step index, stage name, image string, namespace).

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// The project descriptor is missing or has an invalid field.
    #[error("{0}")]
    ProjectConfig(#[from] ProjectConfigError),

    /// The DAG expression could not be parsed.
    #[error("{0}")]
    MalformedDag(#[from] MalformedDagError),

    /// A stage referenced by the DAG could not be resolved.
    #[error("{0}")]
    UnresolvedStage(#[from] UnresolvedStageError),

    /// The docker image reference is malformed.
    #[error("{0}")]
    InvalidImageFormat(#[from] InvalidImageFormatError),

    /// The image registry could not be reached.
    #[error("{0}")]
    RegistryUnreachable(#[from] RegistryUnreachableError),

    /// The workflow could not be executed.
    #[error("{0}")]
    WorkflowExecution(#[from] WorkflowExecutionError),
}

impl DeployflowError {
    /// Returns a short, stable name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectConfig(_) => "ProjectConfigError",
            Self::MalformedDag(_) => "MalformedDagError",
            Self::UnresolvedStage(_) => "UnresolvedStageError",
            Self::InvalidImageFormat(_) => "InvalidImageFormatError",
            Self::RegistryUnreachable(_) => "RegistryUnreachableError",
            Self::WorkflowExecution(_) => "WorkflowExecutionError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised when the project descriptor fails validation.
///
/// Only the first invalid field, in the order name, image, dag, log level,
/// is ever reported.
#[derive(Debug, Clone, Error)]
#[error("invalid {field} in {}: {reason}", path.display())]
pub struct ProjectConfigError {
    /// The descriptor key that failed validation.
    pub field: String,
    /// Why the field is invalid.
    pub reason: String,
    /// The descriptor file.
    pub path: PathBuf,
}

impl ProjectConfigError {
    /// Creates a new project config error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        reason: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            path: path.into(),
        }
    }
}

/// Error raised when a DAG expression contains an empty stage token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("null stages found in step {step_index} of DAG expression '{expression}'")]
pub struct MalformedDagError {
    /// 1-based index of the offending step.
    pub step_index: usize,
    /// The raw expression.
    pub expression: String,
}

impl MalformedDagError {
    /// Creates a new malformed DAG error.
    #[must_use]
    pub fn new(step_index: usize, expression: impl Into<String>) -> Self {
        Self {
            step_index,
            expression: expression.into(),
        }
    }
}

/// Error raised when a stage name cannot be mapped to a stage descriptor.
#[derive(Debug, Clone, Error)]
#[error("cannot resolve stage '{stage}': {reason}")]
pub struct UnresolvedStageError {
    /// The stage that failed to resolve.
    pub stage: String,
    /// Why it failed.
    pub reason: String,
}

impl UnresolvedStageError {
    /// Creates a new unresolved stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a docker image string is not `<namespace>/<name>[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid docker image '{raw}': {reason}")]
pub struct InvalidImageFormatError {
    /// The raw image string.
    pub raw: String,
    /// What is wrong with it.
    pub reason: String,
}

impl InvalidImageFormatError {
    /// Creates a new invalid image format error.
    #[must_use]
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when the registry existence query fails at transport level.
#[derive(Debug, Error)]
#[error("cannot connect to {url}: {cause}")]
pub struct RegistryUnreachableError {
    /// The URL that was queried.
    pub url: String,
    /// The underlying cause.
    #[source]
    pub cause: anyhow::Error,
}

impl RegistryUnreachableError {
    /// Creates a new registry unreachable error.
    #[must_use]
    pub fn new(url: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }
}

/// Umbrella error for namespace, image and stage failures of a workflow run.
#[derive(Debug, Clone, Error)]
#[error("workflow execution failed: {reason}")]
pub struct WorkflowExecutionError {
    /// Human-readable reason, always naming the offending identifier.
    pub reason: String,
    /// Stages that failed, if the error arose during execution.
    pub failed_stages: Vec<String>,
}

impl WorkflowExecutionError {
    /// Creates a new workflow execution error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            failed_stages: Vec::new(),
        }
    }

    /// Sets the failed stages.
    #[must_use]
    pub fn with_failed_stages(mut self, stages: Vec<String>) -> Self {
        self.failed_stages = stages;
        self
    }

    /// Error for a namespace that does not exist on the cluster.
    #[must_use]
    pub fn invalid_namespace(namespace: &str) -> Self {
        Self::new(format!("{namespace} is not a valid namespace"))
    }
}

/// Error returned by a cluster capability call.
#[derive(Debug, Error)]
#[error("cluster request '{operation}' failed: {message}")]
pub struct ClusterError {
    /// The capability operation that failed.
    pub operation: String,
    /// Description of the failure.
    pub message: String,
    /// The underlying cause, if any.
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ClusterError {
    /// Creates a new cluster error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_config_error_names_field() {
        let err = ProjectConfigError::new("name", "missing", "/tmp/deployflow.toml");
        let msg = err.to_string();
        assert!(msg.contains("invalid name"));
        assert!(msg.contains("/tmp/deployflow.toml"));
    }

    #[test]
    fn test_malformed_dag_error_cites_step() {
        let err = MalformedDagError::new(2, "a >> ,b");
        assert!(err.to_string().contains("null stages found in step 2"));
    }

    #[test]
    fn test_invalid_namespace_message() {
        let err = WorkflowExecutionError::invalid_namespace("foo_bar");
        assert!(err.to_string().contains("foo_bar is not a valid namespace"));
    }

    #[test]
    fn test_registry_unreachable_keeps_source() {
        let err = RegistryUnreachableError::new(
            "https://hub.docker.com",
            anyhow::anyhow!("connection refused"),
        );
        assert!(err.to_string().contains("cannot connect to"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_kind_and_dict() {
        let err: DeployflowError = UnresolvedStageError::new("stage_2", "missing directory").into();
        assert_eq!(err.kind(), "UnresolvedStageError");

        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "UnresolvedStageError");
        assert!(dict
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("stage_2"));
    }
}
