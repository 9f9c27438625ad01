//! Stage descriptor loading.
//!
//! Each stage lives in its own directory under the project root and carries a
//! `config.toml` declaring its kind plus the kind-specific deploy parameters.

use super::STAGE_CONFIG_FILENAME;
use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Reasons a stage descriptor cannot be loaded.
#[derive(Debug, Clone, Error)]
pub enum StageConfigError {
    /// The stage directory does not exist.
    #[error("stage directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    /// The descriptor file is absent.
    #[error("{} not found", .0.display())]
    MissingFile(PathBuf),

    /// The descriptor file could not be read or parsed.
    #[error("cannot parse {}: {message}", path.display())]
    Parse {
        /// The descriptor file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The declared kind is not batch or service.
    #[error("{0}")]
    UnknownKind(String),

    /// A required key or table is missing or has an invalid value.
    #[error("invalid {key}: {message}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl StageConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Resource parameters shared by both stage kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResources {
    /// Module executed inside the container.
    pub executable_module: String,
    /// CPU request in cores.
    pub cpu_request: f64,
    /// Memory request in megabytes.
    pub memory_request_mb: u64,
    /// Environment variable name to cluster secret name.
    pub secrets: BTreeMap<String, String>,
}

/// A run-to-completion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStage {
    /// Stage name (the directory name).
    pub name: String,
    /// The stage directory.
    pub source_directory: PathBuf,
    /// Resource parameters.
    pub resources: StageResources,
    /// Maximum time to reach completion, if declared.
    pub max_completion_time: Option<Duration>,
    /// Number of retries the cluster is allowed before the job fails.
    pub retries: u32,
}

/// A long-lived stage that must become ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStage {
    /// Stage name (the directory name).
    pub name: String,
    /// The stage directory.
    pub source_directory: PathBuf,
    /// Resource parameters.
    pub resources: StageResources,
    /// Maximum time to become ready, if declared.
    pub max_startup_time: Option<Duration>,
    /// Number of replicas.
    pub replicas: u32,
    /// Port the service listens on.
    pub port: u16,
}

/// A resolved stage, batch or service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageDescriptor {
    /// A run-to-completion job.
    Batch(BatchStage),
    /// A long-lived service.
    Service(ServiceStage),
}

impl StageDescriptor {
    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Batch(stage) => &stage.name,
            Self::Service(stage) => &stage.name,
        }
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Batch(_) => StageKind::Batch,
            Self::Service(_) => StageKind::Service,
        }
    }

    /// Returns the stage directory.
    #[must_use]
    pub fn source_directory(&self) -> &Path {
        match self {
            Self::Batch(stage) => &stage.source_directory,
            Self::Service(stage) => &stage.source_directory,
        }
    }

    /// Returns the resource parameters.
    #[must_use]
    pub fn resources(&self) -> &StageResources {
        match self {
            Self::Batch(stage) => &stage.resources,
            Self::Service(stage) => &stage.resources,
        }
    }

    /// The deadline declared by the stage itself, if any.
    #[must_use]
    pub fn declared_deadline(&self) -> Option<Duration> {
        match self {
            Self::Batch(stage) => stage.max_completion_time,
            Self::Service(stage) => stage.max_startup_time,
        }
    }

    /// Loads the descriptor for stage `name` from `stage_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StageConfigError`] if the directory or file is missing, the
    /// file cannot be parsed, or its kind or parameters are invalid.
    pub fn load(name: &str, stage_dir: &Path) -> Result<Self, StageConfigError> {
        if !stage_dir.is_dir() {
            return Err(StageConfigError::MissingDirectory(stage_dir.to_path_buf()));
        }

        let path = stage_dir.join(STAGE_CONFIG_FILENAME);
        if !path.is_file() {
            return Err(StageConfigError::MissingFile(path));
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| StageConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(name, stage_dir, &contents)
    }

    /// Parses descriptor contents for stage `name` located in `stage_dir`.
    ///
    /// # Errors
    ///
    /// See [`StageDescriptor::load`].
    pub fn from_toml_str(
        name: &str,
        stage_dir: &Path,
        contents: &str,
    ) -> Result<Self, StageConfigError> {
        let raw: RawStageFile = toml::from_str(contents).map_err(|e| StageConfigError::Parse {
            path: stage_dir.join(STAGE_CONFIG_FILENAME),
            message: e.to_string(),
        })?;
        raw.into_descriptor(name, stage_dir)
    }
}

#[derive(Debug, Deserialize)]
struct RawStageFile {
    stage: RawStageSection,
    batch: Option<RawBatchSection>,
    service: Option<RawServiceSection>,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawStageSection {
    kind: String,
    executable_module: Option<String>,
    cpu_request: Option<f64>,
    memory_request_mb: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawBatchSection {
    max_completion_time_seconds: Option<u64>,
    #[serde(default = "default_retries")]
    retries: u32,
}

#[derive(Debug, Deserialize)]
struct RawServiceSection {
    max_startup_time_seconds: Option<u64>,
    replicas: u32,
    port: u16,
}

fn default_retries() -> u32 {
    1
}

impl RawStageFile {
    fn into_descriptor(
        self,
        name: &str,
        stage_dir: &Path,
    ) -> Result<StageDescriptor, StageConfigError> {
        let kind: StageKind = self.stage.kind.parse().map_err(StageConfigError::UnknownKind)?;
        let resources = self.stage.into_resources(self.secrets)?;

        match kind {
            StageKind::Batch => {
                let batch = self
                    .batch
                    .ok_or_else(|| StageConfigError::invalid("batch", "section is missing"))?;
                Ok(StageDescriptor::Batch(BatchStage {
                    name: name.to_string(),
                    source_directory: stage_dir.to_path_buf(),
                    resources,
                    max_completion_time: positive_seconds(
                        "max_completion_time_seconds",
                        batch.max_completion_time_seconds,
                    )?,
                    retries: batch.retries,
                }))
            }
            StageKind::Service => {
                let service = self
                    .service
                    .ok_or_else(|| StageConfigError::invalid("service", "section is missing"))?;
                if service.replicas == 0 {
                    return Err(StageConfigError::invalid("replicas", "must be at least 1"));
                }
                if service.port == 0 {
                    return Err(StageConfigError::invalid("port", "must be between 1 and 65535"));
                }
                Ok(StageDescriptor::Service(ServiceStage {
                    name: name.to_string(),
                    source_directory: stage_dir.to_path_buf(),
                    resources,
                    max_startup_time: positive_seconds(
                        "max_startup_time_seconds",
                        service.max_startup_time_seconds,
                    )?,
                    replicas: service.replicas,
                    port: service.port,
                }))
            }
        }
    }
}

impl RawStageSection {
    fn into_resources(
        self,
        secrets: BTreeMap<String, String>,
    ) -> Result<StageResources, StageConfigError> {
        let executable_module = self
            .executable_module
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| StageConfigError::invalid("executable_module", "value is missing"))?;

        let cpu_request = self
            .cpu_request
            .ok_or_else(|| StageConfigError::invalid("cpu_request", "value is missing"))?;
        if !(cpu_request.is_finite() && cpu_request > 0.0) {
            return Err(StageConfigError::invalid("cpu_request", "must be greater than zero"));
        }

        let memory_request_mb = match self.memory_request_mb {
            Some(0) => {
                return Err(StageConfigError::invalid(
                    "memory_request_mb",
                    "must be greater than zero",
                ))
            }
            Some(mb) => mb,
            None => return Err(StageConfigError::invalid("memory_request_mb", "value is missing")),
        };

        Ok(StageResources {
            executable_module,
            cpu_request,
            memory_request_mb,
            secrets,
        })
    }
}

fn positive_seconds(key: &str, value: Option<u64>) -> Result<Option<Duration>, StageConfigError> {
    match value {
        Some(0) => Err(StageConfigError::invalid(key, "must be greater than zero")),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"
[stage]
kind = "batch"
executable_module = "stage_1.py"
cpu_request = 0.5
memory_request_mb = 100

[batch]
max_completion_time_seconds = 30
retries = 2
"#;

    const SERVICE: &str = r#"
[stage]
kind = "service"
executable_module = "serve.py"
cpu_request = 0.25
memory_request_mb = 64

[service]
replicas = 2
port = 5000

[secrets]
USERNAME = "test-credentials"
"#;

    fn parse(contents: &str) -> Result<StageDescriptor, StageConfigError> {
        StageDescriptor::from_toml_str("stage", Path::new("/project/stage"), contents)
    }

    #[test]
    fn test_parses_batch_stage() {
        let stage = parse(BATCH).unwrap();
        assert_eq!(stage.kind(), StageKind::Batch);
        assert_eq!(stage.declared_deadline(), Some(Duration::from_secs(30)));

        let StageDescriptor::Batch(batch) = stage else {
            panic!("expected batch stage");
        };
        assert_eq!(batch.retries, 2);
        assert_eq!(batch.resources.executable_module, "stage_1.py");
        assert_eq!(batch.source_directory, PathBuf::from("/project/stage"));
    }

    #[test]
    fn test_parses_service_stage() {
        let stage = parse(SERVICE).unwrap();
        assert_eq!(stage.kind(), StageKind::Service);
        assert_eq!(stage.declared_deadline(), None);
        assert_eq!(
            stage.resources().secrets.get("USERNAME").map(String::as_str),
            Some("test-credentials")
        );

        let StageDescriptor::Service(service) = stage else {
            panic!("expected service stage");
        };
        assert_eq!(service.replicas, 2);
        assert_eq!(service.port, 5000);
    }

    #[test]
    fn test_unknown_kind() {
        let err = parse(&BATCH.replace("\"batch\"", "\"cron\"")).unwrap_err();
        assert!(matches!(err, StageConfigError::UnknownKind(_)));
    }

    #[test]
    fn test_kind_requires_matching_section() {
        let err = parse(&SERVICE.replace("[service]", "[batch]")).unwrap_err();
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn test_rejects_zero_cpu_request() {
        let err = parse(&BATCH.replace("cpu_request = 0.5", "cpu_request = 0.0")).unwrap_err();
        assert!(err.to_string().contains("cpu_request"));
    }

    #[test]
    fn test_load_reports_missing_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();

        let err = StageDescriptor::load("absent", &dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, StageConfigError::MissingDirectory(_)));

        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let err = StageDescriptor::load("empty", &dir.path().join("empty")).unwrap_err();
        assert!(matches!(err, StageConfigError::MissingFile(_)));
    }
}
