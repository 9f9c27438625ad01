//! Project descriptor loading and validation.

use super::PROJECT_CONFIG_FILENAME;
use crate::core::LogLevel;
use crate::errors::ProjectConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Descriptor key holding the project name.
pub const FIELD_NAME: &str = "name";
/// Descriptor key holding the docker image.
pub const FIELD_IMAGE: &str = "docker_image";
/// Descriptor key holding the DAG expression.
pub const FIELD_DAG: &str = "dag";
/// Descriptor key holding the log level.
pub const FIELD_LOG_LEVEL: &str = "log_level";

#[allow(clippy::expect_used)]
static PROJECT_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("project name pattern is valid")
    });

/// Validated, immutable project-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Project identifier, used to prefix stage identifiers.
    pub name: String,
    /// Container image reference shared by every stage.
    pub image: String,
    /// Raw DAG expression.
    pub dag_expression: String,
    /// Log level for the run.
    pub log_level: LogLevel,
}

#[derive(Debug, Default, Deserialize)]
struct RawProjectFile {
    #[serde(default)]
    project: RawProjectSection,
    #[serde(default)]
    workflow: RawWorkflowSection,
    #[serde(default)]
    logging: RawLoggingSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawProjectSection {
    name: Option<String>,
    docker_image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkflowSection {
    dag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLoggingSection {
    log_level: Option<String>,
}

impl ProjectDescriptor {
    /// Loads the descriptor from `<project_root>/deployflow.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectConfigError`] if the file cannot be read or parsed, or
    /// naming the first invalid field.
    pub fn load(project_root: &Path) -> Result<Self, ProjectConfigError> {
        Self::load_file(&project_root.join(PROJECT_CONFIG_FILENAME))
    }

    /// Loads the descriptor from an explicit file path.
    ///
    /// # Errors
    ///
    /// See [`ProjectDescriptor::load`].
    pub fn load_file(path: &Path) -> Result<Self, ProjectConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProjectConfigError::new(PROJECT_CONFIG_FILENAME, format!("cannot read file: {e}"), path)
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Parses and validates descriptor contents. `path` is only used for
    /// error reporting.
    ///
    /// # Errors
    ///
    /// See [`ProjectDescriptor::load`].
    pub fn from_toml_str(
        contents: &str,
        path: impl Into<PathBuf>,
    ) -> Result<Self, ProjectConfigError> {
        let path = path.into();
        let raw: RawProjectFile = toml::from_str(contents).map_err(|e| {
            let reason = format!("cannot parse file: {e}");
            ProjectConfigError::new(PROJECT_CONFIG_FILENAME, reason, &path)
        })?;

        let descriptor = raw.validate(&path)?;
        debug!(project = %descriptor.name, path = %path.display(), "Loaded project descriptor");
        Ok(descriptor)
    }
}

impl RawProjectFile {
    /// Checks fields in the fixed order name, image, dag, log level and
    /// returns the first violation.
    fn validate(self, path: &Path) -> Result<ProjectDescriptor, ProjectConfigError> {
        let fail = |field: &str, reason: String| ProjectConfigError::new(field, reason, path);

        let name = validate_name(self.project.name).map_err(|r| fail(FIELD_NAME, r))?;
        let image = validate_image(self.project.docker_image).map_err(|r| fail(FIELD_IMAGE, r))?;
        let dag_expression = validate_dag(self.workflow.dag).map_err(|r| fail(FIELD_DAG, r))?;
        let log_level =
            validate_log_level(self.logging.log_level).map_err(|r| fail(FIELD_LOG_LEVEL, r))?;

        Ok(ProjectDescriptor {
            name,
            image,
            dag_expression,
            log_level,
        })
    }
}

fn required(value: Option<String>) -> Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err("value is empty".to_string()),
        None => Err("value is missing".to_string()),
    }
}

fn validate_name(value: Option<String>) -> Result<String, String> {
    let name = required(value)?;
    if PROJECT_NAME_PATTERN.is_match(&name) {
        Ok(name)
    } else {
        Err(format!(
            "'{name}' must start with a letter or digit and contain only \
             letters, digits, '-' or '_'"
        ))
    }
}

fn validate_image(value: Option<String>) -> Result<String, String> {
    let image = required(value)?;
    if image.chars().any(char::is_whitespace) {
        Err(format!("'{image}' contains whitespace"))
    } else {
        Ok(image)
    }
}

fn validate_dag(value: Option<String>) -> Result<String, String> {
    required(value)
}

fn validate_log_level(value: Option<String>) -> Result<LogLevel, String> {
    required(value)?.parse()
}
