//! Project and stage descriptors, plus engine configuration.

mod project;
mod stage;

pub use project::{ProjectDescriptor, FIELD_DAG, FIELD_IMAGE, FIELD_LOG_LEVEL, FIELD_NAME};
pub use stage::{BatchStage, ServiceStage, StageConfigError, StageDescriptor, StageResources};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the project descriptor file at the project root.
pub const PROJECT_CONFIG_FILENAME: &str = "deployflow.toml";

/// Name of the stage descriptor file inside each stage directory.
pub const STAGE_CONFIG_FILENAME: &str = "config.toml";

/// What to do when the project image is confirmed missing from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCheckPolicy {
    /// Abort the run before any deployment.
    #[default]
    Abort,
    /// Log a warning and continue.
    Warn,
}

/// Configuration for the workflow executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Deadline in seconds for stages that do not declare their own.
    #[serde(default = "default_stage_timeout")]
    pub default_stage_timeout_seconds: f64,
    /// Policy for a missing image.
    #[serde(default)]
    pub image_check_policy: ImageCheckPolicy,
    /// Whether to print each stage's logs after its step completes.
    #[serde(default = "default_print_stage_logs")]
    pub print_stage_logs: bool,
}

fn default_stage_timeout() -> f64 {
    600.0
}

fn default_print_stage_logs() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_stage_timeout_seconds: default_stage_timeout(),
            image_check_policy: ImageCheckPolicy::default(),
            print_stage_logs: default_print_stage_logs(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a new executor configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default stage timeout.
    #[must_use]
    pub fn with_default_stage_timeout(mut self, timeout: Duration) -> Self {
        self.default_stage_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the image check policy.
    #[must_use]
    pub fn with_image_check_policy(mut self, policy: ImageCheckPolicy) -> Self {
        self.image_check_policy = policy;
        self
    }

    /// Enables or disables printing stage logs.
    #[must_use]
    pub fn with_print_stage_logs(mut self, enabled: bool) -> Self {
        self.print_stage_logs = enabled;
        self
    }

    /// Gets the default stage timeout as a Duration.
    ///
    /// A negative, NaN or out-of-range value falls back to 600 seconds.
    #[must_use]
    pub fn default_stage_timeout(&self) -> Duration {
        seconds_or(self.default_stage_timeout_seconds, default_stage_timeout())
    }

    /// The deadline for a stage: its declared one, else the default.
    #[must_use]
    pub fn stage_deadline(&self, stage: &StageDescriptor) -> Duration {
        stage
            .declared_deadline()
            .unwrap_or_else(|| self.default_stage_timeout())
    }
}

/// Configuration for registry existence checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the repositories API.
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_registry_timeout")]
    pub timeout_seconds: f64,
}

fn default_registry_url() -> String {
    "https://hub.docker.com/v2/repositories".to_string()
}

fn default_registry_timeout() -> f64 {
    10.0
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            timeout_seconds: default_registry_timeout(),
        }
    }
}

impl RegistryConfig {
    /// Creates a new registry configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration.
    ///
    /// A negative, NaN or out-of-range value falls back to 10 seconds.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        seconds_or(self.timeout_seconds, default_registry_timeout())
    }

    /// URL of the tag resource for `repository:tag`.
    #[must_use]
    pub fn tag_url(&self, repository: &str, tag: &str) -> String {
        format!("{}/{}/tags/{}", self.base_url.trim_end_matches('/'), repository, tag)
    }
}

fn seconds_or(seconds: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or_else(|_| {
        tracing::warn!(seconds, fallback, "Invalid duration in configuration; using fallback");
        Duration::from_secs_f64(fallback)
    })
}
