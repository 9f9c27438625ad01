//! On-disk project fixtures.

use crate::config::{PROJECT_CONFIG_FILENAME, STAGE_CONFIG_FILENAME};
use std::io;
use std::path::Path;

/// Contents written for one stage directory.
#[derive(Debug, Clone)]
enum StageFixture {
    Config(String),
    EmptyDir,
}

/// Builder for a project tree: a project descriptor plus stage directories.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Project name.
    pub name: String,
    /// Docker image string.
    pub image: String,
    /// DAG expression; defaults to all stages in one step.
    pub dag: Option<String>,
    /// Log level string.
    pub log_level: String,
    stages: Vec<(String, StageFixture)>,
}

impl ProjectFixture {
    /// Creates a fixture with a valid image and INFO logging.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: "alexioannides/bodywork:latest".to_string(),
            dag: None,
            log_level: "INFO".to_string(),
            stages: Vec::new(),
        }
    }

    /// Sets the image string.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the DAG expression.
    #[must_use]
    pub fn with_dag(mut self, dag: impl Into<String>) -> Self {
        self.dag = Some(dag.into());
        self
    }

    /// Sets the log level string.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Adds a valid batch stage.
    #[must_use]
    pub fn with_batch_stage(self, name: &str) -> Self {
        let config = format!(
            r#"[stage]
kind = "batch"
executable_module = "{name}.py"
cpu_request = 0.5
memory_request_mb = 100

[batch]
retries = 2
"#
        );
        self.with_raw_stage(name, config)
    }

    /// Adds a valid service stage.
    #[must_use]
    pub fn with_service_stage(self, name: &str) -> Self {
        let config = format!(
            r#"[stage]
kind = "service"
executable_module = "{name}.py"
cpu_request = 0.5
memory_request_mb = 100

[service]
replicas = 1
port = 5000
"#
        );
        self.with_raw_stage(name, config)
    }

    /// Adds a stage directory with arbitrary descriptor contents.
    #[must_use]
    pub fn with_raw_stage(mut self, name: &str, config: impl Into<String>) -> Self {
        self.stages.push((name.to_string(), StageFixture::Config(config.into())));
        self
    }

    /// Adds a stage directory without a descriptor file.
    #[must_use]
    pub fn with_empty_stage_dir(mut self, name: &str) -> Self {
        self.stages.push((name.to_string(), StageFixture::EmptyDir));
        self
    }

    /// The project descriptor contents.
    #[must_use]
    pub fn project_toml(&self) -> String {
        let dag = self.dag.clone().unwrap_or_else(|| {
            self.stages
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        });
        format!(
            r#"[project]
name = "{}"
docker_image = "{}"

[workflow]
dag = "{}"

[logging]
log_level = "{}"
"#,
            self.name, self.image, dag, self.log_level
        )
    }

    /// Writes the project tree under `root`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating directories or files.
    pub fn write_to(&self, root: &Path) -> io::Result<()> {
        std::fs::create_dir_all(root)?;
        std::fs::write(root.join(PROJECT_CONFIG_FILENAME), self.project_toml())?;

        for (name, stage) in &self.stages {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir)?;
            if let StageFixture::Config(contents) = stage {
                std::fs::write(dir.join(STAGE_CONFIG_FILENAME), contents)?;
            }
        }
        Ok(())
    }
}
