//! # Deployflow
//!
//! A workflow engine that deploys a project's stages to a container cluster.
//!
//! A project is a directory holding a project descriptor and one
//! sub-directory per stage. The project descriptor names a container image
//! and a DAG expression such as `prepare >> train, score >> serve`: steps are
//! separated by `>>` and run one after another, while the stages of a step are
//! separated by `,` and run concurrently.
//!
//! A run has two phases:
//!
//! - **Preflight**: load and validate the project descriptor, parse the DAG,
//!   resolve every stage descriptor, check the namespace exists, then check
//!   the image format and its presence in the registry. Any failure aborts
//!   before the cluster receives a single deployment.
//! - **Execution**: deploy each step's stages concurrently, wait for all of
//!   them, and continue only if every stage succeeded.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let images = DockerImageValidator::http(RegistryConfig::default())?;
//! let executor = WorkflowExecutor::new(cluster, images)
//!     .with_event_sink(Arc::new(LoggingEventSink::default()));
//!
//! let result = executor.run("bodywork-dev", Path::new("./my-project")).await?;
//! result.into_result()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cluster;
pub mod config;
pub mod core;
pub mod dag;
pub mod errors;
pub mod events;
pub mod execution;
pub mod image;
pub mod logs;
pub mod observability;
pub mod resolver;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cluster::{
        stage_identifier, ClusterApi, DeploymentHandle, DeploymentRequest, TerminalStatus,
    };
    pub use crate::config::{
        BatchStage, ExecutorConfig, ImageCheckPolicy, ProjectDescriptor, RegistryConfig,
        ServiceStage, StageDescriptor,
    };
    pub use crate::core::{LogLevel, StageKind, StageStatus, WorkflowState};
    pub use crate::dag::{parse_dag, DagParser, ExecutionPlan, Step};
    pub use crate::errors::{
        ClusterError, DeployflowError, InvalidImageFormatError, MalformedDagError,
        ProjectConfigError, RegistryUnreachableError, UnresolvedStageError,
        WorkflowExecutionError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, WorkflowEvent,
    };
    pub use crate::execution::{StageOutcome, WorkflowExecutor, WorkflowResult};
    pub use crate::image::{DockerImageRef, DockerImageValidator, RegistryClient};
    pub use crate::logs::LogReporter;
    pub use crate::observability::init_tracing;
    pub use crate::resolver::{StageRegistry, StageResolver};
}
